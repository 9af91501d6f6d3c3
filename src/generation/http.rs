use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    GenerationError, GenerationKind, GenerationOutput, GenerationRequest, GenerationResult,
    Generator,
};
use crate::config::GeneratorConfig;

/// Response body of the generation service. Older deployments answer media
/// requests with `image` / `audio` instead of `mediaUrlOrDataUri`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResponse {
    content: Option<String>,
    media_url_or_data_uri: Option<String>,
    image: Option<String>,
    audio: Option<String>,
    error: Option<String>,
}

/// Posts requests as JSON to a generation service.
pub struct HttpGenerator {
    client: Client,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    #[tracing::instrument(skip(self, request), fields(key = %request.key, kind = %request.kind))]
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GenerationResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            warn!(status = status.as_u16(), %message, "generation request failed");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload: GenerationResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        if let Some(error) = payload.error {
            return Err(GenerationError::Generator(error));
        }

        let output = match request.kind {
            GenerationKind::Text => payload.content.map(GenerationOutput::Content),
            GenerationKind::Image => payload
                .media_url_or_data_uri
                .or(payload.image)
                .map(GenerationOutput::Media),
            GenerationKind::Speech => payload
                .media_url_or_data_uri
                .or(payload.audio)
                .map(GenerationOutput::Media),
        };
        debug!(found = output.is_some(), "generation response received");
        output.ok_or_else(|| {
            GenerationError::InvalidResponse(format!("no {} in response", request.kind))
        })
    }
}
