use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::{GenerationKind, GenerationOutput, GenerationRequest, GenerationResult, Generator};

const MEDIA_PAYLOAD_LEN: usize = 256;

/// Deterministic offline generator. Text echoes the prompt; media kinds return
/// a `data:` URI built from the prompt bytes.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator {
    delay: Duration,
}

impl EchoGenerator {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

fn media_payload(prompt: &str) -> Vec<u8> {
    let seed = if prompt.is_empty() { " " } else { prompt };
    seed.bytes().cycle().take(MEDIA_PAYLOAD_LEN).collect()
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let output = match request.kind {
            GenerationKind::Text => {
                GenerationOutput::Content(format!("{}: {}", request.agent_name, request.prompt))
            }
            GenerationKind::Image => GenerationOutput::Media(format!(
                "data:image/png;base64,{}",
                STANDARD.encode(media_payload(&request.prompt))
            )),
            GenerationKind::Speech => GenerationOutput::Media(format!(
                "data:audio/mpeg;base64,{}",
                STANDARD.encode(media_payload(&request.prompt))
            )),
        };
        Ok(output)
    }
}
