//! # Generation
//!
//! The seam between the evaluator and whatever produces content. A
//! [`Generator`] answers one [`GenerationRequest`] at a time; it never
//! retries on its own.

pub mod echo;
pub mod http;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    config::{ConfigError, GeneratorConfig, ProviderType, SecretConfig},
    definitions::{BoundConfig, ServiceRef},
};

pub use echo::EchoGenerator;
pub use http::HttpGenerator;
pub use openai::OpenAiGenerator;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Text,
    Image,
    Speech,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub agent_name: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_config: Option<BoundConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_services: Vec<ServiceRef>,
    /// Identity key of the call being answered.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutput {
    Content(String),
    /// A url or a `data:` URI.
    Media(String),
}

impl GenerationOutput {
    pub fn into_inner(self) -> String {
        match self {
            Self::Content(value) | Self::Media(value) => value,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Generator(String),
    #[error("{0} generation is not supported by this generator")]
    Unsupported(GenerationKind),
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("API error: {0}")]
    Api(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

#[mockall::automock]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput>;
}

/// Builds the generator selected by `config.provider_type`.
pub fn create_generator(
    config: &GeneratorConfig,
    secret: Option<&SecretConfig>,
) -> Result<Arc<dyn Generator>, ConfigError> {
    let generator: Arc<dyn Generator> = match config.provider_type {
        ProviderType::Http => Arc::new(
            HttpGenerator::new(config).map_err(|e| ConfigError::Client(e.to_string()))?,
        ),
        ProviderType::OpenAi => {
            let secret = match secret {
                Some(secret) => secret.clone(),
                None => SecretConfig::from_env()?,
            };
            Arc::new(OpenAiGenerator::new(config, &secret.api_key()?))
        }
        ProviderType::Echo => Arc::new(EchoGenerator::default()),
    };
    Ok(generator)
}
