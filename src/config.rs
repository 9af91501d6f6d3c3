use std::{
    fs::File,
    io::BufReader,
    path::Path,
    time::Duration,
};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing secret: {0}")]
    MissingSecret(String),
    #[error("failed to build client: {0}")]
    Client(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

impl SessionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        from_file(path)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Extraction and rendering only; no generation requests are issued.
    pub fn offline() -> Self {
        Self {
            evaluator: EvaluatorConfig { eager: false },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderType {
    #[default]
    Http,
    OpenAi,
    Echo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub provider_type: ProviderType,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(
        default = "default_request_timeout",
        with = "duration_ms",
        rename = "request_timeout_ms"
    )]
    pub request_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::default(),
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Data payloads shorter than this are rejected as incomplete.
    #[serde(default = "default_min_payload_len")]
    pub min_payload_len: usize,
    #[serde(default = "default_true")]
    pub store_data_uris: bool,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            min_payload_len: default_min_payload_len(),
            store_data_uris: default_true(),
            url_prefix: default_url_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default = "default_true")]
    pub eager: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            eager: default_true(),
        }
    }
}

/// Credentials, kept out of [`SessionConfig`] so they are never written back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default)]
    pub api_key: String,
}

impl SecretConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        from_file(path)
    }

    pub fn from_env() -> ConfigResult<Self> {
        std::env::var(API_KEY_ENV)
            .map(|api_key| Self { api_key })
            .map_err(|_| ConfigError::MissingSecret(API_KEY_ENV.to_string()))
    }

    pub fn api_key(&self) -> ConfigResult<SecretString> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingSecret("api_key".to_string()));
        }
        Ok(SecretString::from(self.api_key.clone()))
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn default_endpoint() -> String {
    "http://localhost:3000/api/generate".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_min_payload_len() -> usize {
    100
}
fn default_url_prefix() -> String {
    "/api/media".to_string()
}
fn default_true() -> bool {
    true
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
