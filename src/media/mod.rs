//! # Media
//!
//! Validation of generated image/speech payloads and the storage collaborator
//! that turns `data:` URIs into urls.

mod validate;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

pub use validate::validate;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("incomplete data: {len} bytes, expected at least {min_len}")]
    IncompleteData { len: usize, min_len: usize },
    #[error("unexpected media type {found}, expected {expected}/*")]
    UnexpectedMediaType { expected: String, found: String },
    #[error("invalid base64 payload: {0}")]
    Decode(String),
    #[error("media not found: {0}")]
    NotFound(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub base64: &'a str,
}

/// Splits `data:{mime};base64,{payload}`.
pub fn parse_data_uri(value: &str) -> Option<DataUri<'_>> {
    let rest = value.strip_prefix("data:")?;
    let (mime_type, base64) = rest.split_once(";base64,")?;
    Some(DataUri { mime_type, base64 })
}

#[mockall::automock]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores a base64 payload and returns the url it is served from.
    async fn store(&self, key: &str, mime_type: &str, base64_data: &str) -> MediaResult<String>;

    async fn fetch(&self, url: &str) -> MediaResult<Vec<u8>>;
}

fn extension(mime_type: &str) -> &'static str {
    match mime_type.split('/').next() {
        Some("image") => "png",
        Some("audio") => "mp3",
        Some("video") => "mp4",
        _ => "bin",
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub key: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Keeps payloads in memory, addressed by `{prefix}/{key}_{millis}.{ext}`.
#[derive(Debug)]
pub struct InMemoryMediaStore {
    prefix: String,
    assets: DashMap<String, StoredMedia>,
}

impl InMemoryMediaStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            assets: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<StoredMedia> {
        self.assets.get(url).map(|entry| entry.value().clone())
    }
}

impl Default for InMemoryMediaStore {
    fn default() -> Self {
        Self::new("/api/media")
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn store(&self, key: &str, mime_type: &str, base64_data: &str) -> MediaResult<String> {
        let data = STANDARD
            .decode(base64_data.trim())
            .map_err(|e| MediaError::Decode(e.to_string()))?;
        let url = format!(
            "{}/{}_{}.{}",
            self.prefix,
            sanitize(key),
            Utc::now().timestamp_millis(),
            extension(mime_type)
        );
        debug!(%url, bytes = data.len(), "stored media");
        self.assets.insert(
            url.clone(),
            StoredMedia {
                key: key.to_string(),
                mime_type: mime_type.to_string(),
                data,
            },
        );
        Ok(url)
    }

    async fn fetch(&self, url: &str) -> MediaResult<Vec<u8>> {
        self.assets
            .get(url)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| MediaError::NotFound(url.to_string()))
    }
}
