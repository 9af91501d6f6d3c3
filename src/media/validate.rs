use crate::generation::GenerationKind;

use super::{parse_data_uri, MediaError, MediaResult};

fn is_url(value: &str) -> bool {
    value.starts_with('/') || value.starts_with("http://") || value.starts_with("https://")
}

fn expected_type(kind: GenerationKind) -> Option<&'static str> {
    match kind {
        GenerationKind::Image => Some("image"),
        GenerationKind::Speech => Some("audio"),
        GenerationKind::Text => None,
    }
}

/// Checks that a generated media value is usable before it is cached.
///
/// Urls are accepted as-is. `data:` URIs must carry a mime type matching the
/// kind. Data payloads shorter than `min_len` are rejected as incomplete.
pub fn validate(kind: GenerationKind, value: &str, min_len: usize) -> MediaResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MediaError::IncompleteData { len: 0, min_len });
    }
    if is_url(value) {
        return Ok(());
    }
    if let (Some(expected), Some(data_uri)) = (expected_type(kind), parse_data_uri(value)) {
        if !data_uri.mime_type.starts_with(&format!("{expected}/")) {
            return Err(MediaError::UnexpectedMediaType {
                expected: expected.to_string(),
                found: data_uri.mime_type.to_string(),
            });
        }
    }
    if value.len() < min_len {
        return Err(MediaError::IncompleteData {
            len: value.len(),
            min_len,
        });
    }
    Ok(())
}
