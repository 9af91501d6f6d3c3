//! Placeholder markers handed to the render adapter.
//!
//! A marker is an empty HTML-like element whose meaning is carried entirely by
//! its `data-*` attributes:
//!
//! ```text
//! <intent-button data-key="…" data-agent="…" data-button-text="…" data-prompt="…" data-rendered="…"></intent-button>
//! <define-input data-key="…" data-name="…" data-label="…" data-default="…" data-value="…"></define-input>
//! <ai-speech data-key="…" data-agent="…" data-audio="…"></ai-speech>
//! ```
//!
//! Attribute values are entity-escaped, newlines included, so a marker always
//! fits on one line.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

lazy_static! {
    static ref MARKER: Regex = Regex::new(
        r#"<(intent-button|define-input|ai-speech)((?:\s+data-[a-z-]+="[^"]*")*)\s*>\s*</(intent-button|define-input|ai-speech)>"#
    )
    .expect("valid marker pattern");
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"(data-[a-z-]+)="([^"]*)""#).expect("valid attribute pattern");
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter, AsRefStr,
)]
pub enum MarkerKind {
    #[strum(serialize = "intent-button")]
    #[serde(rename = "intent-button")]
    IntentButton,
    #[strum(serialize = "define-input")]
    #[serde(rename = "define-input")]
    DefineInput,
    #[strum(serialize = "ai-speech")]
    #[serde(rename = "ai-speech")]
    AiSpeech,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Marker {
    #[serde(rename_all = "camelCase")]
    IntentButton {
        key: String,
        agent: String,
        button_text: String,
        /// Prompt as written, with placeholders.
        prompt: String,
        /// Prompt after substitution.
        rendered: String,
    },
    #[serde(rename_all = "camelCase")]
    DefineInput {
        key: String,
        name: String,
        label: String,
        default: String,
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    AiSpeech {
        key: String,
        agent: String,
        audio: String,
    },
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_attribute(value: &str) -> String {
    value
        .replace("&#13;", "\r")
        .replace("&#10;", "\n")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

impl Marker {
    pub fn kind(&self) -> MarkerKind {
        match self {
            Self::IntentButton { .. } => MarkerKind::IntentButton,
            Self::DefineInput { .. } => MarkerKind::DefineInput,
            Self::AiSpeech { .. } => MarkerKind::AiSpeech,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::IntentButton { key, .. }
            | Self::DefineInput { key, .. }
            | Self::AiSpeech { key, .. } => key,
        }
    }

    fn attributes(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::IntentButton {
                key,
                agent,
                button_text,
                prompt,
                rendered,
            } => vec![
                ("data-key", key),
                ("data-agent", agent),
                ("data-button-text", button_text),
                ("data-prompt", prompt),
                ("data-rendered", rendered),
            ],
            Self::DefineInput {
                key,
                name,
                label,
                default,
                value,
            } => vec![
                ("data-key", key),
                ("data-name", name),
                ("data-label", label),
                ("data-default", default),
                ("data-value", value),
            ],
            Self::AiSpeech { key, agent, audio } => vec![
                ("data-key", key),
                ("data-agent", agent),
                ("data-audio", audio),
            ],
        }
    }

    pub fn encode(&self) -> String {
        let kind = self.kind();
        let attributes: String = self
            .attributes()
            .into_iter()
            .map(|(name, value)| format!(" {name}=\"{}\"", escape_attribute(value)))
            .collect();
        format!("<{kind}{attributes}></{kind}>")
    }

    /// Builds a marker from decoded attributes. Missing attributes make the
    /// marker invalid; unknown ones are ignored.
    pub fn from_attributes(kind: MarkerKind, attributes: &HashMap<String, String>) -> Option<Self> {
        let get = |name: &str| attributes.get(name).cloned();
        Some(match kind {
            MarkerKind::IntentButton => Self::IntentButton {
                key: get("data-key")?,
                agent: get("data-agent")?,
                button_text: get("data-button-text")?,
                prompt: get("data-prompt")?,
                rendered: get("data-rendered")?,
            },
            MarkerKind::DefineInput => Self::DefineInput {
                key: get("data-key")?,
                name: get("data-name")?,
                label: get("data-label")?,
                default: get("data-default")?,
                value: get("data-value")?,
            },
            MarkerKind::AiSpeech => Self::AiSpeech {
                key: get("data-key")?,
                agent: get("data-agent")?,
                audio: get("data-audio")?,
            },
        })
    }
}

/// A marker found in processed text, with the byte range it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedMarker {
    pub marker: Marker,
    pub range: std::ops::Range<usize>,
}

/// Finds every well-formed marker in `text`, in order.
pub fn scan(text: &str) -> Vec<LocatedMarker> {
    MARKER
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let open = captures.get(1)?.as_str();
            if open != captures.get(3)?.as_str() {
                return None;
            }
            let kind: MarkerKind = open.parse().ok()?;
            let attributes: HashMap<String, String> = ATTRIBUTE
                .captures_iter(captures.get(2).map_or("", |m| m.as_str()))
                .map(|attr| (attr[1].to_string(), unescape_attribute(&attr[2])))
                .collect();
            Some(LocatedMarker {
                marker: Marker::from_attributes(kind, &attributes)?,
                range: whole.range(),
            })
        })
        .collect()
}

pub fn decode(text: &str) -> Vec<Marker> {
    scan(text).into_iter().map(|located| located.marker).collect()
}
