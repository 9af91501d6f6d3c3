//! # Render
//!
//! Produces the processed Markdown consumed by a render adapter. Each call site
//! is replaced according to its kind and the state of its cache entry:
//!
//! | Kind | Ready | Pending / absent | Failed |
//! |---|---|---|---|
//! | Text | the value | `🤖 **Agent**: thinking…` | `⚠️ Agent: error` |
//! | Image | `![Generated by Agent](url)` | `🖼️ **Agent**: generating image...` | warning |
//! | Speech | `<ai-speech>` marker | `🎤 **Agent**: generating speech...` | warning |
//! | Intent | `<intent-button>` marker | | |
//! | VariableInput | `<define-input>` marker | | |
//!
//! Prose between calls has its `{Name}` placeholders substituted. Generated
//! values are inserted as-is and never substituted. Definition blocks render to
//! nothing.

pub mod adapter;
pub mod marker;

use std::collections::{BTreeMap, HashMap};

use crate::{
    evaluator::{CacheEntry, CacheStatus, Evaluator, IntentState},
    extractor::{identity_key, normalize_prompt, CallKind, CallToken, Segment},
    segmenter::{Block, BLOCK_SEPARATOR},
    substitution::{Substitution, VariableSlot},
};

pub use adapter::{AdapterRegistry, MarkerAdapter};
pub use marker::{Marker, MarkerKind};

/// Where the renderer looks up call results.
pub trait PreviewSource {
    fn preview(&self, key: &str) -> Option<CacheEntry>;

    fn intent(&self, _key: &str) -> IntentState {
        IntentState::Idle
    }
}

impl PreviewSource for Evaluator {
    fn preview(&self, key: &str) -> Option<CacheEntry> {
        self.entry(key)
    }

    fn intent(&self, key: &str) -> IntentState {
        self.intent_state(key)
    }
}

impl PreviewSource for HashMap<String, String> {
    fn preview(&self, key: &str) -> Option<CacheEntry> {
        self.get(key).map(|value| CacheEntry::ready(key, value))
    }
}

impl PreviewSource for BTreeMap<String, String> {
    fn preview(&self, key: &str) -> Option<CacheEntry> {
        self.get(key).map(|value| CacheEntry::ready(key, value))
    }
}

pub struct Renderer<'a> {
    substitution: &'a Substitution<'a>,
    previews: &'a dyn PreviewSource,
}

impl<'a> Renderer<'a> {
    pub fn new(substitution: &'a Substitution<'a>, previews: &'a dyn PreviewSource) -> Self {
        Self {
            substitution,
            previews,
        }
    }

    pub fn render(&self, blocks: &[Block]) -> String {
        blocks
            .iter()
            .enumerate()
            .map(|(index, block)| self.render_block(block, index))
            .filter(|rendered| !rendered.trim().is_empty())
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR)
    }

    pub fn render_block(&self, block: &Block, block_index: usize) -> String {
        if block.is_definition {
            return String::new();
        }
        let mut out = String::with_capacity(block.text.len());
        for segment in crate::extractor::tokenize(&block.text) {
            match segment {
                Segment::Literal(text) => out.push_str(&self.substitution.apply(text)),
                Segment::Call { token, .. } => out.push_str(&self.render_call(&token, block_index)),
            }
        }
        out.trim().to_string()
    }

    fn render_call(&self, token: &CallToken<'_>, block_index: usize) -> String {
        let agent = token.target;
        let key = identity_key(token.kind, block_index, agent, token.prompt);
        let entry = self.previews.preview(&key);
        let failure = |entry: &CacheEntry| {
            format!(
                "⚠️ {agent}: {}",
                entry.error.as_deref().unwrap_or("generation failed")
            )
        };

        match token.kind {
            CallKind::Text => match entry {
                Some(entry) if entry.status == CacheStatus::Ready => {
                    entry.value.unwrap_or_default()
                }
                Some(entry) if entry.status == CacheStatus::Failed => failure(&entry),
                _ => format!("🤖 **{agent}**: thinking…"),
            },
            CallKind::Image => match entry {
                Some(CacheEntry {
                    status: CacheStatus::Ready,
                    value: Some(value),
                    ..
                }) => format!("\n![Generated by {agent}]({value})\n"),
                Some(entry) if entry.status == CacheStatus::Failed => {
                    format!("\n{}\n", failure(&entry))
                }
                _ => format!("\n🖼️ **{agent}**: generating image...\n"),
            },
            CallKind::Speech => match entry {
                Some(CacheEntry {
                    status: CacheStatus::Ready,
                    value: Some(audio),
                    ..
                }) => {
                    let marker = Marker::AiSpeech {
                        key,
                        agent: agent.to_string(),
                        audio,
                    };
                    format!("\n{}\n", marker.encode())
                }
                Some(entry) if entry.status == CacheStatus::Failed => {
                    format!("\n{}\n", failure(&entry))
                }
                _ => format!("\n🎤 **{agent}**: generating speech...\n"),
            },
            CallKind::Intent => {
                let prompt = normalize_prompt(token.prompt);
                let marker = Marker::IntentButton {
                    key,
                    agent: agent.to_string(),
                    button_text: token.label.unwrap_or_default().to_string(),
                    rendered: self.substitution.apply(&prompt),
                    prompt,
                };
                format!("\n{}\n", marker.encode())
            }
            CallKind::VariableInput => {
                let slot = VariableSlot {
                    key,
                    name: agent.to_string(),
                    label: token.label.unwrap_or_default().to_string(),
                    block_index,
                };
                let marker = Marker::DefineInput {
                    default: self.substitution.slot_default(&slot),
                    value: self.substitution.slot_value(&slot),
                    key: slot.key,
                    name: slot.name,
                    label: slot.label,
                };
                format!("\n{}\n", marker.encode())
            }
        }
    }
}
