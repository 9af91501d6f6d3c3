//! # Call Extractor
//!
//! Produces a [`CallDescriptor`] for every call site in a content block. The
//! descriptor's identity key is the only way results are addressed, and it is
//! a pure function of `(kind, block index, agent, normalized prompt)`:
//!
//! | Kind | Key |
//! |---|---|
//! | Text | `{block}:{agent}:{prompt}` |
//! | Image | `image:{block}:{agent}:{prompt}` |
//! | Speech | `speech:{block}:{agent}:{prompt}` |
//! | Intent | `intent:{block}:{agent}:{prompt}` (label excluded) |
//! | VariableInput | `define:{block}:{name}` |
//!
//! Keys use the prompt as written, before substitution.

pub mod token;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::debug;

use crate::{
    definitions::BoundConfig,
    generation::GenerationKind,
    segmenter::Block,
    substitution::{self, Substitution, VariableSlot},
};

pub use token::{tokenize, CallToken, Segment};

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
pub enum CallKind {
    Text,
    Image,
    Speech,
    Intent,
    #[strum(serialize = "define")]
    #[serde(rename = "define")]
    VariableInput,
}

impl CallKind {
    /// Eager calls are evaluated as soon as they are extracted.
    pub fn is_eager(&self) -> bool {
        matches!(self, Self::Text | Self::Image | Self::Speech)
    }

    pub fn key_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Image => Some("image"),
            Self::Speech => Some("speech"),
            Self::Intent => Some("intent"),
            Self::VariableInput => Some("define"),
        }
    }

    pub fn generation_kind(&self) -> Option<GenerationKind> {
        match self {
            Self::Text | Self::Intent => Some(GenerationKind::Text),
            Self::Image => Some(GenerationKind::Image),
            Self::Speech => Some(GenerationKind::Speech),
            Self::VariableInput => None,
        }
    }
}

/// Unifies line endings and trims outer whitespace.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

pub fn identity_key(kind: CallKind, block_index: usize, agent: &str, prompt: &str) -> String {
    if kind == CallKind::VariableInput {
        return format!("define:{block_index}:{}", agent.trim());
    }
    let key = format!("{block_index}:{}:{}", agent.trim(), normalize_prompt(prompt));
    match kind.key_prefix() {
        Some(prefix) => format!("{prefix}:{key}"),
        None => key,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDescriptor {
    pub kind: CallKind,
    pub block_index: usize,
    /// Agent name, or the variable name for `VariableInput`.
    pub agent: String,
    /// Normalized prompt before substitution.
    pub raw_prompt: String,
    /// Prompt after substitution, as sent to the generator.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub identity_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_config: Option<BoundConfig>,
}

impl CallDescriptor {
    /// Whether the pre-substitution prompt contains `{name}`.
    pub fn references(&self, name: &str) -> bool {
        substitution::references(&self.raw_prompt, name)
    }

    pub fn is_eager(&self) -> bool {
        self.kind.is_eager()
    }

    pub fn with_substitution(&self, substitution: &Substitution<'_>) -> Self {
        Self {
            prompt: substitution.apply(&self.raw_prompt),
            ..self.clone()
        }
    }
}

pub struct Extractor<'a> {
    substitution: &'a Substitution<'a>,
}

impl<'a> Extractor<'a> {
    pub fn new(substitution: &'a Substitution<'a>) -> Self {
        Self { substitution }
    }

    pub fn describe(&self, token: &CallToken<'_>, block_index: usize) -> CallDescriptor {
        let label = token.label.map(str::to_string);
        if token.kind == CallKind::VariableInput {
            return CallDescriptor {
                kind: token.kind,
                block_index,
                agent: token.target.to_string(),
                raw_prompt: String::new(),
                prompt: String::new(),
                label,
                identity_key: identity_key(token.kind, block_index, token.target, ""),
                bound_config: None,
            };
        }

        let raw_prompt = normalize_prompt(token.prompt);
        CallDescriptor {
            kind: token.kind,
            block_index,
            agent: token.target.to_string(),
            prompt: self.substitution.apply(&raw_prompt),
            label,
            identity_key: identity_key(token.kind, block_index, token.target, &raw_prompt),
            bound_config: self.substitution.definitions().bound_config(token.target),
            raw_prompt,
        }
    }

    /// Calls of one block. A call repeated within the block is reported once.
    #[tracing::instrument(level = "debug", skip(self, block))]
    pub fn extract_block(&self, block: &Block, block_index: usize) -> Vec<CallDescriptor> {
        if block.is_definition {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let calls: Vec<_> = token::calls(&block.text)
            .map(|token| self.describe(&token, block_index))
            .filter(|call| seen.insert(call.identity_key.clone()))
            .collect();
        if !calls.is_empty() {
            debug!(count = calls.len(), "extracted calls");
        }
        calls
    }

    pub fn extract(&self, blocks: &[Block]) -> Vec<CallDescriptor> {
        blocks
            .iter()
            .enumerate()
            .flat_map(|(index, block)| self.extract_block(block, index))
            .collect()
    }
}

/// Every `~define` field of the document, in order.
pub fn variable_slots(blocks: &[Block]) -> Vec<VariableSlot> {
    let mut seen = HashSet::new();
    blocks
        .iter()
        .enumerate()
        .filter(|(_, block)| !block.is_definition)
        .flat_map(|(index, block)| {
            token::calls(&block.text)
                .filter(|token| token.kind == CallKind::VariableInput)
                .map(|token| VariableSlot {
                    key: identity_key(token.kind, index, token.target, ""),
                    name: token.target.to_string(),
                    label: token.label.unwrap_or_default().to_string(),
                    block_index: index,
                })
                .collect::<Vec<_>>()
        })
        .filter(|slot| seen.insert(slot.key.clone()))
        .collect()
}
