//! # Definition Resolver
//!
//! Turns definition blocks into typed [`Definition`]s.
//!
//! ```text
//! :::
//! @define[Wallet](3NAseq...)
//! @mcp[SolanaMCP]("https://mcp.solana.com/mcp")
//! @tool[Balance](address: String)
//! **Description:** get solana balance
//! @ai[Summarizer]("gpt-4o-mini")
//! tool:[Balance]
//! Summarize holdings.
//! :::
//! ```
//!
//! A header line starts a definition; the lines that follow, up to the next
//! header, form its description. Resolution is lenient: text before the first
//! header is ignored, a malformed header is dropped together with the lines
//! under it, and unknown kinds are kept as [`DefinitionKind::Other`].

pub mod header;
pub mod set;

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::segmenter::{fence, Block};

pub use set::{BoundConfig, CapabilityBinding, DefinitionSet, ServiceRef};

lazy_static! {
    static ref DESCRIPTION_LABEL: Regex =
        Regex::new(r"(?i)\*\*Description:\*\*\s*").expect("valid description label pattern");
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefinitionKind {
    /// `@define`: a named value usable as `{Name}`.
    Variable,
    /// `@mcp`: an external service forwarded with every generation request.
    ExternalService,
    /// `@tool`
    Capability,
    /// `@ai`
    Agent,
    /// Any other tag, kept verbatim.
    Other(String),
}

impl DefinitionKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "define" => Self::Variable,
            "mcp" => Self::ExternalService,
            "tool" => Self::Capability,
            "ai" => Self::Agent,
            _ => Self::Other(tag.trim().to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Variable => "define",
            Self::ExternalService => "mcp",
            Self::Capability => "tool",
            Self::Agent => "ai",
            Self::Other(tag) => tag,
        }
    }

    /// Variable names are matched exactly; every other kind ignores case.
    pub fn matches_name(&self, declared: &str, wanted: &str) -> bool {
        match self {
            Self::Variable => declared == wanted,
            _ => declared.eq_ignore_ascii_case(wanted.trim()),
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub params: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_ref: Option<String>,
}

impl Definition {
    pub fn new(kind: DefinitionKind, name: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: params.into(),
            description: None,
            capability_ref: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability_ref = Some(capability.into());
        self
    }
}

/// A definition whose description is still being collected.
struct OpenDefinition {
    definition: Definition,
    description: Vec<String>,
}

impl OpenDefinition {
    fn push_line(&mut self, line: &str) {
        let mut line = line.to_string();
        if self.definition.capability_ref.is_none() {
            if let Some((name, range)) = header::find_tool_binding(&line) {
                self.definition.capability_ref = Some(name.to_string());
                line.replace_range(range, "");
            }
        }
        let line = line.trim();
        if !line.is_empty() {
            self.description.push(line.to_string());
        }
    }

    fn finish(mut self) -> Definition {
        let joined = self.description.join(" ");
        let description = DESCRIPTION_LABEL.replace(&joined, "");
        let description = description.trim();
        if !description.is_empty() {
            self.definition.description = Some(description.to_string());
        }
        self.definition
    }
}

/// Resolves a single block. Returns `None` for content blocks.
#[tracing::instrument(level = "debug", skip(block), fields(line = block.line))]
pub fn resolve_block(block: &Block) -> Option<Vec<Definition>> {
    if !block.is_definition {
        return None;
    }

    let mut definitions = Vec::new();
    let mut open: Option<OpenDefinition> = None;

    for line in block.text.lines() {
        let trimmed = line.trim();
        if fence::is_definition_fence(trimmed) {
            continue;
        }

        if trimmed.starts_with('@') {
            definitions.extend(open.take().map(OpenDefinition::finish));
            match header::parse_header(trimmed) {
                Ok((_, header)) => {
                    let mut definition = Definition::new(
                        DefinitionKind::from_tag(header.kind),
                        header.name,
                        header.params,
                    );
                    definition.capability_ref = header::find_tool_binding(header.params)
                        .map(|(name, _)| name.to_string());
                    open = Some(OpenDefinition {
                        definition,
                        description: Vec::new(),
                    });
                }
                Err(e) => debug!(line = trimmed, error = ?e, "skipping malformed definition header"),
            }
            continue;
        }

        if let Some(open) = open.as_mut() {
            open.push_line(trimmed);
        }
    }
    definitions.extend(open.take().map(OpenDefinition::finish));

    debug!(count = definitions.len(), "resolved definitions");
    Some(definitions)
}

/// Resolves every definition block of a document, flattened in document order.
///
/// A `capability_ref` naming no capability anywhere in the document is cleared.
pub fn resolve(blocks: &[Block]) -> DefinitionSet {
    let mut definitions: Vec<Definition> =
        blocks.iter().filter_map(resolve_block).flatten().collect();
    let capabilities: Vec<String> = definitions
        .iter()
        .filter(|d| d.kind == DefinitionKind::Capability)
        .map(|d| d.name.clone())
        .collect();
    for definition in &mut definitions {
        let Some(name) = definition.capability_ref.as_deref() else {
            continue;
        };
        let known = capabilities
            .iter()
            .any(|declared| DefinitionKind::Capability.matches_name(declared, name));
        if !known {
            debug!(agent = %definition.name, capability = %name, "unknown capability reference dropped");
            definition.capability_ref = None;
        }
    }
    DefinitionSet::new(definitions)
}
