//! # agentmark: agent calls embedded in Markdown
//!
//! A document is ordinary Markdown with two additions:
//!
//! - **Definition blocks** fenced by `:::` lines declaring variables
//!   (`@define`), external services (`@mcp`), capabilities (`@tool`) and
//!   agents (`@ai`), each optionally followed by prose description.
//! - **Call sites** in content blocks such as `~ai[Agent](prompt)`,
//!   `~ai-image[...]`, `~ai-speech[...]`, `~intent[Agent](<Label>, prompt)` and
//!   `~define[Variable](Label)`.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Text → Segmenter → Definition Resolver → Call Extractor → Evaluator → Renderer
//!                                  ↘ Substitution ↗
//! ```
//!
//! ### Stage 1: Segmentation
//!
//! [`segmenter`] splits the text into blocks on blank lines, keeping fenced
//! definition and code regions whole.
//!
//! ### Stage 2: Definition Resolution
//!
//! [`definitions`] parses `@kind[name](params)` headers out of definition
//! blocks into a flat [`definitions::DefinitionSet`].
//!
//! ### Stage 3: Call Extraction
//!
//! [`extractor`] finds call sites in content blocks and gives every call a
//! stable identity key derived from its kind, block position, agent and raw
//! prompt. [`substitution`] expands `{Name}` placeholders in prompts without
//! changing the key.
//!
//! ### Stage 4: Evaluation
//!
//! [`evaluator`] issues at most one generation request per key through a
//! [`generation::Generator`], caches results and regenerates only what a
//! variable change affects. Media results pass through [`media`].
//!
//! ### Stage 5: Rendering
//!
//! [`render`] replaces call sites with results, progress placeholders or
//! markers that a [`render::AdapterRegistry`] turns into presentation.
//!
//! [`session::Session`] ties the stages together around one open document.

pub mod config;
pub mod context;
pub mod definitions;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod extractor;
pub mod generation;
pub mod media;
pub mod render;
pub mod segmenter;
pub mod session;
pub mod substitution;

// Re-exports
pub use context::SessionContext;
pub use document::Document;
pub use error::*;
pub use evaluator::Evaluator;
pub use session::{EditOutcome, Session, SessionError, SessionEvent};
