//! # Block Segmenter
//!
//! Splits a document into an ordered list of [`Block`]s. A block's position in
//! the returned vector is its index, and that index is part of every identity
//! key derived from the calls inside it.
//!
//! Scanning is a line state machine:
//!
//! * `Normal`: lines accumulate into the current block. A blank line ends the
//!   block. A `:::` line ends the block and opens a definition block. A code
//!   fence opener switches to `Code`.
//! * `Definition`: every line is kept verbatim until the closing `:::`.
//! * `Code`: every line, blank lines included, is kept until the matching
//!   closing fence. Nothing inside a code fence is taken for a definition fence.
//!
//! Segmentation never fails. An unterminated definition fence is closed at the
//! end of input and an unterminated code fence swallows the rest of the document.

pub mod fence;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fence::{CodeFence, FenceLine};

pub const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub text: String,
    #[serde(rename = "isDefinitionBlock")]
    pub is_definition: bool,
    /// 1-based line of the block's first line in the source document.
    pub line: usize,
}

impl Block {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_definition: false,
            line: 1,
        }
    }

    pub fn definition(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_definition: true,
            line: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Definition,
    Code(CodeFence),
}

#[derive(Debug, Default)]
pub struct Segmenter {
    blocks: Vec<Block>,
    lines: Vec<String>,
    start_line: usize,
    is_definition: bool,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(level = "debug", skip(self, text), fields(len = text.len()))]
    pub fn segment(mut self, text: &str) -> Vec<Block> {
        let mut state = State::Normal;

        for (number, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l)) {
            state = match state {
                State::Normal => self.normal_line(line, number),
                State::Definition => {
                    self.push(line, number);
                    if fence::is_definition_fence(line) {
                        self.flush();
                        State::Normal
                    } else {
                        State::Definition
                    }
                }
                State::Code(open) => {
                    self.push(line, number);
                    if open.closes(line) {
                        State::Normal
                    } else {
                        State::Code(open)
                    }
                }
            };
        }

        match state {
            State::Definition => warn!("unterminated definition fence closed at end of input"),
            State::Code(_) => debug!("unterminated code fence closed at end of input"),
            State::Normal => {}
        }
        self.flush();

        debug!(blocks = self.blocks.len(), "segmented document");
        self.blocks
    }

    fn normal_line(&mut self, line: &str, number: usize) -> State {
        if line.trim().is_empty() {
            self.flush();
            return State::Normal;
        }
        match fence::classify(line) {
            Some(FenceLine::Definition) => {
                self.flush();
                self.is_definition = true;
                self.push(line, number);
                State::Definition
            }
            Some(FenceLine::Code(open)) => {
                self.push(line, number);
                State::Code(open)
            }
            None => {
                self.push(line, number);
                State::Normal
            }
        }
    }

    fn push(&mut self, line: &str, number: usize) {
        if self.lines.is_empty() {
            self.start_line = number;
        }
        self.lines.push(line.to_string());
    }

    fn flush(&mut self) {
        while self
            .lines
            .last()
            .is_some_and(|line| line.trim().is_empty())
        {
            self.lines.pop();
        }
        if !self.lines.is_empty() {
            self.blocks.push(Block {
                text: self.lines.join("\n"),
                is_definition: self.is_definition,
                line: self.start_line,
            });
        }
        self.lines.clear();
        self.is_definition = false;
    }
}

pub fn segment(text: &str) -> Vec<Block> {
    Segmenter::new().segment(text)
}

/// Rebuilds document text from blocks, one blank line between blocks.
pub fn join_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> String {
    blocks
        .into_iter()
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
