use crate::{
    definitions::{self, DefinitionSet},
    extractor::{self, CallDescriptor, Extractor},
    segmenter::{self, Block},
    substitution::{Overrides, Substitution, VariableSlot},
};

/// A parsed document: blocks, flattened definitions and `~define` slots.
/// Re-parsed from scratch on every edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    blocks: Vec<Block>,
    definitions: DefinitionSet,
    slots: Vec<VariableSlot>,
}

/// How two parses of a document differ, block by block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockChange {
    None,
    /// Same block count and exactly one content block differs.
    Single(usize),
    Structural,
}

impl Document {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let blocks = segmenter::segment(&text);
        let definitions = definitions::resolve(&blocks);
        let slots = extractor::variable_slots(&blocks);
        Self {
            text,
            blocks,
            definitions,
            slots,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn definitions(&self) -> &DefinitionSet {
        &self.definitions
    }

    pub fn slots(&self) -> &[VariableSlot] {
        &self.slots
    }

    pub fn slot(&self, key: &str) -> Option<&VariableSlot> {
        self.slots.iter().find(|slot| slot.key == key)
    }

    pub fn substitution<'a>(&'a self, overrides: &'a Overrides) -> Substitution<'a> {
        Substitution::new(&self.definitions, &self.slots, overrides)
    }

    pub fn calls(&self, overrides: &Overrides) -> Vec<CallDescriptor> {
        let substitution = self.substitution(overrides);
        Extractor::new(&substitution).extract(&self.blocks)
    }

    /// The document with block `from` moved to position `to`, or `None` when
    /// either index is out of range.
    pub fn move_block(&self, from: usize, to: usize) -> Option<Self> {
        if from >= self.blocks.len() || to >= self.blocks.len() {
            return None;
        }
        let mut blocks = self.blocks.clone();
        let block = blocks.remove(from);
        blocks.insert(to, block);
        Some(Self::parse(segmenter::join_blocks(&blocks)))
    }

    pub fn change_from(&self, previous: &Document) -> BlockChange {
        if self.blocks.len() != previous.blocks.len() || self.slots != previous.slots {
            return BlockChange::Structural;
        }
        let changed: Vec<usize> = self
            .blocks
            .iter()
            .zip(&previous.blocks)
            .enumerate()
            .filter(|(_, (a, b))| a.text != b.text || a.is_definition != b.is_definition)
            .map(|(index, _)| index)
            .collect();
        match changed.as_slice() {
            [] => BlockChange::None,
            [index]
                if !self.blocks[*index].is_definition
                    && !previous.blocks[*index].is_definition =>
            {
                BlockChange::Single(*index)
            }
            _ => BlockChange::Structural,
        }
    }
}
