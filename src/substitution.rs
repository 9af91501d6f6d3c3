//! # Variable Substitution
//!
//! Expands `{Name}` placeholders in a single left-to-right pass. Replacement
//! text is never scanned again, so values that themselves contain braces
//! cannot cause further expansion.
//!
//! Each placeholder resolves to the first of:
//!
//! 1. the override entered for a `~define[Name](...)` field of that name
//!    (fields are separate slots keyed by call site; the first slot in document
//!    order that carries a non-empty override wins)
//! 2. the declared default of `@define[Name](default)`
//! 3. the variable name itself, when declared without a default
//!
//! A placeholder matching none of these is left as written.

use std::{borrow::Cow, collections::HashMap};

use nom::{
    bytes::complete::is_not,
    character::complete::char,
    error::{context, VerboseError},
    sequence::delimited,
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::definitions::DefinitionSet;

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// User-entered values, keyed by the slot key (`define:{block}:{name}`).
pub type Overrides = HashMap<String, String>;

/// An editable field declared by `~define[Name](Label)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSlot {
    pub key: String,
    pub name: String,
    pub label: String,
    pub block_index: usize,
}

fn placeholder(input: &str) -> ParserResult<&str> {
    context(
        "placeholder",
        delimited(char('{'), is_not("{}\n"), char('}')),
    )(input)
}

/// Splits `text` into literal runs and placeholder names, in order.
fn scan(text: &str) -> Vec<Result<&str, &str>> {
    let mut parts = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match placeholder(&text[start..]) {
            Ok((rest, name)) => {
                if start > literal_start {
                    parts.push(Err(&text[literal_start..start]));
                }
                parts.push(Ok(name));
                pos = text.len() - rest.len();
                literal_start = pos;
            }
            Err(_) => pos = start + 1,
        }
    }
    if literal_start < text.len() {
        parts.push(Err(&text[literal_start..]));
    }
    parts
}

/// Names of every placeholder in `text`, in order, with repeats.
pub fn placeholders(text: &str) -> Vec<&str> {
    scan(text).into_iter().filter_map(Result::ok).collect()
}

/// Whether `text` contains `{name}`.
pub fn references(text: &str, name: &str) -> bool {
    placeholders(text).contains(&name)
}

#[derive(Debug, Clone, Copy)]
pub struct Substitution<'a> {
    definitions: &'a DefinitionSet,
    slots: &'a [VariableSlot],
    overrides: &'a Overrides,
}

impl<'a> Substitution<'a> {
    pub fn new(
        definitions: &'a DefinitionSet,
        slots: &'a [VariableSlot],
        overrides: &'a Overrides,
    ) -> Self {
        Self {
            definitions,
            slots,
            overrides,
        }
    }

    pub fn definitions(&self) -> &'a DefinitionSet {
        self.definitions
    }

    pub fn slots(&self) -> &'a [VariableSlot] {
        self.slots
    }

    fn override_for(&self, name: &str) -> Option<&'a str> {
        self.slots
            .iter()
            .filter(|slot| slot.name == name)
            .filter_map(|slot| self.overrides.get(&slot.key))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }

    pub fn resolve(&self, name: &str) -> Option<Cow<'a, str>> {
        if let Some(value) = self.override_for(name) {
            return Some(Cow::Borrowed(value));
        }
        let definition = self.definitions.variable(name)?;
        let default = definition.params.trim();
        if default.is_empty() {
            Some(Cow::Owned(definition.name.clone()))
        } else {
            Some(Cow::Borrowed(default))
        }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for part in scan(text) {
            match part {
                Ok(name) => match self.resolve(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
                Err(literal) => out.push_str(literal),
            }
        }
        out
    }

    /// The value shown in a define field: its own override, else the default.
    pub fn slot_value(&self, slot: &VariableSlot) -> String {
        self.overrides
            .get(&slot.key)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| self.slot_default(slot))
    }

    pub fn slot_default(&self, slot: &VariableSlot) -> String {
        self.definitions
            .variable_default(&slot.name)
            .unwrap_or_default()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{Definition, DefinitionKind};
    use pretty_assertions::assert_eq;

    fn definitions() -> DefinitionSet {
        DefinitionSet::new(vec![
            Definition::new(DefinitionKind::Variable, "Wallet", "ABC123"),
            Definition::new(DefinitionKind::Variable, "Bare", ""),
            Definition::new(DefinitionKind::Variable, "Loop", "{Wallet}"),
        ])
    }

    fn slot(block_index: usize, name: &str) -> VariableSlot {
        VariableSlot {
            key: format!("define:{block_index}:{name}"),
            name: name.into(),
            label: name.into(),
            block_index,
        }
    }

    #[test]
    fn test_resolution_order() {
        let definitions = definitions();
        let overrides = Overrides::new();
        let substitution = Substitution::new(&definitions, &[], &overrides);

        assert_eq!(
            substitution.apply("{Wallet} / {Bare} / {Unknown} / {wallet}"),
            "ABC123 / Bare / {Unknown} / {wallet}"
        );
    }

    #[test]
    fn test_override_by_slot() {
        let definitions = definitions();
        let slots = vec![slot(1, "Wallet"), slot(4, "Wallet"), slot(5, "Free")];
        let overrides = Overrides::from([
            ("define:1:Wallet".to_string(), String::new()),
            ("define:4:Wallet".to_string(), "XYZ".to_string()),
            ("define:5:Free".to_string(), "undeclared".to_string()),
        ]);
        let substitution = Substitution::new(&definitions, &slots, &overrides);

        assert_eq!(substitution.apply("{Wallet} {Free}"), "XYZ undeclared");
        assert_eq!(substitution.slot_value(&slots[0]), "ABC123");
        assert_eq!(substitution.slot_value(&slots[1]), "XYZ");
        assert_eq!(substitution.slot_default(&slots[2]), "");
    }

    #[test]
    fn test_single_pass() {
        let definitions = definitions();
        let overrides = Overrides::new();
        let substitution = Substitution::new(&definitions, &[], &overrides);
        assert_eq!(substitution.apply("{Loop}"), "{Wallet}");
    }

    #[test]
    fn test_braces_that_are_not_placeholders() {
        let definitions = definitions();
        let overrides = Overrides::new();
        let substitution = Substitution::new(&definitions, &[], &overrides);
        assert_eq!(
            substitution.apply("{} {{Wallet}} {a\nb} {Wallet"),
            "{} {ABC123} {a\nb} {Wallet"
        );
    }

    #[test]
    fn test_references() {
        assert!(references("Balance of {Wallet}", "Wallet"));
        assert!(!references("Balance of {Wallets}", "Wallet"));
        assert_eq!(placeholders("{A} and {B} and {A}"), vec!["A", "B", "A"]);
    }
}
