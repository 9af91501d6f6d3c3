use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Definition, DefinitionKind};

/// A capability attached to an agent through `tool:[Name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityBinding {
    pub name: String,
    pub params: String,
}

/// Binding information carried by a call whose agent resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundConfig {
    /// The agent definition's params.
    pub variable_defaults: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilityBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    pub name: String,
    pub params: String,
}

/// Every definition of a document, flattened in document order.
///
/// Duplicates are kept. Lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionSet {
    definitions: Vec<Definition>,
}

impl DefinitionSet {
    pub fn new(definitions: Vec<Definition>) -> Self {
        let set = Self { definitions };
        for (kind, name) in set.duplicates() {
            warn!(%kind, name = %name, "duplicate definition, first one wins");
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn find(&self, kind: &DefinitionKind, name: &str) -> Option<&Definition> {
        self.definitions
            .iter()
            .find(|d| &d.kind == kind && kind.matches_name(&d.name, name))
    }

    pub fn variable(&self, name: &str) -> Option<&Definition> {
        self.find(&DefinitionKind::Variable, name)
    }

    pub fn agent(&self, name: &str) -> Option<&Definition> {
        self.find(&DefinitionKind::Agent, name)
    }

    pub fn capability(&self, name: &str) -> Option<&Definition> {
        self.find(&DefinitionKind::Capability, name)
    }

    /// The declared default of a variable, trimmed. Empty when declared without one.
    pub fn variable_default(&self, name: &str) -> Option<&str> {
        self.variable(name).map(|d| d.params.trim())
    }

    pub fn external_services(&self) -> Vec<ServiceRef> {
        self.definitions
            .iter()
            .filter(|d| d.kind == DefinitionKind::ExternalService)
            .map(|d| ServiceRef {
                name: d.name.clone(),
                params: d.params.clone(),
            })
            .collect()
    }

    /// A `capability_ref` that names no capability of this document is ignored.
    pub fn resolved_capability(&self, agent: &Definition) -> Option<&Definition> {
        agent
            .capability_ref
            .as_deref()
            .and_then(|name| self.capability(name))
    }

    /// The binding for calls to `agent`, or `None` when no such agent is declared.
    pub fn bound_config(&self, agent: &str) -> Option<BoundConfig> {
        let definition = self.agent(agent)?;
        Some(BoundConfig {
            variable_defaults: definition.params.clone(),
            capability: self
                .resolved_capability(definition)
                .map(|capability| CapabilityBinding {
                    name: capability.name.clone(),
                    params: capability.params.clone(),
                }),
        })
    }

    /// `(kind, name)` pairs declared more than once, reported once each.
    pub fn duplicates(&self) -> Vec<(DefinitionKind, String)> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();
        for definition in &self.definitions {
            let name = match definition.kind {
                DefinitionKind::Variable => definition.name.clone(),
                _ => definition.name.to_lowercase(),
            };
            let key = (definition.kind.clone(), name);
            if !seen.insert(key.clone()) && reported.insert(key) {
                duplicates.push((definition.kind.clone(), definition.name.clone()));
            }
        }
        duplicates
    }
}

impl FromIterator<Definition> for DefinitionSet {
    fn from_iter<T: IntoIterator<Item = Definition>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> DefinitionSet {
        DefinitionSet::new(vec![
            Definition::new(DefinitionKind::Variable, "Wallet", " ABC123 "),
            Definition::new(DefinitionKind::Variable, "Wallet", "SECOND"),
            Definition::new(DefinitionKind::Variable, "Empty", ""),
            Definition::new(DefinitionKind::ExternalService, "SolanaMCP", "\"https://mcp\""),
            Definition::new(DefinitionKind::Capability, "Balance", "address: String"),
            Definition::new(DefinitionKind::Agent, "Summarizer", "\"gpt-4o-mini\"")
                .with_capability("balance"),
            Definition::new(DefinitionKind::Agent, "Dangling", "m").with_capability("Missing"),
            Definition::new(DefinitionKind::Agent, "summarizer", "later"),
        ])
    }

    #[test]
    fn test_first_match_wins() {
        let set = sample();
        assert_eq!(set.variable_default("Wallet"), Some("ABC123"));
        assert_eq!(set.agent("SUMMARIZER").unwrap().params, "\"gpt-4o-mini\"");
        assert_eq!(
            set.duplicates(),
            vec![
                (DefinitionKind::Variable, "Wallet".to_string()),
                (DefinitionKind::Agent, "summarizer".to_string()),
            ]
        );
    }

    #[test]
    fn test_variable_names_are_case_sensitive() {
        let set = sample();
        assert!(set.variable("wallet").is_none());
        assert_eq!(set.variable_default("Empty"), Some(""));
    }

    #[test]
    fn test_bound_config() {
        let set = sample();
        assert_eq!(
            set.bound_config(" summarizer "),
            Some(BoundConfig {
                variable_defaults: "\"gpt-4o-mini\"".into(),
                capability: Some(CapabilityBinding {
                    name: "Balance".into(),
                    params: "address: String".into(),
                }),
            })
        );
        assert_eq!(set.bound_config("Dangling").unwrap().capability, None);
        assert_eq!(set.bound_config("Nobody"), None);
    }

    #[test]
    fn test_external_services() {
        assert_eq!(
            sample().external_services(),
            vec![ServiceRef {
                name: "SolanaMCP".into(),
                params: "\"https://mcp\"".into(),
            }]
        );
    }
}
