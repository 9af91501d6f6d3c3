use std::collections::HashSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Lifecycle of a user-triggered call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IntentState {
    #[default]
    Idle,
    Loading,
    Success {
        response: String,
    },
    Failure {
        error: String,
    },
}

impl IntentState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

#[derive(Debug, Default)]
pub struct IntentStates {
    states: DashMap<String, IntentState>,
}

impl IntentStates {
    pub fn get(&self, key: &str) -> IntentState {
        self.states
            .get(key)
            .map(|state| state.value().clone())
            .unwrap_or_default()
    }

    /// Moves `key` to `Loading`. Returns `false` if it is already loading.
    pub fn begin(&self, key: &str) -> bool {
        let mut state = self.states.entry(key.to_string()).or_default();
        if state.is_loading() {
            return false;
        }
        *state = IntentState::Loading;
        true
    }

    pub fn finish(&self, key: &str, result: Result<String, String>) {
        let state = match result {
            Ok(response) => IntentState::Success { response },
            Err(error) => IntentState::Failure { error },
        };
        self.states.insert(key.to_string(), state);
    }

    pub fn retain(&self, keys: &HashSet<String>) {
        self.states.retain(|key, _| keys.contains(key));
    }

    pub fn clear(&self) {
        self.states.clear();
    }
}
