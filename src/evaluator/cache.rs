use std::collections::{BTreeMap, HashSet};

use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub status: CacheStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: CacheStatus::Pending,
            value: None,
            error: None,
        }
    }

    pub fn ready(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: CacheStatus::Ready,
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: CacheStatus::Failed,
            value: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == CacheStatus::Ready
    }
}

/// Identity key to entry.
#[derive(Debug, Default)]
pub struct PreviewCache {
    entries: DashMap<String, CacheEntry>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the entry for `key`, creating it as `Pending` when absent. The
    /// flag tells whether this call created it.
    pub fn insert_pending_if_absent(&self, key: &str) -> (CacheEntry, bool) {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(CacheEntry::pending(key)).clone(), true),
        }
    }

    pub fn reset_pending(&self, key: &str) {
        self.entries
            .insert(key.to_string(), CacheEntry::pending(key));
    }

    pub fn settle(&self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    pub fn retain(&self, keys: &HashSet<String>) {
        self.entries.retain(|key, _| keys.contains(key));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ready values only, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .value
                    .as_ref()
                    .filter(|_| entry.is_ready())
                    .map(|value| (entry.key().clone(), value.clone()))
            })
            .collect()
    }

    pub fn preload<I, K, V>(&self, previews: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in previews {
            let key = key.into();
            self.entries
                .insert(key.clone(), CacheEntry::ready(key, value));
        }
    }
}
