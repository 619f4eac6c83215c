use std::collections::BTreeMap;

use pynix_util::errors::{PynixError, PynixResult};
use pynix_util::hash::shard_key;
use serde_json::Value;

use crate::store::MetadataStore;

/// Store backed by one JSON object keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; anything else is a store error.
    pub fn from_value(value: Value) -> PynixResult<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            other => Err(PynixError::Store {
                message: format!("expected a JSON object of packages, got `{other}`"),
            }),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataStore for MemoryStore {
    fn get(&self, name: &str) -> PynixResult<Option<Value>> {
        Ok(self.entries.get(name).cloned())
    }

    fn names_in_shard(&self, shard: &str) -> PynixResult<Vec<String>> {
        Ok(self
            .entries
            .keys()
            .filter(|name| shard_key(name) == shard)
            .cloned()
            .collect())
    }
}
