use pynix_util::errors::PynixResult;
use serde_json::Value;

/// Per-package metadata lookup.
///
/// Implementations return the raw JSON document stored for a normalized
/// package name, or `None` when the store has never heard of it.
pub trait MetadataStore {
    fn get(&self, name: &str) -> PynixResult<Option<Value>>;

    /// Names stored in one shard, sorted.
    fn names_in_shard(&self, shard: &str) -> PynixResult<Vec<String>>;
}

impl<S: MetadataStore + ?Sized> MetadataStore for Box<S> {
    fn get(&self, name: &str) -> PynixResult<Option<Value>> {
        (**self).get(name)
    }

    fn names_in_shard(&self, shard: &str) -> PynixResult<Vec<String>> {
        (**self).names_in_shard(shard)
    }
}
