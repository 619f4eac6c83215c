use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a byte slice, returning a lowercase hex string.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Shard key of a package name in the bucketed metadata store.
///
/// The key is the first two hex characters of the SHA-256 of the name, so
/// there are exactly 256 shards (`00` .. `ff`).
pub fn shard_key(name: &str) -> String {
    let mut digest = sha256_bytes(name.as_bytes());
    digest.truncate(2);
    digest
}

/// All 256 shard keys in ascending order.
pub fn all_shard_keys() -> impl Iterator<Item = String> {
    (0u16..256).map(|n| format!("{n:02x}"))
}
