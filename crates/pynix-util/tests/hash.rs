use pynix_util::hash::{all_shard_keys, sha256_bytes, shard_key};

#[test]
fn test_sha256_bytes_empty() {
    let hash = sha256_bytes(b"");
    assert_eq!(
        hash,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_sha256_bytes_hello() {
    let hash = sha256_bytes(b"hello");
    assert_eq!(
        hash,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn test_shard_key_is_hash_prefix() {
    assert_eq!(shard_key("hello"), "2c");
    assert_eq!(shard_key(""), "e3");
}

#[test]
fn test_shard_keys_cover_all_buckets() {
    let keys: Vec<String> = all_shard_keys().collect();
    assert_eq!(keys.len(), 256);
    assert_eq!(keys[0], "00");
    assert_eq!(keys[255], "ff");
    assert!(keys.contains(&shard_key("requests")));
}
