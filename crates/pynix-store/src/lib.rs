//! Read-only metadata collaborators for the resolver.
//!
//! The PyPI dependency database is split into 256 JSON buckets keyed by the
//! first two hex characters of `sha256(name)`. [`bucket::BucketStore`] reads
//! those lazily, [`memory::MemoryStore`] serves a single JSON object for
//! tests. Typed views over the wheel and sdist layouts live in [`pypi`], the
//! nixpkgs attribute index in [`nixpkgs`], and conda channel repodata in
//! [`conda`].

pub mod bucket;
pub mod conda;
pub mod memory;
pub mod nixpkgs;
pub mod pypi;
pub mod store;

pub use bucket::BucketStore;
pub use memory::MemoryStore;
pub use store::MetadataStore;
