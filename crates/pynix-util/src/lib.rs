//! Shared utilities for pynix.
//!
//! This crate provides cross-cutting concerns used by all other pynix crates:
//! the unified error type, hashing for metadata store shards, and terminal
//! status output.

pub mod errors;
pub mod hash;
pub mod progress;
