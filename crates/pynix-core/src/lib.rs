//! Core domain types for pynix.
//!
//! Versions and specifiers, the requirement grammar, environment markers,
//! the target platform, configuration, and the resolved package record that
//! is handed to recipe generators.

pub mod config;
pub mod marker;
pub mod package;
pub mod requirement;
pub mod target;
pub mod version;
