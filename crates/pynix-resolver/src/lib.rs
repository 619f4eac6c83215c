//! Dependency resolution engine: provider composition with priority
//! fallback, a backtracking solver over per-name criteria, and the
//! finalization pass that turns the solution into a cycle-free graph of
//! resolved packages.

pub mod cache;
pub mod conflict;
pub mod graph;
pub mod provider;
pub mod resolver;

pub use provider::combined::CombinedProvider;
pub use resolver::{ResolveOptions, Resolver};
