//! Diagnostics for unsatisfiable requirement sets.

use std::fmt;

use pynix_util::errors::{PynixError, UnsatisfiedRequirement};

/// The requirements that could not be satisfied together, with the
/// packages that asked for them.
#[derive(Debug, Default)]
pub struct ConflictReport {
    pub causes: Vec<UnsatisfiedRequirement>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cause; duplicates are dropped.
    pub fn add(&mut self, requirement: String, parent: Option<String>) {
        let cause = UnsatisfiedRequirement {
            requirement,
            parent,
        };
        if !self.causes.contains(&cause) {
            self.causes.push(cause);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    /// Convert into the user-facing error, with the active provider
    /// configuration as help text.
    pub fn into_error(self, providers: Option<String>) -> PynixError {
        PynixError::ResolutionImpossible {
            causes: self.causes,
            providers,
        }
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.causes.is_empty() {
            return write!(f, "No conflicts.");
        }
        writeln!(f, "Conflicting requirements ({}):", self.causes.len())?;
        for cause in &self.causes {
            writeln!(f, "  {cause}")?;
        }
        Ok(())
    }
}
