use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// One requirement that no candidate could satisfy, with the package that
/// asked for it (`None` for root requirements).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiedRequirement {
    pub requirement: String,
    pub parent: Option<String>,
}

impl fmt::Display for UnsatisfiedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} (required by {parent})", self.requirement),
            None => write!(f, "{} (root requirement)", self.requirement),
        }
    }
}

fn render_causes(causes: &[UnsatisfiedRequirement]) -> String {
    causes
        .iter()
        .map(|c| format!("\n  - {c}"))
        .collect::<String>()
}

fn render_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Unified error type for all pynix operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PynixError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or configuration JSON could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed requirement or marker text.
    #[error("Could not parse requirement `{input}`: {reason}")]
    #[diagnostic(help("Check the requirement syntax (PEP 508 or conda match spec)"))]
    Parse { input: String, reason: String },

    /// A provider was asked about a candidate it never enumerated.
    #[error("Provider {provider} does not know {name} {version}")]
    PackageNotFoundInProvider {
        provider: String,
        name: String,
        version: String,
    },

    /// No allowed provider offers any version of the package.
    #[error(
        "No candidates for `{name}` from allowed providers [{}]; providers carrying it: [{}]",
        render_list(.tried),
        render_list(.alternatives)
    )]
    #[diagnostic(help(
        "Allow one of the providers carrying the package for it in the [providers] configuration"
    ))]
    NoCandidatesAvailable {
        name: String,
        tried: Vec<String>,
        alternatives: Vec<String>,
    },

    /// Backtracking exhausted every option.
    #[error("Resolution impossible, unsatisfiable requirements:{}", render_causes(.causes))]
    ResolutionImpossible {
        causes: Vec<UnsatisfiedRequirement>,
        #[help]
        providers: Option<String>,
    },

    /// The round budget ran out before a consistent assignment was found.
    #[error("Resolution did not finish within {rounds} rounds")]
    #[diagnostic(help("Pin some requirements more tightly to reduce backtracking"))]
    ResolutionTooDeep { rounds: usize },

    /// A dependency cycle made only of build-time edges.
    #[error("Circular build-time dependency: {from} -> {to}")]
    #[diagnostic(help("Build-time cycles cannot be broken automatically"))]
    CircularBuildDependency { from: String, to: String },

    /// A release exists but none of its binary archives fit the target.
    #[error("No wheel of {name} {version} is compatible with {target}")]
    NoCompatibleArtifact {
        name: String,
        version: String,
        target: String,
    },

    /// Target operating system is not supported.
    #[error("Unsupported platform: {system}")]
    UnsupportedPlatform { system: String },

    /// The metadata store is unreadable or inconsistent.
    #[error("Metadata store error: {message}")]
    Store { message: String },

    /// Invalid configuration (provider names, target description, paths).
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check your pynix.toml"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for results carrying a [`PynixError`].
pub type PynixResult<T> = Result<T, PynixError>;
