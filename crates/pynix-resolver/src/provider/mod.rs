//! Candidate sources.
//!
//! Every source implements [`DependencyProvider`]. The
//! [`combined::CombinedProvider`] owns all of them and applies the
//! per-package provider preference lists.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use globset::Glob;
use pynix_core::package::ProviderInfo;
use pynix_core::requirement::{parse_cached, Requirement};
use pynix_core::version::{preference_key, Version};
use pynix_store::conda::CondaRecord;
use pynix_store::pypi::{SdistRelease, WheelRelease};
use pynix_util::errors::{PynixError, PynixResult};

pub mod combined;
pub mod conda;
pub mod nixpkgs;
pub mod platform;
pub mod sdist;
pub mod wheel;

/// Which provider a candidate comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    Wheel,
    Sdist,
    Nixpkgs,
    /// A conda channel by name.
    Conda(String),
    Platform,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Wheel => f.write_str("wheel"),
            ProviderKind::Sdist => f.write_str("sdist"),
            ProviderKind::Nixpkgs => f.write_str("nixpkgs"),
            ProviderKind::Conda(channel) => write!(f, "conda/{channel}"),
            ProviderKind::Platform => f.write_str("platform"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = PynixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "wheel" => Ok(ProviderKind::Wheel),
            "sdist" => Ok(ProviderKind::Sdist),
            "nixpkgs" => Ok(ProviderKind::Nixpkgs),
            "platform" => Ok(ProviderKind::Platform),
            other => match other.strip_prefix("conda/") {
                Some(channel) if !channel.is_empty() => Ok(ProviderKind::Conda(channel.to_string())),
                _ => Err(PynixError::Config {
                    message: format!(
                        "unknown provider `{other}` (expected wheel, sdist, nixpkgs, platform or conda/<channel>)"
                    ),
                }),
            },
        }
    }
}

/// Provider specific data a candidate carries.
#[derive(Debug, Clone)]
pub enum CandidatePayload {
    Wheel(Arc<WheelRelease>),
    Sdist(Arc<SdistRelease>),
    Nixpkgs,
    Conda(Arc<CondaRecord>),
    Platform,
}

/// One concrete choice for a package name.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub version: Version,
    pub raw_version: String,
    /// Extras the candidate was requested with.
    pub extras: BTreeSet<String>,
    pub build: Option<String>,
    pub provider: ProviderKind,
    pub payload: CandidatePayload,
}

/// Identity of a candidate, used for pins, incompatibilities and caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId {
    pub name: String,
    pub provider: ProviderKind,
    pub version: String,
    pub build: Option<String>,
    pub extras: BTreeSet<String>,
}

impl Candidate {
    pub fn id(&self) -> CandidateId {
        CandidateId {
            name: self.name.clone(),
            provider: self.provider.clone(),
            version: self.raw_version.clone(),
            build: self.build.clone(),
            extras: self.extras.clone(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.raw_version)?;
        if let Some(build) = &self.build {
            write!(f, " {build}")?;
        }
        Ok(())
    }
}

/// Requirements of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Needed at runtime by consumers.
    pub propagated: Vec<Requirement>,
    /// Needed only to build the candidate.
    pub build_time: Vec<Requirement>,
}

impl Dependencies {
    pub fn all(&self) -> impl Iterator<Item = &Requirement> {
        self.propagated.iter().chain(&self.build_time)
    }
}

/// A source of candidates and their dependencies.
pub trait DependencyProvider {
    fn kind(&self) -> ProviderKind;

    /// Every candidate for a normalized `name`, best first.
    ///
    /// A non-empty `builds` restricts the result to candidates whose build
    /// matches every pattern; sources without build variants return nothing.
    fn all_candidates(
        &self,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Vec<Candidate>>;

    /// Marker-filtered requirements of a candidate this provider produced.
    fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies>;

    fn provider_info(&self, candidate: &Candidate) -> ProviderInfo;
}

/// Error for a candidate handed to the wrong provider.
pub(crate) fn not_found(kind: &ProviderKind, candidate: &Candidate) -> PynixError {
    PynixError::PackageNotFoundInProvider {
        provider: kind.to_string(),
        name: candidate.name.clone(),
        version: candidate.raw_version.clone(),
    }
}

/// Parse requirement lines from third-party metadata. Lines that do not
/// parse are skipped with a warning.
pub(crate) fn parse_metadata_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    origin: &str,
) -> Vec<Requirement> {
    lines
        .into_iter()
        .filter_map(|line| match parse_cached(line) {
            Ok(requirement) => Some(requirement),
            Err(e) => {
                tracing::warn!("skipping requirement of {origin}: {e}");
                None
            }
        })
        .collect()
}

/// Sort best first: stable releases before pre-releases, then newest.
pub(crate) fn sort_by_preference(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| preference_key(&b.version).cmp(&preference_key(&a.version)));
}

/// Whether `build` matches every fnmatch-style pattern.
pub(crate) fn build_matches(build: &str, patterns: &BTreeSet<String>) -> bool {
    patterns.iter().all(|pattern| match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(build),
        Err(e) => {
            tracing::warn!("invalid build pattern `{pattern}`: {e}");
            pattern == build
        }
    })
}
