//! Virtual packages describing the host platform (`__glibc`, `__unix`, ...).

use std::collections::{BTreeMap, BTreeSet};

use pynix_core::package::ProviderInfo;
use pynix_core::requirement::normalize_name;
use pynix_core::version::Version;
use pynix_util::errors::PynixResult;

use super::{
    build_matches, not_found, Candidate, CandidatePayload, Dependencies, DependencyProvider,
    ProviderKind,
};

/// Build string of every virtual package.
const VIRTUAL_BUILD: &str = "0";

pub struct PlatformProvider {
    packages: BTreeMap<String, String>,
}

impl PlatformProvider {
    /// Virtual packages from a `name -> version` map; names are normalized
    /// like requirement names, so `__glibc` becomes `--glibc`.
    pub fn new(packages: &BTreeMap<String, String>) -> Self {
        Self {
            packages: packages
                .iter()
                .map(|(name, version)| (normalize_name(name), version.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl DependencyProvider for PlatformProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Platform
    }

    fn all_candidates(
        &self,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Vec<Candidate>> {
        let Some(version) = self.packages.get(name) else {
            return Ok(Vec::new());
        };
        if !build_matches(VIRTUAL_BUILD, builds) {
            return Ok(Vec::new());
        }
        Ok(vec![Candidate {
            name: name.to_string(),
            version: Version::parse(version),
            raw_version: version.clone(),
            extras: extras.clone(),
            build: Some(VIRTUAL_BUILD.to_string()),
            provider: ProviderKind::Platform,
            payload: CandidatePayload::Platform,
        }])
    }

    fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies> {
        if !matches!(candidate.payload, CandidatePayload::Platform)
            || !self.packages.contains_key(&candidate.name)
        {
            return Err(not_found(&self.kind(), candidate));
        }
        Ok(Dependencies::default())
    }

    fn provider_info(&self, _candidate: &Candidate) -> ProviderInfo {
        ProviderInfo::new(self.kind().to_string())
    }
}
