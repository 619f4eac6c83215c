//! Binary wheels from the PyPI dependency database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use pynix_core::marker::{filter_applicable, MarkerContext};
use pynix_core::package::ProviderInfo;
use pynix_core::requirement::Requirement;
use pynix_core::target::{System, Target};
use pynix_core::version::Version;
use pynix_store::pypi::{wheel_releases, WheelRelease};
use pynix_store::MetadataStore;
use pynix_util::errors::{PynixError, PynixResult};
use regex::Regex;

use super::{
    not_found, parse_metadata_lines, sort_by_preference, Candidate, CandidatePayload,
    Dependencies, DependencyProvider, ProviderKind,
};

/// Filename patterns of wheels installable on `target`, most preferred first.
pub fn wheel_patterns(target: &Target) -> PynixResult<Vec<Regex>> {
    let (maj, min) = (target.python.major, target.python.minor);
    let cp_abi = if maj == 2 {
        format!("cp{maj}{min}mu")
    } else {
        format!("cp{maj}{min}m?")
    };
    let prefix = format!(r".*(py{maj}|cp{maj})({min})?[\.-].*({cp_abi}|abi3|none)-");

    let tags: Vec<String> = match target.system {
        System::Linux => {
            let arch = regex::escape(&target.arch);
            vec![
                format!("manylinux2014_{arch}"),
                format!("manylinux2010_{arch}"),
                format!("manylinux1_{arch}"),
                format!("manylinux_2_5_{arch}"),
                format!("manylinux_2_12_{arch}"),
                format!("manylinux_2_17_{arch}"),
                format!("linux_{arch}"),
                "any".to_string(),
            ]
        }
        System::Darwin => {
            let arch = if target.arch == "aarch64" {
                "arm64".to_string()
            } else {
                regex::escape(&target.arch)
            };
            vec![
                "any".to_string(),
                r"macosx_\d*_\d*_universal".to_string(),
                format!(r"macosx_\d*_\d*_{arch}"),
            ]
        }
    };

    tags.iter()
        .map(|tag| {
            Regex::new(&format!("{prefix}{tag}")).map_err(|e| PynixError::Generic {
                message: format!("invalid wheel pattern for {target}: {e}"),
            })
        })
        .collect()
}

pub struct WheelProvider {
    store: Box<dyn MetadataStore>,
    target: Target,
    context: MarkerContext,
    patterns: Vec<Regex>,
}

impl WheelProvider {
    pub fn new(store: Box<dyn MetadataStore>, target: &Target) -> PynixResult<Self> {
        Ok(Self {
            store,
            target: target.clone(),
            context: target.marker_context(),
            patterns: wheel_patterns(target)?,
        })
    }

    /// Whether a wheel filename fits the target platform and runtime.
    pub fn is_compatible_filename(&self, filename: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(filename))
    }

    fn python_requires_ok(&self, wheel: &WheelRelease) -> bool {
        let Some(spec) = wheel.deps.requires_python.as_deref() else {
            return true;
        };
        let spec = spec.trim().trim_matches(',');
        if spec.is_empty() {
            return true;
        }
        match Requirement::parse(&format!("python{spec}")) {
            Ok(req) => req.admits(self.target.python.version()),
            Err(_) => {
                tracing::warn!(
                    "`requires_python` of wheel {} could not be parsed, skipping it",
                    wheel.filename
                );
                false
            }
        }
    }

    /// Wheels of `name` compatible with the target, in store order.
    fn suitable_wheels(&self, name: &str) -> PynixResult<Vec<WheelRelease>> {
        Ok(wheel_releases(self.store.as_ref(), name)?
            .into_iter()
            .filter(|w| self.is_compatible_filename(&w.filename) && self.python_requires_ok(w))
            .collect())
    }

    /// The first wheel matching the most preferred pattern.
    fn select_preferred<'a>(&self, wheels: &'a [WheelRelease]) -> Option<&'a WheelRelease> {
        self.patterns
            .iter()
            .find_map(|pattern| wheels.iter().find(|w| pattern.is_match(&w.filename)))
    }

    /// The preferred compatible wheel of one release.
    pub fn choose_wheel(&self, name: &str, version: &Version) -> PynixResult<WheelRelease> {
        let wheels: Vec<WheelRelease> = self
            .suitable_wheels(name)?
            .into_iter()
            .filter(|w| Version::parse(&w.version) == *version)
            .collect();
        self.select_preferred(&wheels)
            .cloned()
            .ok_or_else(|| PynixError::NoCompatibleArtifact {
                name: name.to_string(),
                version: version.to_string(),
                target: self.target.to_string(),
            })
    }
}

impl DependencyProvider for WheelProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Wheel
    }

    fn all_candidates(
        &self,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Vec<Candidate>> {
        if !builds.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_version: BTreeMap<Version, Vec<WheelRelease>> = BTreeMap::new();
        for wheel in self.suitable_wheels(name)? {
            by_version
                .entry(Version::parse(&wheel.version))
                .or_default()
                .push(wheel);
        }

        let mut candidates: Vec<Candidate> = by_version
            .into_iter()
            .filter_map(|(version, wheels)| {
                let wheel = self.select_preferred(&wheels)?.clone();
                Some(Candidate {
                    name: name.to_string(),
                    raw_version: wheel.version.clone(),
                    version,
                    extras: extras.clone(),
                    build: None,
                    provider: ProviderKind::Wheel,
                    payload: CandidatePayload::Wheel(Arc::new(wheel)),
                })
            })
            .collect();
        sort_by_preference(&mut candidates);
        Ok(candidates)
    }

    fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies> {
        let CandidatePayload::Wheel(wheel) = &candidate.payload else {
            return Err(not_found(&self.kind(), candidate));
        };
        let lines = wheel.deps.requires_dist.iter().flatten().map(String::as_str);
        let parsed = parse_metadata_lines(lines, &wheel.filename);
        Ok(Dependencies {
            propagated: filter_applicable(&parsed, &self.context, &candidate.extras),
            build_time: Vec::new(),
        })
    }

    fn provider_info(&self, candidate: &Candidate) -> ProviderInfo {
        let mut info = ProviderInfo::new(self.kind().to_string());
        if let CandidatePayload::Wheel(wheel) = &candidate.payload {
            info.archive_name = Some(wheel.filename.clone());
        }
        info
    }
}
