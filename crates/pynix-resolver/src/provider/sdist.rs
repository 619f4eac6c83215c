//! Source distributions from the PyPI dependency database.

use std::collections::BTreeSet;
use std::sync::Arc;

use pynix_core::marker::{filter_applicable, Marker, MarkerContext};
use pynix_core::package::ProviderInfo;
use pynix_core::requirement::{normalize_name, Requirement};
use pynix_core::target::Target;
use pynix_core::version::Version;
use pynix_store::pypi::{sdist_releases, SdistRelease};
use pynix_store::MetadataStore;
use pynix_util::errors::PynixResult;

use super::{
    not_found, parse_metadata_lines, sort_by_preference, Candidate, CandidatePayload,
    Dependencies, DependencyProvider, ProviderKind,
};

pub struct SdistProvider {
    store: Box<dyn MetadataStore>,
    target: Target,
    context: MarkerContext,
}

impl SdistProvider {
    pub fn new(store: Box<dyn MetadataStore>, target: &Target) -> Self {
        Self {
            store,
            target: target.clone(),
            context: target.marker_context(),
        }
    }

    fn python_requires_ok(&self, name: &str, release: &SdistRelease) -> bool {
        let Some(chain) = release.record.python_requires_chain() else {
            return true;
        };
        match Requirement::parse(&format!("python{chain}")) {
            Ok(req) => req.admits(self.target.python.version()),
            Err(e) => {
                tracing::warn!("ignoring sdist {name} {}: {e}", release.version);
                false
            }
        }
    }

    /// Releases of `name` with metadata for the target runtime.
    fn releases(&self, name: &str) -> PynixResult<Vec<SdistRelease>> {
        Ok(sdist_releases(self.store.as_ref(), name, &self.target.python.digits())?
            .into_iter()
            .filter(|r| self.python_requires_ok(name, r))
            .collect())
    }

    /// Requirements contributed by `extras_require`.
    ///
    /// The `""` key always applies, other keys only when their extra is
    /// selected. A `name:marker` key applies only when its marker holds.
    fn extras_requirements(
        &self,
        release: &SdistRelease,
        extras: &BTreeSet<String>,
        origin: &str,
    ) -> Vec<Requirement> {
        let selected: BTreeSet<String> = extras.iter().map(|e| normalize_name(e)).collect();
        let mut requirements = Vec::new();
        for (key, lines) in release.record.extras() {
            let (extra, marker) = match key.split_once(':') {
                Some((extra, marker)) => (extra.trim(), Some(marker.trim())),
                None => (key.trim(), None),
            };
            if let Some(marker) = marker {
                match Marker::parse(marker) {
                    Ok(m) if m.evaluate(&self.context) => {}
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("skipping extra `{key}` of {origin}: {e}");
                        continue;
                    }
                }
            }
            if extra.is_empty() || selected.contains(&normalize_name(extra)) {
                let parsed = parse_metadata_lines(lines.lines(), origin);
                requirements.extend(filter_applicable(&parsed, &self.context, &BTreeSet::new()));
            }
        }
        requirements
    }
}

impl DependencyProvider for SdistProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sdist
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
        let mut candidates: Vec<Candidate> = self
            .releases(name)?
            .into_iter()
            .map(|release| Candidate {
                name: name.to_string(),
                version: Version::parse(&release.version),
                raw_version: release.version.clone(),
                extras: extras.clone(),
                build: None,
                provider: ProviderKind::Sdist,
                payload: CandidatePayload::Sdist(Arc::new(release)),
            })
            .collect();
        sort_by_preference(&mut candidates);
        Ok(candidates)
    }

    fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies> {
        let CandidatePayload::Sdist(release) = &candidate.payload else {
            return Err(not_found(&self.kind(), candidate));
        };
        let origin = candidate.to_string();
        let no_extras = BTreeSet::new();

        let install = parse_metadata_lines(release.record.install_lines(), &origin);
        let mut propagated = filter_applicable(&install, &self.context, &no_extras);
        propagated.extend(self.extras_requirements(release, &candidate.extras, &origin));

        let setup = parse_metadata_lines(release.record.setup_lines(), &origin);
        Ok(Dependencies {
            propagated,
            build_time: filter_applicable(&setup, &self.context, &no_extras),
        })
    }

    fn provider_info(&self, _candidate: &Candidate) -> ProviderInfo {
        ProviderInfo::new(self.kind().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pynix_store::MemoryStore;
    use serde_json::json;

    fn provider() -> SdistProvider {
        let store = MemoryStore::from_value(json!({
            "pytest": {
                "6.0.0": {
                    "38": {
                        "install_requires": ["py>=1.8.2", "colorama ; sys_platform == 'win32'"],
                        "setup_requires": ["setuptools-scm"],
                        "extras_require": {
                            "testing": ["mock"],
                            ":python_version < '3.10'": ["importlib-metadata>=0.12"],
                            "checkqa:python_version < '3'": ["flake8"]
                        },
                        "python_requires": [">=3.5"]
                    }
                },
                "7.0.0": {
                    "38": {"python_requires": [">=3.9"]}
                },
                "5.0.0": {
                    "27": {}
                }
            }
        }))
        .unwrap();
        let target = Target::new("3.8.5", "linux", "x86_64").unwrap();
        SdistProvider::new(Box::new(store), &target)
    }

    fn dep_names(reqs: &[Requirement]) -> Vec<&str> {
        reqs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn python_requires_filters_releases() {
        let candidates = provider()
            .all_candidates("pytest", &BTreeSet::new(), &BTreeSet::new())
            .unwrap();
        let versions: Vec<&str> = candidates.iter().map(|c| c.raw_version.as_str()).collect();
        assert_eq!(versions, vec!["6.0.0"]);
    }

    #[test]
    fn marker_only_extras_apply_without_selection() {
        let p = provider();
        let c = &p.all_candidates("pytest", &BTreeSet::new(), &BTreeSet::new()).unwrap()[0];
        let deps = p.dependencies_of(c).unwrap();
        assert_eq!(dep_names(&deps.propagated), vec!["py", "importlib-metadata"]);
        assert_eq!(dep_names(&deps.build_time), vec!["setuptools-scm"]);
    }

    #[test]
    fn selected_extras_add_requirements() {
        let p = provider();
        let extras: BTreeSet<String> = ["testing".to_string(), "checkqa".to_string()]
            .into_iter()
            .collect();
        let c = &p.all_candidates("pytest", &extras, &BTreeSet::new()).unwrap()[0];
        let deps = p.dependencies_of(c).unwrap();
        assert_eq!(
            dep_names(&deps.propagated),
            vec!["py", "importlib-metadata", "mock"]
        );
    }
}
