//! Python packages already packaged as nixpkgs attributes.

use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;

use pynix_core::marker::{filter_applicable, MarkerContext};
use pynix_core::package::ProviderInfo;
use pynix_core::target::Target;
use pynix_store::nixpkgs::NixpkgsIndex;
use pynix_util::errors::PynixResult;

use super::{
    not_found, parse_metadata_lines, sort_by_preference, Candidate, CandidatePayload,
    Dependencies, DependencyProvider, ProviderKind,
};

/// Offers every packaged version of a name. Dependencies come from the
/// index itself when it declares them, otherwise from the fallback
/// providers (sdist first, then wheel) for the same release, without
/// extras.
pub struct NixpkgsProvider {
    index: Arc<NixpkgsIndex>,
    fallbacks: Vec<Rc<dyn DependencyProvider>>,
    context: MarkerContext,
}

impl NixpkgsProvider {
    pub fn new(
        index: Arc<NixpkgsIndex>,
        fallbacks: Vec<Rc<dyn DependencyProvider>>,
        target: &Target,
    ) -> Self {
        Self {
            index,
            fallbacks,
            context: target.marker_context(),
        }
    }

    pub fn index(&self) -> &NixpkgsIndex {
        &self.index
    }
}

impl DependencyProvider for NixpkgsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Nixpkgs
    }

    fn all_candidates(
        &self,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Vec<Candidate>> {
        if !builds.is_empty() || !self.index.exists(name) {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for package in self.index.all_candidates_for(name) {
            if candidates.iter().any(|c| c.version == package.version) {
                continue;
            }
            candidates.push(Candidate {
                name: name.to_string(),
                raw_version: package.version.to_string(),
                version: package.version,
                extras: extras.clone(),
                build: None,
                provider: ProviderKind::Nixpkgs,
                payload: CandidatePayload::Nixpkgs,
            });
        }
        sort_by_preference(&mut candidates);
        Ok(candidates)
    }

    fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies> {
        if !matches!(candidate.payload, CandidatePayload::Nixpkgs)
            || !self.index.exists_version(&candidate.name, &candidate.version)
        {
            return Err(not_found(&self.kind(), candidate));
        }

        if let Some(lines) = self.index.requirements(&candidate.name, &candidate.version) {
            let parsed = parse_metadata_lines(
                lines.iter().map(String::as_str),
                &format!("nixpkgs {candidate}"),
            );
            return Ok(Dependencies {
                propagated: filter_applicable(&parsed, &self.context, &candidate.extras),
                build_time: Vec::new(),
            });
        }

        for fallback in &self.fallbacks {
            let release = fallback
                .all_candidates(&candidate.name, &BTreeSet::new(), &BTreeSet::new())?
                .into_iter()
                .find(|c| c.version == candidate.version);
            if let Some(release) = release {
                tracing::debug!(
                    "taking requirements of nixpkgs {candidate} from {}",
                    fallback.kind()
                );
                return fallback.dependencies_of(&release);
            }
        }
        Ok(Dependencies::default())
    }

    fn provider_info(&self, candidate: &Candidate) -> ProviderInfo {
        let mut info = ProviderInfo::new(self.kind().to_string());
        info.nix_attribute = self.index.resolve_best_key(&candidate.name, &candidate.version);
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sdist::SdistProvider;
    use crate::provider::wheel::WheelProvider;
    use pynix_core::version::Version;
    use pynix_store::MemoryStore;
    use serde_json::json;

    fn target() -> Target {
        Target::new("3.8.5", "linux", "x86_64").unwrap()
    }

    fn provider() -> NixpkgsProvider {
        let index = NixpkgsIndex::from_json_str(
            r#"{
                "django": {"pname": "django", "version": "3.1.4", "requirements": ["asgiref", "pytz", "sqlparse"]},
                "django_2_2": {"pname": "django", "version": "2.2.17"},
                "requests": {"pname": "requests", "version": "2.24.0"},
                "requests-old": {"pname": "requests", "version": "2.24.0"},
                "six": {"pname": "six", "version": "1.15.0"}
            }"#,
        )
        .unwrap();
        let sdist = SdistProvider::new(
            Box::new(
                MemoryStore::from_value(json!({
                    "requests": {"2.24.0": {"38": {"install_requires": ["idna", "chardet"]}}}
                }))
                .unwrap(),
            ),
            &target(),
        );
        let sdist: Rc<dyn DependencyProvider> = Rc::new(sdist);
        NixpkgsProvider::new(Arc::new(index), vec![sdist], &target())
    }

    #[test]
    fn one_candidate_per_packaged_version() {
        let p = provider();
        let candidates = p.all_candidates("requests", &BTreeSet::new(), &BTreeSet::new()).unwrap();
        assert_eq!(candidates.len(), 1);
        let candidates = p.all_candidates("django", &BTreeSet::new(), &BTreeSet::new()).unwrap();
        let versions: Vec<&str> = candidates.iter().map(|c| c.raw_version.as_str()).collect();
        assert_eq!(versions, vec!["3.1.4", "2.2.17"]);
    }

    #[test]
    fn index_requirements_take_precedence() {
        let p = provider();
        let django = &p.all_candidates("django", &BTreeSet::new(), &BTreeSet::new()).unwrap()[0];
        let names: Vec<String> = p
            .dependencies_of(django)
            .unwrap()
            .propagated
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["asgiref", "pytz", "sqlparse"]);
        assert_eq!(p.provider_info(django).nix_attribute.as_deref(), Some("django"));
    }

    #[test]
    fn falls_back_to_sdist_metadata() {
        let p = provider();
        let requests = &p.all_candidates("requests", &BTreeSet::new(), &BTreeSet::new()).unwrap()[0];
        let names: Vec<String> = p
            .dependencies_of(requests)
            .unwrap()
            .propagated
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["idna", "chardet"]);
    }

    fn names(deps: Dependencies) -> Vec<String> {
        deps.propagated.into_iter().map(|r| r.name).collect()
    }

    fn sdist_then_wheel() -> NixpkgsProvider {
        let index = NixpkgsIndex::from_json_str(
            r#"{"six": {"pname": "six", "version": "1.0"}, "attrs": {"pname": "attrs", "version": "20.3.0"}}"#,
        )
        .unwrap();
        let sdist: Rc<dyn DependencyProvider> = Rc::new(SdistProvider::new(
            Box::new(
                MemoryStore::from_value(json!({
                    "six": {"1.0": {"38": {"install_requires": ["from-sdist"]}}},
                    "attrs": {"20.3.0": {"38": {
                        "install_requires": ["base"],
                        "extras_require": {"tests": ["pytest"]}
                    }}}
                }))
                .unwrap(),
            ),
            &target(),
        ));
        let wheel: Rc<dyn DependencyProvider> = Rc::new(
            WheelProvider::new(
                Box::new(
                    MemoryStore::from_value(json!({
                        "six": {"py3": {"1.0": {"six-1.0-py3-none-any.whl": {
                            "requires_dist": ["from-wheel"]
                        }}}}
                    }))
                    .unwrap(),
                ),
                &target(),
            )
            .unwrap(),
        );
        NixpkgsProvider::new(Arc::new(index), vec![sdist, wheel], &target())
    }

    #[test]
    fn sdist_metadata_wins_over_wheel() {
        let p = sdist_then_wheel();
        let six = &p.all_candidates("six", &BTreeSet::new(), &BTreeSet::new()).unwrap()[0];
        assert_eq!(names(p.dependencies_of(six).unwrap()), vec!["from-sdist"]);
    }

    #[test]
    fn fallback_ignores_requested_extras() {
        let p = sdist_then_wheel();
        let extras = BTreeSet::from(["tests".to_string()]);
        let attrs = &p.all_candidates("attrs", &extras, &BTreeSet::new()).unwrap()[0];
        assert_eq!(names(p.dependencies_of(attrs).unwrap()), vec!["base"]);
    }

    #[test]
    fn unknown_metadata_means_no_dependencies() {
        let p = provider();
        let six = &p.all_candidates("six", &BTreeSet::new(), &BTreeSet::new()).unwrap()[0];
        assert_eq!(p.dependencies_of(six).unwrap(), Dependencies::default());
    }

    #[test]
    fn foreign_version_is_rejected() {
        let p = provider();
        let mut six = p.all_candidates("six", &BTreeSet::new(), &BTreeSet::new()).unwrap()[0].clone();
        six.version = Version::parse("9.9");
        assert!(p.dependencies_of(&six).is_err());
    }
}
