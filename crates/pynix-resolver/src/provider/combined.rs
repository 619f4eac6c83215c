//! Priority composition of all registered providers.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use pynix_core::config::ProviderSettings;
use pynix_core::package::ProviderInfo;
use pynix_core::requirement::normalize_name;
use pynix_util::errors::{PynixError, PynixResult};

use super::{not_found, Candidate, Dependencies, DependencyProvider, ProviderKind};

/// All providers plus the validated per-package preference lists.
pub struct CombinedProvider {
    providers: Vec<Rc<dyn DependencyProvider>>,
    default: Vec<ProviderKind>,
    overrides: BTreeMap<String, Vec<ProviderKind>>,
    settings: ProviderSettings,
}

impl CombinedProvider {
    /// Validate `settings` against the registered providers.
    ///
    /// Fails when a list names an unknown provider or one that was not
    /// registered (for example a conda channel without repodata).
    pub fn new(
        providers: Vec<Rc<dyn DependencyProvider>>,
        settings: ProviderSettings,
    ) -> PynixResult<Self> {
        let mut registered = BTreeSet::new();
        for provider in &providers {
            if !registered.insert(provider.kind()) {
                return Err(PynixError::Config {
                    message: format!("provider `{}` registered twice", provider.kind()),
                });
            }
        }

        let available = if registered.is_empty() {
            "none".to_string()
        } else {
            registered
                .iter()
                .map(ProviderKind::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let validate = |names: &[String]| -> PynixResult<Vec<ProviderKind>> {
            names
                .iter()
                .map(|name| {
                    let kind: ProviderKind = name.parse()?;
                    if registered.contains(&kind) {
                        Ok(kind)
                    } else {
                        Err(PynixError::Config {
                            message: format!(
                                "provider `{kind}` is configured but has no data (available: {available})"
                            ),
                        })
                    }
                })
                .collect()
        };

        let default = validate(&settings.default)?;
        let overrides = settings
            .overrides
            .iter()
            .map(|(name, list)| Ok((normalize_name(name), validate(list)?)))
            .collect::<PynixResult<BTreeMap<_, _>>>()?;

        Ok(Self {
            providers,
            default,
            overrides,
            settings,
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn provider(&self, kind: &ProviderKind) -> Option<&Rc<dyn DependencyProvider>> {
        self.providers.iter().find(|p| p.kind() == *kind)
    }

    /// Provider kinds allowed for `name`, in preference order.
    ///
    /// A registered platform provider is always allowed, last, so virtual
    /// packages resolve whatever the lists say.
    pub fn allowed_providers(&self, name: &str) -> Vec<ProviderKind> {
        let mut allowed = self
            .overrides
            .get(&normalize_name(name))
            .unwrap_or(&self.default)
            .clone();
        if !allowed.contains(&ProviderKind::Platform) && self.provider(&ProviderKind::Platform).is_some()
        {
            allowed.push(ProviderKind::Platform);
        }
        allowed
    }

    /// Candidates of every allowed provider, concatenated in preference
    /// order.
    pub fn all_candidates(
        &self,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Vec<Candidate>> {
        let allowed = self.allowed_providers(name);
        let mut candidates = Vec::new();
        for kind in &allowed {
            if let Some(provider) = self.provider(kind) {
                candidates.extend(provider.all_candidates(name, extras, builds)?);
            }
        }
        if !candidates.is_empty() {
            return Ok(candidates);
        }

        let mut alternatives = Vec::new();
        for provider in &self.providers {
            let kind = provider.kind();
            if allowed.contains(&kind) {
                continue;
            }
            match provider.all_candidates(name, extras, builds) {
                Ok(found) if !found.is_empty() => alternatives.push(kind.to_string()),
                Ok(_) => {}
                Err(e) => tracing::debug!("{kind} failed while looking for {name}: {e}"),
            }
        }
        Err(PynixError::NoCandidatesAvailable {
            name: name.to_string(),
            tried: allowed.iter().map(ProviderKind::to_string).collect(),
            alternatives,
        })
    }

    /// Dependencies of a candidate, asked from the provider that produced it.
    pub fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies> {
        match self.provider(&candidate.provider) {
            Some(provider) => provider.dependencies_of(candidate),
            None => Err(not_found(&candidate.provider, candidate)),
        }
    }

    pub fn provider_info(&self, candidate: &Candidate) -> ProviderInfo {
        match self.provider(&candidate.provider) {
            Some(provider) => provider.provider_info(candidate),
            None => ProviderInfo::new(candidate.provider.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::platform::PlatformProvider;
    use crate::provider::sdist::SdistProvider;
    use crate::provider::wheel::WheelProvider;
    use pynix_core::target::Target;
    use pynix_store::MemoryStore;
    use serde_json::json;

    fn target() -> Target {
        Target::new("3.8.5", "linux", "x86_64").unwrap()
    }

    fn providers() -> Vec<Rc<dyn DependencyProvider>> {
        let wheels = MemoryStore::from_value(json!({
            "torch": {"cp38": {"1.7.0": {"torch-1.7.0-cp38-cp38-manylinux1_x86_64.whl": {}}}}
        }))
        .unwrap();
        let sdists = MemoryStore::from_value(json!({
            "requests": {"2.24.0": {"38": {}}, "2.23.0": {"38": {}}}
        }))
        .unwrap();
        let platform: BTreeMap<String, String> =
            [("__unix".to_string(), "0".to_string())].into_iter().collect();
        let wheel: Rc<dyn DependencyProvider> =
            Rc::new(WheelProvider::new(Box::new(wheels), &target()).unwrap());
        let sdist: Rc<dyn DependencyProvider> =
            Rc::new(SdistProvider::new(Box::new(sdists), &target()));
        let platform: Rc<dyn DependencyProvider> = Rc::new(PlatformProvider::new(&platform));
        vec![wheel, sdist, platform]
    }

    fn settings(json: &str) -> ProviderSettings {
        ProviderSettings::from_json_str(json).unwrap()
    }

    #[test]
    fn unknown_or_unregistered_providers_fail_fast() {
        assert!(matches!(
            CombinedProvider::new(providers(), settings(r#""wheel,pip""#)),
            Err(PynixError::Config { .. })
        ));
        assert!(matches!(
            CombinedProvider::new(providers(), settings(r#""wheel,nixpkgs""#)),
            Err(PynixError::Config { .. })
        ));
    }

    #[test]
    fn miss_lists_tried_and_alternatives() {
        let combined = CombinedProvider::new(providers(), settings(r#""sdist""#)).unwrap();
        let err = combined
            .all_candidates("torch", &BTreeSet::new(), &BTreeSet::new())
            .unwrap_err();
        match err {
            PynixError::NoCandidatesAvailable {
                name,
                tried,
                alternatives,
            } => {
                assert_eq!(name, "torch");
                assert_eq!(tried, vec!["sdist", "platform"]);
                assert_eq!(alternatives, vec!["wheel"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn override_changes_order() {
        let combined = CombinedProvider::new(
            providers(),
            settings(r#"{"_default": "sdist,wheel", "torch": "wheel"}"#),
        )
        .unwrap();
        assert_eq!(
            combined.allowed_providers("Torch"),
            vec![ProviderKind::Wheel, ProviderKind::Platform]
        );
        let candidates = combined
            .all_candidates("requests", &BTreeSet::new(), &BTreeSet::new())
            .unwrap();
        assert!(candidates.iter().all(|c| c.provider == ProviderKind::Sdist));
        assert_eq!(candidates[0].raw_version, "2.24.0");
    }

    #[test]
    fn platform_is_implicitly_allowed() {
        let combined = CombinedProvider::new(providers(), settings(r#""wheel""#)).unwrap();
        let candidates = combined
            .all_candidates("--unix", &BTreeSet::new(), &BTreeSet::new())
            .unwrap();
        assert_eq!(candidates[0].provider, ProviderKind::Platform);
    }
}
