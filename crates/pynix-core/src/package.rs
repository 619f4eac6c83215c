use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Which provider produced a package, plus what a build recipe needs to
/// fetch it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nix_attribute: Option<String>,
}

impl ProviderInfo {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }
}

/// One resolved package identity, as handed to the recipe generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub name: String,
    /// Version text as published.
    pub version: String,
    /// Needed only to build this package.
    pub build_inputs: BTreeSet<String>,
    /// Needed by consumers of this package.
    pub prop_build_inputs: BTreeSet<String>,
    pub is_root: bool,
    pub provider_info: ProviderInfo,
    pub extras_selected: BTreeSet<String>,
    pub removed_circular_deps: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl ResolvedPackage {
    pub fn parsed_version(&self) -> Version {
        Version::parse(&self.version)
    }

    /// Names of all direct dependencies, sorted and deduplicated.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.build_inputs
            .iter()
            .chain(&self.prop_build_inputs)
            .map(String::as_str)
            .collect()
    }

    /// Human readable label: `requests[socks] - 2.24.0 - wheel`.
    pub fn label(&self) -> String {
        let extras = if self.extras_selected.is_empty() {
            String::new()
        } else {
            let list: Vec<&str> = self.extras_selected.iter().map(String::as_str).collect();
            format!("[{}]", list.join(" "))
        };
        let mut label = format!(
            "{}{extras} - {} - {}",
            self.name, self.version, self.provider_info.provider
        );
        if let Some(attr) = &self.provider_info.nix_attribute {
            label.push_str(&format!(" (attr: {attr})"));
        }
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> ResolvedPackage {
        ResolvedPackage {
            name: "requests".to_string(),
            version: "2.24.0".to_string(),
            build_inputs: ["setuptools".to_string()].into_iter().collect(),
            prop_build_inputs: ["idna".to_string(), "setuptools".to_string()]
                .into_iter()
                .collect(),
            is_root: true,
            provider_info: ProviderInfo::new("sdist"),
            extras_selected: ["socks".to_string()].into_iter().collect(),
            removed_circular_deps: BTreeSet::new(),
            build: None,
        }
    }

    #[test]
    fn dependencies_are_deduplicated() {
        let binding = package();
        let deps: Vec<&str> = binding.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["idna", "setuptools"]);
    }

    #[test]
    fn label_shows_extras_and_provider() {
        assert_eq!(package().label(), "requests[socks] - 2.24.0 - sdist");
    }

    #[test]
    fn serializes_without_empty_fields() {
        let json = serde_json::to_value(package()).unwrap();
        assert_eq!(json["provider_info"]["provider"], "sdist");
        assert!(json["provider_info"].get("url").is_none());
        assert!(json.get("build").is_none());
    }
}
