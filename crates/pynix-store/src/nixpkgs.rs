//! Index of the python packages available as nixpkgs attributes.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use pynix_core::requirement::normalize_name;
use pynix_core::version::Version;
use pynix_util::errors::{PynixError, PynixResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct NixEntry {
    pname: String,
    version: String,
    #[serde(default)]
    requirements: Option<Vec<String>>,
}

/// One nixpkgs attribute carrying a python package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixpkgsPackage {
    pub name: String,
    pub nix_key: String,
    pub version: Version,
}

/// `pname -> version -> [attribute]`, plus the requirement lists some
/// attributes declare themselves.
#[derive(Debug, Clone, Default)]
pub struct NixpkgsIndex {
    packages: BTreeMap<String, BTreeMap<Version, Vec<String>>>,
    requirements: HashMap<String, Vec<String>>,
}

impl NixpkgsIndex {
    pub fn load(path: &Path) -> PynixResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PynixError::Store {
            message: format!("cannot read nixpkgs index {}: {e}", path.display()),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse `{attribute: {pname, version, requirements?} | null}`.
    pub fn from_json_str(content: &str) -> PynixResult<Self> {
        let raw: BTreeMap<String, Option<NixEntry>> = serde_json::from_str(content)?;
        let mut index = Self::default();
        for (nix_key, entry) in raw {
            let Some(entry) = entry else {
                continue;
            };
            index
                .packages
                .entry(normalize_name(&entry.pname))
                .or_default()
                .entry(Version::parse(&entry.version))
                .or_default()
                .push(nix_key.clone());
            if let Some(requirements) = entry.requirements {
                index.requirements.insert(nix_key, requirements);
            }
        }
        Ok(index)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Whether `version` of `name` is packaged.
    pub fn exists_version(&self, name: &str, version: &Version) -> bool {
        self.packages
            .get(name)
            .is_some_and(|versions| versions.contains_key(version))
    }

    pub fn has_multiple_candidates(&self, name: &str) -> bool {
        self.packages
            .get(name)
            .is_some_and(|versions| versions.values().map(Vec::len).sum::<usize>() > 1)
    }

    /// Every attribute for `name`, sorted by version ascending.
    pub fn all_candidates_for(&self, name: &str) -> Vec<NixpkgsPackage> {
        let Some(versions) = self.packages.get(name) else {
            return Vec::new();
        };
        versions
            .iter()
            .flat_map(|(version, keys)| {
                keys.iter().map(move |key| NixpkgsPackage {
                    name: name.to_string(),
                    nix_key: key.clone(),
                    version: version.clone(),
                })
            })
            .collect()
    }

    /// Pick the attribute that best matches `version` of `name`.
    ///
    /// Attributes are narrowed by comparing ever longer release prefixes
    /// (padded with zeros). If a single attribute survives it wins; when
    /// a longer prefix matches nothing, the previous survivors are kept.
    /// Among several survivors the highest version wins, then the attribute
    /// whose name length is closest to the package name.
    pub fn resolve_best_key(&self, name: &str, version: &Version) -> Option<String> {
        let packages = self.all_candidates_for(name);
        match packages.len() {
            0 => return None,
            1 => return Some(packages[0].nix_key.clone()),
            _ => {}
        }

        let mut remaining = packages;
        for prefix_len in 1..version.release().len() {
            let same: Vec<NixpkgsPackage> = remaining
                .iter()
                .filter(|p| same_prefix(version, &p.version, prefix_len))
                .cloned()
                .collect();
            match same.len() {
                1 => return Some(same[0].nix_key.clone()),
                0 => break,
                _ => remaining = same,
            }
        }

        let distance = |p: &NixpkgsPackage| p.name.len().abs_diff(p.nix_key.len());
        let best = remaining
            .iter()
            .max_by(|a, b| {
                a.version
                    .cmp(&b.version)
                    .then_with(|| distance(b).cmp(&distance(a)))
            })?
            .nix_key
            .clone();
        let keys: Vec<&str> = remaining.iter().map(|p| p.nix_key.as_str()).collect();
        tracing::warn!(
            "multiple nixpkgs attributes found for {name}-{version}: {keys:?}, picking `{best}`"
        );
        Some(best)
    }

    /// Requirements declared by the attribute chosen for `version`, if it
    /// declares any.
    pub fn requirements(&self, name: &str, version: &Version) -> Option<&[String]> {
        let key = self.resolve_best_key(name, version)?;
        self.requirements.get(&key).map(Vec::as_slice)
    }
}

fn same_prefix(a: &Version, b: &Version, len: usize) -> bool {
    let prefix = |v: &Version| -> Vec<u64> {
        (0..len)
            .map(|i| v.release().get(i).copied().unwrap_or(0))
            .collect()
    };
    prefix(a) == prefix(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> NixpkgsIndex {
        NixpkgsIndex::from_json_str(
            r#"{
                "django": {"pname": "Django", "version": "3.1.4"},
                "django_2_2": {"pname": "Django", "version": "2.2.17"},
                "django_2_1": {"pname": "Django", "version": "2.1.15", "requirements": ["pytz"]},
                "requests": {"pname": "requests", "version": "2.24.0", "requirements": null},
                "broken": null
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn null_entries_are_skipped() {
        let index = index();
        assert!(!index.exists("broken"));
        assert!(index.exists("django"));
        assert!(index.has_multiple_candidates("django"));
        assert!(!index.has_multiple_candidates("requests"));
    }

    #[test]
    fn candidates_sorted_by_version() {
        let versions: Vec<String> = index()
            .all_candidates_for("django")
            .into_iter()
            .map(|p| p.version.to_string())
            .collect();
        assert_eq!(versions, vec!["2.1.15", "2.2.17", "3.1.4"]);
    }

    #[test]
    fn prefix_narrowing_picks_matching_minor() {
        let index = index();
        assert_eq!(
            index.resolve_best_key("django", &Version::parse("2.2.3")),
            Some("django_2_2".to_string())
        );
        assert_eq!(
            index.resolve_best_key("django", &Version::parse("3.0")),
            Some("django".to_string())
        );
    }

    #[test]
    fn no_prefix_match_takes_highest() {
        let index = index();
        assert_eq!(
            index.resolve_best_key("django", &Version::parse("4.0.1")),
            Some("django".to_string())
        );
    }

    #[test]
    fn requirements_follow_best_key() {
        let index = index();
        assert_eq!(
            index.requirements("django", &Version::parse("2.1.15")),
            Some(&["pytz".to_string()][..])
        );
        assert_eq!(index.requirements("requests", &Version::parse("2.24.0")), None);
    }

    #[test]
    fn name_length_breaks_ties() {
        let index = NixpkgsIndex::from_json_str(
            r#"{
                "python-dateutil": {"pname": "dateutil", "version": "2.8.1"},
                "dateutil": {"pname": "dateutil", "version": "2.8.1"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            index.resolve_best_key("dateutil", &Version::parse("2.8.1")),
            Some("dateutil".to_string())
        );
    }
}
