use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pynix_util::errors::{PynixError, PynixResult};
use serde::Deserialize;

use crate::requirement::normalize_name;
use crate::target::Target;

/// Provider list used when nothing is configured.
pub const DEFAULT_PROVIDERS: [&str; 3] = ["wheel", "sdist", "nixpkgs"];

/// Key of the default list in the per-package form.
const DEFAULT_KEY: &str = "_default";

/// Resolution configuration loaded from `pynix.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_system")]
    pub system: String,

    #[serde(default = "default_arch")]
    pub arch: String,

    #[serde(default)]
    pub providers: ProviderSettings,

    /// Virtual platform packages (`__glibc = "2.31"`).
    #[serde(default)]
    pub platform: BTreeMap<String, String>,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub data: DataConfig,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            system: default_system(),
            arch: default_arch(),
            providers: ProviderSettings::default(),
            platform: BTreeMap::new(),
            resolver: ResolverConfig::default(),
            data: DataConfig::default(),
        }
    }
}

fn default_python() -> String {
    "3.9.5".to_string()
}

fn default_system() -> String {
    "linux".to_string()
}

fn default_arch() -> String {
    "x86_64".to_string()
}

/// Solver settings from `[resolver]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_rounds", rename = "max-rounds")]
    pub max_rounds: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_rounds() -> usize {
    1000
}

/// Metadata locations from `[data]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataConfig {
    /// Directory holding the `sdist/` and `wheel/` shard directories.
    #[serde(default, rename = "pypi-deps-db")]
    pub pypi_deps_db: Option<PathBuf>,

    #[serde(default, rename = "nixpkgs-json")]
    pub nixpkgs_json: Option<PathBuf>,

    /// Channel name to repodata files.
    #[serde(default, rename = "conda-channels")]
    pub conda_channels: BTreeMap<String, Vec<PathBuf>>,
}

impl DataConfig {
    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.pypi_deps_db.as_mut() {
            join(p);
        }
        if let Some(p) = self.nixpkgs_json.as_mut() {
            join(p);
        }
        for files in self.conda_channels.values_mut() {
            files.iter_mut().for_each(join);
        }
    }
}

impl ResolveConfig {
    /// Load from a TOML file; relative `[data]` paths are taken relative to
    /// the file's directory.
    pub fn load(path: &Path) -> PynixResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PynixError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            config.data.rebase(dir);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> PynixResult<Self> {
        toml::from_str(content).map_err(|e| PynixError::Config {
            message: e.to_string(),
        })
    }

    /// The configured target platform.
    pub fn target(&self) -> PynixResult<Target> {
        Target::new(&self.python, &self.system, &self.arch)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProviderList {
    Comma(String),
    List(Vec<String>),
}

impl RawProviderList {
    fn into_names(self) -> Vec<String> {
        let names = match self {
            RawProviderList::Comma(s) => s.split(',').map(str::to_string).collect(),
            RawProviderList::List(list) => list,
        };
        names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProviderSettings {
    Everywhere(RawProviderList),
    PerPackage(BTreeMap<String, RawProviderList>),
}

/// Ordered provider names: a default list plus per-package overrides.
///
/// Accepts a comma string (`"wheel,sdist"`), a list, or a table keyed by
/// package name with `_default` for the fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawProviderSettings")]
pub struct ProviderSettings {
    pub default: Vec<String>,
    pub overrides: BTreeMap<String, Vec<String>>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default: DEFAULT_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            overrides: BTreeMap::new(),
        }
    }
}

impl From<RawProviderSettings> for ProviderSettings {
    fn from(raw: RawProviderSettings) -> Self {
        match raw {
            RawProviderSettings::Everywhere(list) => Self {
                default: list.into_names(),
                overrides: BTreeMap::new(),
            },
            RawProviderSettings::PerPackage(mut table) => {
                let default = table
                    .remove(DEFAULT_KEY)
                    .map(RawProviderList::into_names)
                    .unwrap_or_else(|| Self::default().default);
                let overrides = table
                    .into_iter()
                    .map(|(name, list)| (normalize_name(&name), list.into_names()))
                    .collect();
                Self { default, overrides }
            }
        }
    }
}

impl ProviderSettings {
    /// Parse the JSON form (`{"_default": "wheel,sdist", "torch": "wheel"}`).
    pub fn from_json_str(content: &str) -> PynixResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Provider names allowed for a package, in preference order.
    pub fn names_for(&self, name: &str) -> &[String] {
        self.overrides
            .get(&normalize_name(name))
            .unwrap_or(&self.default)
    }

    /// Every provider name mentioned anywhere.
    pub fn all_names(&self) -> impl Iterator<Item = &String> {
        self.default.iter().chain(self.overrides.values().flatten())
    }

    /// One-line description for diagnostics.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("{DEFAULT_KEY} = {}", self.default.join(","))];
        for (name, list) in &self.overrides {
            parts.push(format!("{name} = {}", list.join(",")));
        }
        format!("active providers: {}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_string_form() {
        let settings: ProviderSettings = serde_json::from_str("\"wheel, sdist\"").unwrap();
        assert_eq!(settings.default, vec!["wheel", "sdist"]);
        assert!(settings.overrides.is_empty());
    }

    #[test]
    fn table_form_with_override() {
        let settings =
            ProviderSettings::from_json_str(r#"{"_default": ["sdist"], "Torch_Vision": "wheel,nixpkgs"}"#)
                .unwrap();
        assert_eq!(settings.names_for("requests"), ["sdist"]);
        assert_eq!(settings.names_for("torch-vision"), ["wheel", "nixpkgs"]);
    }

    #[test]
    fn table_without_default_keeps_builtin_default() {
        let settings = ProviderSettings::from_json_str(r#"{"numpy": "nixpkgs"}"#).unwrap();
        assert_eq!(settings.default, DEFAULT_PROVIDERS);
    }

    #[test]
    fn describe_lists_everything() {
        let settings = ProviderSettings::from_json_str(r#"{"_default": "wheel", "a": "sdist"}"#)
            .unwrap();
        assert_eq!(
            settings.describe(),
            "active providers: _default = wheel; a = sdist"
        );
    }
}
