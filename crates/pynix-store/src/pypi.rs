//! Typed views over the PyPI dependency database.
//!
//! Wheel layout: `name -> python tag -> version -> filename -> deps`, where a
//! deps value may instead be a `"version@filename"` reference into the same
//! python tag. Sdist layout: `name -> version -> digits -> record`, where a
//! version value may be a reference to another version and a digits value a
//! reference to another digits key.

use std::collections::BTreeMap;
use std::sync::Arc;

use pynix_util::errors::{PynixError, PynixResult};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::store::MetadataStore;

/// Requirement lines stored either as a list or as one newline separated
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RequirementLines {
    Text(String),
    List(Vec<String>),
}

impl Default for RequirementLines {
    fn default() -> Self {
        RequirementLines::List(Vec::new())
    }
}

impl RequirementLines {
    pub fn lines(&self) -> Vec<&str> {
        match self {
            RequirementLines::Text(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect(),
            RequirementLines::List(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

/// Metadata of one wheel file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WheelDeps {
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
    #[serde(default)]
    pub requires_extras: Option<Vec<String>>,
    #[serde(default)]
    pub requires_python: Option<String>,
}

/// One wheel file of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelRelease {
    pub version: String,
    pub python_tag: String,
    pub filename: String,
    pub deps: Arc<WheelDeps>,
}

/// Metadata of one sdist release for one runtime version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SdistRecord {
    #[serde(default)]
    pub install_requires: Option<RequirementLines>,
    #[serde(default)]
    pub setup_requires: Option<RequirementLines>,
    /// Extra name (optionally `name:marker`) to requirement lines.
    #[serde(default)]
    pub extras_require: Option<BTreeMap<String, RequirementLines>>,
    #[serde(default)]
    pub python_requires: Option<Vec<String>>,
}

impl SdistRecord {
    pub fn install_lines(&self) -> Vec<&str> {
        self.install_requires.as_ref().map(RequirementLines::lines).unwrap_or_default()
    }

    pub fn setup_lines(&self) -> Vec<&str> {
        self.setup_requires.as_ref().map(RequirementLines::lines).unwrap_or_default()
    }

    /// `extras_require` entries; absent means none.
    pub fn extras(&self) -> impl Iterator<Item = (&String, &RequirementLines)> {
        self.extras_require.iter().flatten()
    }

    /// `python_requires` as one specifier chain, if any.
    pub fn python_requires_chain(&self) -> Option<String> {
        self.python_requires
            .as_ref()
            .filter(|specs| !specs.is_empty())
            .map(|specs| specs.join(","))
    }
}

/// One sdist release usable with the target runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdistRelease {
    pub version: String,
    pub record: Arc<SdistRecord>,
}

fn as_object<'a>(value: &'a Value, what: &str) -> PynixResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| PynixError::Store {
        message: format!("{what} is not a JSON object"),
    })
}

/// All wheel files stored for `name`, in store order.
///
/// Dangling references and undecodable records are skipped with a warning.
pub fn wheel_releases(store: &dyn MetadataStore, name: &str) -> PynixResult<Vec<WheelRelease>> {
    let Some(data) = store.get(name)? else {
        return Ok(Vec::new());
    };
    let tags = as_object(&data, &format!("wheel entry of {name}"))?;

    let mut releases = Vec::new();
    for (python_tag, versions) in tags {
        let Some(versions) = versions.as_object() else {
            tracing::warn!("wheel data of {name} for {python_tag} is malformed, skipping");
            continue;
        };
        for (version, files) in versions {
            let Some(files) = files.as_object() else {
                continue;
            };
            for (filename, deps) in files {
                let deps = match deps {
                    Value::String(reference) => {
                        match resolve_wheel_ref(versions, reference) {
                            Some(target) => target,
                            None => {
                                tracing::warn!(
                                    "dangling wheel reference `{reference}` in {name} {version}"
                                );
                                continue;
                            }
                        }
                    }
                    other => other,
                };
                match WheelDeps::deserialize(deps) {
                    Ok(deps) => releases.push(WheelRelease {
                        version: version.clone(),
                        python_tag: python_tag.clone(),
                        filename: filename.clone(),
                        deps: Arc::new(deps),
                    }),
                    Err(e) => tracing::warn!("skipping wheel {filename}: {e}"),
                }
            }
        }
    }
    Ok(releases)
}

fn resolve_wheel_ref<'a>(versions: &'a Map<String, Value>, reference: &str) -> Option<&'a Value> {
    let (version, filename) = reference.split_once('@')?;
    versions
        .get(version)?
        .get(filename)
        .filter(|target| !target.is_string())
}

/// All sdist releases of `name` that carry data for runtime `digits`.
///
/// Version and digits references are followed one level deep.
pub fn sdist_releases(
    store: &dyn MetadataStore,
    name: &str,
    digits: &str,
) -> PynixResult<Vec<SdistRelease>> {
    let Some(data) = store.get(name)? else {
        return Ok(Vec::new());
    };
    let versions = as_object(&data, &format!("sdist entry of {name}"))?;

    let mut releases = Vec::new();
    for (version, pyvers) in versions {
        let pyvers = match pyvers {
            Value::String(other) => match versions.get(other) {
                Some(target) => target,
                None => {
                    tracing::warn!("dangling version reference `{other}` in {name} {version}");
                    continue;
                }
            },
            other => other,
        };
        let Some(pyvers) = pyvers.as_object() else {
            continue;
        };
        let Some(record) = pyvers.get(digits) else {
            continue;
        };
        let record = match record {
            Value::String(other) => match pyvers.get(other) {
                Some(target) => target,
                None => {
                    tracing::warn!("dangling python reference `{other}` in {name} {version}");
                    continue;
                }
            },
            other => other,
        };
        match SdistRecord::deserialize(record) {
            Ok(record) => releases.push(SdistRelease {
                version: version.clone(),
                record: Arc::new(record),
            }),
            Err(e) => tracing::warn!("skipping sdist {name} {version}: {e}"),
        }
    }
    Ok(releases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    #[test]
    fn wheel_reference_points_into_same_tag() {
        let store = MemoryStore::from_value(json!({
            "requests": {
                "py2.py3": {
                    "2.24.0": {
                        "requests-2.24.0-py2.py3-none-any.whl": {
                            "requires_dist": ["idna<3,>=2.5"],
                            "requires_python": ">=2.7, !=3.0.*"
                        }
                    },
                    "2.25.0": {
                        "requests-2.25.0-py2.py3-none-any.whl":
                            "2.24.0@requests-2.24.0-py2.py3-none-any.whl"
                    }
                }
            }
        }))
        .unwrap();
        let releases = wheel_releases(&store, "requests").unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].deps, releases[1].deps);
        assert_eq!(releases[1].version, "2.25.0");
    }

    #[test]
    fn dangling_wheel_reference_is_skipped() {
        let store = MemoryStore::from_value(json!({
            "a": {"py3": {"1.0": {"a-1.0-py3-none-any.whl": "0.9@missing.whl"}}}
        }))
        .unwrap();
        assert!(wheel_releases(&store, "a").unwrap().is_empty());
    }

    #[test]
    fn sdist_references_are_followed() {
        let store = MemoryStore::from_value(json!({
            "six": {
                "1.15.0": {
                    "27": {"install_requires": "", "python_requires": [">=2.7"]},
                    "39": "27"
                },
                "1.16.0": "1.15.0",
                "1.0.0": {"27": {}}
            }
        }))
        .unwrap();
        let releases = sdist_releases(&store, "six", "39").unwrap();
        let versions: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.15.0", "1.16.0"]);
        assert_eq!(
            releases[0].record.python_requires_chain().as_deref(),
            Some(">=2.7")
        );
    }

    #[test]
    fn requirement_lines_accept_text_and_lists() {
        let text: RequirementLines = serde_json::from_value(json!("a\nb>=1")).unwrap();
        assert_eq!(text.lines(), vec!["a", "b>=1"]);
        let list: RequirementLines = serde_json::from_value(json!(["c"])).unwrap();
        assert_eq!(list.lines(), vec!["c"]);
    }

    #[test]
    fn unknown_package_has_no_releases() {
        let store = MemoryStore::new();
        assert!(wheel_releases(&store, "nope").unwrap().is_empty());
        assert!(sdist_releases(&store, "nope", "39").unwrap().is_empty());
    }
}
