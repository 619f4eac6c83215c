//! Conda channel repodata.

use std::collections::BTreeMap;
use std::path::Path;

use pynix_core::requirement::normalize_name;
use pynix_util::errors::{PynixError, PynixResult};
use serde::Deserialize;

/// Channels served from `repo.anaconda.com` rather than `anaconda.org`.
const ANACONDA_REPO_CHANNELS: [&str; 4] = ["free", "intel", "main", "r"];

#[derive(Debug, Deserialize)]
struct Repodata {
    #[serde(default)]
    packages: BTreeMap<String, RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    name: String,
    version: String,
    build: String,
    #[serde(default)]
    build_number: u64,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    constrains: Vec<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    subdir: Option<String>,
}

/// One package build of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondaRecord {
    /// Name as published.
    pub name: String,
    pub version: String,
    pub build: String,
    pub build_number: u64,
    pub depends: Vec<String>,
    pub constrains: Vec<String>,
    pub sha256: Option<String>,
    pub subdir: String,
    pub filename: String,
    /// `(name, subdir)` of later records shadowed by this one.
    pub collisions: Vec<(String, String)>,
}

/// All records of one channel, keyed by normalized name then
/// `(version, build)`.
#[derive(Debug, Clone)]
pub struct CondaChannel {
    name: String,
    packages: BTreeMap<String, BTreeMap<(String, String), CondaRecord>>,
}

impl CondaChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: BTreeMap::new(),
        }
    }

    /// Load a channel from its repodata files (usually one per subdir).
    pub fn load(name: &str, files: &[impl AsRef<Path>]) -> PynixResult<Self> {
        let mut channel = Self::new(name);
        for file in files {
            let path = file.as_ref();
            let content = std::fs::read_to_string(path).map_err(|e| PynixError::Store {
                message: format!("cannot read repodata {}: {e}", path.display()),
            })?;
            channel.add_repodata(&content)?;
        }
        Ok(channel)
    }

    /// Merge one `repodata.json` document. The first record for a given
    /// name, version and build wins.
    pub fn add_repodata(&mut self, content: &str) -> PynixResult<()> {
        let repodata: Repodata = serde_json::from_str(content)?;
        for (filename, raw) in repodata.packages {
            let subdir = raw.subdir.unwrap_or_default();
            let builds = self.packages.entry(normalize_name(&raw.name)).or_default();
            let key = (raw.version.clone(), raw.build.clone());
            if let Some(existing) = builds.get_mut(&key) {
                tracing::warn!(
                    "colliding conda package in channel `{}`: ignoring {} from {subdir} in favor of {} from {}",
                    self.name,
                    raw.name,
                    existing.name,
                    existing.subdir
                );
                existing.collisions.push((raw.name, subdir));
                continue;
            }
            builds.insert(
                key,
                CondaRecord {
                    name: raw.name,
                    version: raw.version,
                    build: raw.build,
                    build_number: raw.build_number,
                    depends: raw.depends,
                    constrains: raw.constrains,
                    sha256: raw.sha256,
                    subdir,
                    filename,
                    collisions: Vec::new(),
                },
            );
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// All builds of a normalized package name.
    pub fn records(&self, name: &str) -> impl Iterator<Item = &CondaRecord> {
        self.packages.get(name).into_iter().flat_map(|b| b.values())
    }

    /// Download location of a record's archive.
    pub fn url(&self, record: &CondaRecord) -> String {
        if ANACONDA_REPO_CHANNELS.contains(&self.name.as_str()) {
            format!(
                "https://repo.anaconda.com/pkgs/{}/{}/{}",
                self.name, record.subdir, record.filename
            )
        } else {
            format!(
                "https://anaconda.org/{}/{}/{}/download/{}/{}",
                self.name, record.name, record.version, record.subdir, record.filename
            )
        }
    }
}
