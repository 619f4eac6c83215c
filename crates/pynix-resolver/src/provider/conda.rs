//! Builds from a conda channel.

use std::collections::BTreeSet;
use std::sync::Arc;

use pynix_core::package::ProviderInfo;
use pynix_core::requirement::parse_cached;
use pynix_core::target::Target;
use pynix_core::version::Version;
use pynix_store::conda::{CondaChannel, CondaRecord};
use pynix_util::errors::PynixResult;

use super::{
    build_matches, not_found, parse_metadata_lines, Candidate, CandidatePayload, Dependencies,
    DependencyProvider, ProviderKind,
};

/// Dependency names that never become requirements; the interpreter is
/// supplied by the environment itself.
const IGNORED_DEPENDENCIES: [&str; 1] = ["python"];

pub struct CondaProvider {
    channel: CondaChannel,
    target: Target,
}

impl CondaProvider {
    pub fn new(channel: CondaChannel, target: &Target) -> Self {
        Self {
            channel,
            target: target.clone(),
        }
    }

    /// Whether a build runs on the target interpreter: PyPy builds are
    /// rejected, and so are builds pinning another CPython version.
    fn python_ok(&self, record: &CondaRecord) -> bool {
        record.depends.iter().all(|dep| {
            if dep == "pypy" || dep.starts_with("pypy ") {
                return false;
            }
            if !dep.starts_with("python ") {
                return true;
            }
            match parse_cached(dep) {
                Ok(req) => req.admits(self.target.python.version()),
                Err(e) => {
                    tracing::warn!("ignoring conda build {}: {e}", record.filename);
                    false
                }
            }
        })
    }
}

impl DependencyProvider for CondaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Conda(self.channel.name().to_string())
    }

    fn all_candidates(
        &self,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for record in self.channel.records(name) {
            if !self.python_ok(record) || !build_matches(&record.build, builds) {
                continue;
            }
            if record.sha256.is_none() {
                tracing::warn!(
                    "ignoring conda package {}:{} from channel {}, it has no sha256 sum",
                    record.name,
                    record.version,
                    self.channel.name()
                );
                continue;
            }
            candidates.push((
                record.build_number,
                Candidate {
                    name: name.to_string(),
                    version: Version::parse(&record.version),
                    raw_version: record.version.clone(),
                    extras: extras.clone(),
                    build: Some(record.build.clone()),
                    provider: self.kind(),
                    payload: CandidatePayload::Conda(Arc::new(record.clone())),
                },
            ));
        }
        candidates.sort_by(|(a_num, a), (b_num, b)| {
            (&b.version, b_num).cmp(&(&a.version, a_num))
        });
        Ok(candidates.into_iter().map(|(_, c)| c).collect())
    }

    fn dependencies_of(&self, candidate: &Candidate) -> PynixResult<Dependencies> {
        let CandidatePayload::Conda(record) = &candidate.payload else {
            return Err(not_found(&self.kind(), candidate));
        };
        let lines = record
            .depends
            .iter()
            .chain(&record.constrains)
            .map(String::as_str)
            .filter(|dep| {
                let first = dep.split_whitespace().next().unwrap_or_default();
                !IGNORED_DEPENDENCIES.contains(&first)
            });
        Ok(Dependencies {
            propagated: parse_metadata_lines(lines, &record.filename),
            build_time: Vec::new(),
        })
    }

    fn provider_info(&self, candidate: &Candidate) -> ProviderInfo {
        let mut info = ProviderInfo::new(self.kind().to_string());
        if let CandidatePayload::Conda(record) = &candidate.payload {
            info.archive_name = Some(record.filename.clone());
            info.url = Some(self.channel.url(record));
            info.hash = record.sha256.clone();
        }
        info
    }
}
