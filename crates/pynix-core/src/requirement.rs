//! Requirement lines: PEP 508 style (`requests[socks] >=2.0 ; python_version < "3"`)
//! and conda match specs (`hdf5 >=1.10.5,<1.10.6.0a0 mpi_mpich_*`).
//!
//! Parsing never guesses: anything outside the grammar is a
//! [`PynixError::Parse`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use lazy_static::lazy_static;
use pynix_util::errors::{PynixError, PynixResult};
use regex::Regex;

use crate::marker::Marker;
use crate::version::{Operator, Specifier, Version};

lazy_static! {
    static ref HEAD_RE: Regex =
        Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9._-]*)\s*(?:\[([^\]]*)\])?\s*(.*)$").unwrap();
    static ref OP_GAP_RE: Regex = Regex::new(r"(===|==|!=|<=|>=|~=|<|>|=)\s+").unwrap();
    static ref JOINER_RE: Regex = Regex::new(r"\s*([,|])\s*").unwrap();
    static ref VERSION_TOKEN_RE: Regex = Regex::new(r"^[A-Za-z0-9._*+!-]+$").unwrap();
    static ref BUILD_RE: Regex = Regex::new(r"^[A-Za-z0-9_.*+-]+$").unwrap();
    static ref EXTRA_RE: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();
    static ref PARSE_CACHE: Mutex<HashMap<String, Requirement>> = Mutex::new(HashMap::new());
}

/// Legacy setuptools token meaning "any version".
const ACCEPT_ANYTHING: &str = "(>dev)";

/// Normalize a package or extra name: lowercase, `_` becomes `-`.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// A parsed requirement.
///
/// Equality and hashing consider `name`, `specs` and `build` only.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: String,
    pub extras: BTreeSet<String>,
    /// Alternative AND-groups; empty means any version.
    pub specs: Vec<Vec<Specifier>>,
    pub build: Option<String>,
    pub marker: Option<Marker>,
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.specs == other.specs && self.build == other.build
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.specs.hash(state);
        self.build.hash(state);
    }
}

fn parse_error(input: &str, reason: impl Into<String>) -> PynixError {
    PynixError::Parse {
        input: input.to_string(),
        reason: reason.into(),
    }
}

impl Requirement {
    /// Parse a single logical requirement line.
    pub fn parse(line: &str) -> PynixResult<Self> {
        let input = line.trim();
        if input.is_empty() {
            return Err(parse_error(line, "empty requirement"));
        }

        let (head, marker_text) = match input.find(';').or_else(|| input.find(':')) {
            Some(pos) => (input[..pos].trim(), Some(input[pos + 1..].trim())),
            None => (input, None),
        };

        let caps = HEAD_RE
            .captures(head)
            .ok_or_else(|| parse_error(input, "expected a package name"))?;
        let name = normalize_name(&caps[1]);

        let mut extras = BTreeSet::new();
        if let Some(list) = caps.get(2) {
            for extra in list.as_str().split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if !EXTRA_RE.is_match(extra) {
                    return Err(parse_error(input, format!("invalid extra `{extra}`")));
                }
                extras.insert(extra.to_string());
            }
        }

        let (specs, build) = parse_version_part(input, caps[3].trim())?;

        let marker = match marker_text {
            Some(text) => {
                let marker = Marker::parse(text)?;
                if let Some(extra) = marker.sole_extra() {
                    extras.insert(extra.to_string());
                }
                Some(marker)
            }
            None => None,
        };

        Ok(Self {
            name,
            extras,
            specs,
            build,
            marker,
        })
    }

    /// Whether `version` passes this requirement's specifiers.
    pub fn admits(&self, version: &Version) -> bool {
        crate::version::matches_specs(version, &self.specs)
    }
}

/// Parse everything after the name: specifier chains and an optional build tag.
fn parse_version_part(
    input: &str,
    text: &str,
) -> PynixResult<(Vec<Vec<Specifier>>, Option<String>)> {
    if text.is_empty() || text == ACCEPT_ANYTHING {
        return Ok((Vec::new(), None));
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return Ok((parse_chain(input, inner.trim())?, None));
    }

    let compact = OP_GAP_RE.replace_all(text, "$1");
    let compact = JOINER_RE.replace_all(&compact, "$1");
    let tokens: Vec<&str> = compact.split_whitespace().collect();
    match tokens.as_slice() {
        [chain] => Ok((parse_chain(input, chain)?, None)),
        [chain, build] => {
            if !BUILD_RE.is_match(build) {
                return Err(parse_error(input, format!("invalid build tag `{build}`")));
            }
            Ok((parse_chain(input, chain)?, Some(build.to_string())))
        }
        _ => Err(parse_error(input, "unexpected tokens after version")),
    }
}

/// `>=1,<2|==3.*` into OR-groups of AND-ed specifiers.
fn parse_chain(input: &str, chain: &str) -> PynixResult<Vec<Vec<Specifier>>> {
    let compact = OP_GAP_RE.replace_all(chain, "$1");
    let compact = JOINER_RE.replace_all(&compact, "$1");
    let mut groups = Vec::new();
    for alternative in compact.split('|') {
        let mut group = Vec::new();
        for item in alternative.split(',') {
            let item = item.trim();
            if item.is_empty() {
                return Err(parse_error(input, "empty specifier"));
            }
            group.extend(parse_specifier(input, item)?);
        }
        groups.push(group);
    }
    Ok(groups)
}

fn parse_specifier(input: &str, item: &str) -> PynixResult<Vec<Specifier>> {
    let (op, version) = match Operator::split_prefix(item) {
        Some((op, version)) => (op, version.trim()),
        None => {
            if !item.starts_with(|c: char| c.is_ascii_digit() || c == '*') {
                return Err(parse_error(input, format!("`{item}` is not a version")));
            }
            (Operator::Equal, item)
        }
    };
    if !VERSION_TOKEN_RE.is_match(version) {
        return Err(parse_error(input, format!("invalid version `{version}`")));
    }
    if op != Operator::Compatible {
        return Ok(vec![Specifier::new(op, version)]);
    }

    // ~=V is >=V plus a prefix match on V without its last release segment
    let parsed = Version::parse(version);
    let release = parsed.release();
    if parsed.is_legacy() || release.len() < 2 {
        return Err(parse_error(
            input,
            format!("`~={version}` needs at least two release segments"),
        ));
    }
    let mut prefix: Vec<String> = release[..release.len() - 1]
        .iter()
        .map(u64::to_string)
        .collect();
    prefix.push("*".to_string());
    let mut pattern = prefix.join(".");
    if parsed.epoch() > 0 {
        pattern = format!("{}!{pattern}", parsed.epoch());
    }
    Ok(vec![
        Specifier::new(Operator::GreaterEqual, version),
        Specifier::new(Operator::Equal, pattern),
    ])
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.specs.is_empty() {
            let groups: Vec<String> = self
                .specs
                .iter()
                .map(|group| {
                    group
                        .iter()
                        .map(Specifier::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect();
            write!(f, " {}", groups.join("|"))?;
        } else if self.build.is_some() {
            f.write_str(" ==*")?;
        }
        if let Some(build) = &self.build {
            write!(f, " {build}")?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

/// Parse through a process-wide cache. Parsing is pure, so the cache is
/// never invalidated.
pub fn parse_cached(line: &str) -> PynixResult<Requirement> {
    if let Ok(cache) = PARSE_CACHE.lock() {
        if let Some(hit) = cache.get(line) {
            return Ok(hit.clone());
        }
    }
    let requirement = Requirement::parse(line)?;
    if let Ok(mut cache) = PARSE_CACHE.lock() {
        cache.insert(line.to_string(), requirement.clone());
    }
    Ok(requirement)
}

/// Parse a requirements text: one requirement per line, `\` continuations
/// joined, `#` comments and blank lines skipped.
pub fn parse_requirements(text: &str) -> PynixResult<Vec<Requirement>> {
    let mut logical = Vec::new();
    let mut pending = String::new();
    for raw in text.lines() {
        if let Some(continued) = raw.strip_suffix('\\') {
            pending.push_str(continued);
            pending.push(' ');
            continue;
        }
        pending.push_str(raw);
        logical.push(std::mem::take(&mut pending));
    }
    if !pending.is_empty() {
        logical.push(pending);
    }

    let mut requirements = Vec::new();
    for line in logical {
        let line = strip_comment(&line).trim();
        if line.is_empty() {
            continue;
        }
        requirements.push(parse_cached(line)?);
    }
    Ok(requirements)
}

fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #") {
        Some(pos) => &line[..pos],
        None => line,
    }
}
