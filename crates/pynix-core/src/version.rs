//! Version parsing, ordering, and specifier matching.
//!
//! Versions follow PEP 440 where possible. Anything that does not parse
//! degrades to a *legacy* version instead of failing:
//! - legacy versions sort below every PEP 440 version
//! - legacy versions compare among themselves by their dot/dash separated
//!   segments (numbers above words)
//! - trailing zero release segments are insignificant (`1.0 == 1.0.0`)
//!
//! Specifiers combine as an OR of AND-groups (`>=1,<2|==3.*`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use globset::GlobBuilder;
use lazy_static::lazy_static;
use pynix_util::errors::{PynixError, PynixResult};
use regex::Regex;

lazy_static! {
    static ref PEP440_RE: Regex = Regex::new(
        r"(?ix)^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?P<post>(?:-(?P<post_n1>[0-9]+))|(?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?))?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$"
    )
    .unwrap();
}

/// Pre-release phase, ordered `a < b < rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum LocalSegment {
    Text(String),
    Number(u64),
}

#[derive(Debug, Clone)]
struct Pep440 {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

/// Sort position of the pre-release part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum PreKey {
    DevOnly,
    Tagged(PreKind, u64),
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Pep440Key {
    epoch: u64,
    release: Vec<u64>,
    pre: PreKey,
    post: Option<u64>,
    // (is final, number): dev releases sort before the release they precede
    dev: (bool, u64),
    local: Option<Vec<LocalSegment>>,
}

impl Pep440 {
    fn parse(text: &str) -> Option<Self> {
        let caps = PEP440_RE.captures(text)?;
        let num = |name: &str| -> Option<Option<u64>> {
            match caps.name(name) {
                Some(m) => m.as_str().parse::<u64>().ok().map(Some),
                None => Some(None),
            }
        };

        let epoch = num("epoch")?.unwrap_or(0);
        let release = caps
            .name("release")?
            .as_str()
            .split('.')
            .map(|s| s.parse::<u64>().ok())
            .collect::<Option<Vec<u64>>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let kind = match label.as_str().to_lowercase().as_str() {
                    "a" | "alpha" => PreKind::Alpha,
                    "b" | "beta" => PreKind::Beta,
                    _ => PreKind::Rc,
                };
                Some((kind, num("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };

        let post = if caps.name("post").is_some() {
            Some(num("post_n1")?.or(num("post_n2")?).unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            Some(num("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        let local = caps
            .name("local")
            .map(|m| {
                m.as_str()
                    .split(['-', '_', '.'])
                    .map(|s| match s.parse::<u64>() {
                        Ok(n) => LocalSegment::Number(n),
                        Err(_) => LocalSegment::Text(s.to_lowercase()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    fn trimmed_release(&self) -> Vec<u64> {
        let mut release = self.release.clone();
        while release.len() > 1 && release.last() == Some(&0) {
            release.pop();
        }
        release
    }

    fn key(&self) -> Pep440Key {
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((kind, n)), _, _) => PreKey::Tagged(kind, n),
            (None, _, _) => PreKey::Final,
        };
        Pep440Key {
            epoch: self.epoch,
            release: self.trimmed_release(),
            pre,
            post: self.post,
            dev: match self.dev {
                Some(n) => (false, n),
                None => (true, 0),
            },
            local: if self.local.is_empty() {
                None
            } else {
                Some(self.local.clone())
            },
        }
    }

    fn public(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum LegacySegment {
    Word(String),
    Number(u64),
}

fn legacy_segments(text: &str) -> Vec<LegacySegment> {
    let mut segments: Vec<LegacySegment> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u64>() {
            Ok(n) => LegacySegment::Number(n),
            Err(_) => LegacySegment::Word(s.to_lowercase()),
        })
        .collect();
    while segments.len() > 1 && segments.last() == Some(&LegacySegment::Number(0)) {
        segments.pop();
    }
    segments
}

#[derive(Debug, Clone)]
enum Kind {
    Pep440(Pep440),
    Legacy(Vec<LegacySegment>),
}

/// A package version: PEP 440 when it parses, legacy otherwise.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    kind: Kind,
}

impl Version {
    /// Parse version text. Never fails; unparsable text becomes a legacy version.
    pub fn parse(text: &str) -> Self {
        let raw = text.trim().to_string();
        let kind = match Pep440::parse(&raw) {
            Some(v) => Kind::Pep440(v),
            None => Kind::Legacy(legacy_segments(&raw)),
        };
        Self { raw, kind }
    }

    /// The text this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self.kind, Kind::Legacy(_))
    }

    /// Release segments (`[1, 2, 3]` for `1.2.3`). Empty for legacy versions.
    pub fn release(&self) -> &[u64] {
        match &self.kind {
            Kind::Pep440(v) => &v.release,
            Kind::Legacy(_) => &[],
        }
    }

    pub fn epoch(&self) -> u64 {
        match &self.kind {
            Kind::Pep440(v) => v.epoch,
            Kind::Legacy(_) => 0,
        }
    }

    pub fn is_devrelease(&self) -> bool {
        match &self.kind {
            Kind::Pep440(v) => v.dev.is_some(),
            Kind::Legacy(_) => self.raw.to_lowercase().contains("dev"),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        match &self.kind {
            Kind::Pep440(v) => v.pre.is_some() || v.dev.is_some(),
            Kind::Legacy(_) => self.raw.to_lowercase().contains("rc"),
        }
    }

    pub fn is_postrelease(&self) -> bool {
        match &self.kind {
            Kind::Pep440(v) => v.post.is_some(),
            Kind::Legacy(_) => false,
        }
    }

    /// Epoch and release only, e.g. `1!2.0` for `1!2.0rc1.post3+local`.
    pub fn base_version(&self) -> String {
        match &self.kind {
            Kind::Pep440(v) => {
                let release = join_release(&v.release);
                if v.epoch > 0 {
                    format!("{}!{release}", v.epoch)
                } else {
                    release
                }
            }
            Kind::Legacy(_) => self.raw.clone(),
        }
    }

    fn public(&self) -> Self {
        match &self.kind {
            Kind::Pep440(v) if !v.local.is_empty() => Self {
                raw: self.raw.split('+').next().unwrap_or(&self.raw).to_string(),
                kind: Kind::Pep440(v.public()),
            },
            _ => self.clone(),
        }
    }

    fn has_local(&self) -> bool {
        matches!(&self.kind, Kind::Pep440(v) if !v.local.is_empty())
    }

    fn same_base(&self, other: &Version) -> bool {
        match (&self.kind, &other.kind) {
            (Kind::Pep440(a), Kind::Pep440(b)) => {
                a.epoch == b.epoch && a.trimmed_release() == b.trimmed_release()
            }
            _ => false,
        }
    }
}

fn join_release(release: &[u64]) -> String {
    release
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.kind, &other.kind) {
            (Kind::Pep440(a), Kind::Pep440(b)) => a.key().cmp(&b.key()),
            (Kind::Legacy(a), Kind::Legacy(b)) => a.cmp(b),
            (Kind::Legacy(_), Kind::Pep440(_)) => Ordering::Less,
            (Kind::Pep440(_), Kind::Legacy(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.kind {
            Kind::Pep440(v) => {
                0u8.hash(state);
                v.key().hash(state);
            }
            Kind::Legacy(segments) => {
                1u8.hash(state);
                segments.hash(state);
            }
        }
    }
}

/// Sort key that ranks stable releases above development and release
/// candidate versions, then by version.
///
/// Sorting candidates by this key descending yields the preferred order.
pub fn preference_key(version: &Version) -> (bool, bool, Version) {
    (
        !version.is_devrelease(),
        !version.is_prerelease(),
        version.clone(),
    )
}

/// Comparison operator of a version specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Compatible,
    Arbitrary,
}

impl Operator {
    /// Split a leading operator off `text`. A single `=` means `==`.
    pub fn split_prefix(text: &str) -> Option<(Operator, &str)> {
        const TABLE: [(&str, Operator); 9] = [
            ("===", Operator::Arbitrary),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("~=", Operator::Compatible),
            ("<", Operator::Less),
            (">", Operator::Greater),
            ("=", Operator::Equal),
        ];
        TABLE
            .iter()
            .find(|(token, _)| text.starts_with(token))
            .map(|(token, op)| (*op, &text[token.len()..]))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Compatible => "~=",
            Operator::Arbitrary => "===",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(operator, version)` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    pub op: Operator,
    pub version: String,
}

impl Specifier {
    pub fn new(op: Operator, version: impl Into<String>) -> Self {
        Self {
            op,
            version: version.into(),
        }
    }

    /// Parse `>=1.0`, `==2.*`, `!=3` and friends.
    pub fn parse(text: &str) -> PynixResult<Self> {
        let text = text.trim();
        let (op, rest) = Operator::split_prefix(text).ok_or_else(|| PynixError::Parse {
            input: text.to_string(),
            reason: "specifier has no operator".to_string(),
        })?;
        let version = rest.trim();
        if version.is_empty() && op != Operator::Equal {
            return Err(PynixError::Parse {
                input: text.to_string(),
                reason: "specifier has no version".to_string(),
            });
        }
        Ok(Self::new(op, version))
    }

    /// Whether `candidate` satisfies this specifier.
    pub fn matches(&self, candidate: &Version) -> bool {
        let rhs = self.version.as_str();
        match self.op {
            Operator::Equal => matches_equal(candidate, rhs),
            Operator::NotEqual => !matches_equal(candidate, rhs),
            Operator::Arbitrary => candidate.as_str().eq_ignore_ascii_case(rhs),
            Operator::Compatible => {
                let bound = Version::parse(rhs);
                let release = bound.release();
                if release.len() < 2 {
                    return false;
                }
                candidate.public() >= bound
                    && prefix_matches(candidate, bound.epoch(), &release[..release.len() - 1])
            }
            Operator::LessEqual => candidate.public() <= ordered_bound(rhs),
            Operator::GreaterEqual => candidate.public() >= ordered_bound(rhs),
            Operator::Less => {
                let bound = ordered_bound(rhs);
                candidate.public() < bound
                    && !(candidate.is_prerelease()
                        && !bound.is_prerelease()
                        && candidate.same_base(&bound))
            }
            Operator::Greater => {
                let bound = ordered_bound(rhs);
                candidate.public() > bound
                    && !(candidate.is_postrelease()
                        && !bound.is_postrelease()
                        && candidate.same_base(&bound))
                    && !(candidate.has_local() && candidate.public() == bound)
            }
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

fn ordered_bound(rhs: &str) -> Version {
    let trimmed = rhs.trim_end_matches(".*").trim_end_matches('*');
    Version::parse(trimmed)
}

fn matches_equal(candidate: &Version, rhs: &str) -> bool {
    if rhs.is_empty() || rhs == "*" {
        return true;
    }
    if let Some(prefix) = rhs.strip_suffix(".*") {
        if !prefix.contains('*') {
            let prefix_version = Version::parse(prefix);
            if !prefix_version.is_legacy() && !candidate.is_legacy() {
                return prefix_matches(
                    candidate,
                    prefix_version.epoch(),
                    prefix_version.release(),
                );
            }
        }
    }
    if rhs.contains('*') {
        return glob_matches(rhs, candidate.as_str());
    }
    let bound = Version::parse(rhs);
    if bound.has_local() {
        *candidate == bound
    } else {
        candidate.public() == bound
    }
}

/// Release-prefix match used by `==X.*` and `~=`; missing candidate
/// segments count as zero.
fn prefix_matches(candidate: &Version, epoch: u64, prefix: &[u64]) -> bool {
    if candidate.epoch() != epoch {
        return false;
    }
    let release = candidate.release();
    prefix
        .iter()
        .enumerate()
        .all(|(i, want)| release.get(i).copied().unwrap_or(0) == *want)
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    match GlobBuilder::new(pattern).literal_separator(false).build() {
        Ok(glob) => glob.compile_matcher().is_match(text),
        Err(_) => pattern == text,
    }
}

/// Whether `version` passes `specs`: OR across groups, AND within a group.
/// An empty list admits every version.
pub fn matches_specs(version: &Version, specs: &[Vec<Specifier>]) -> bool {
    specs.is_empty()
        || specs
            .iter()
            .any(|group| group.iter().all(|spec| spec.matches(version)))
}

/// Keep the versions that pass `specs`, preserving input order.
pub fn filter_versions<'a>(
    versions: impl IntoIterator<Item = &'a Version>,
    specs: &[Vec<Specifier>],
) -> Vec<&'a Version> {
    versions
        .into_iter()
        .filter(|v| matches_specs(v, specs))
        .collect()
}

/// The target interpreter version (`3.9.5`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonVersion {
    version: Version,
    pub major: u64,
    pub minor: u64,
    pub patch: Option<u64>,
}

impl PythonVersion {
    /// Parse a runtime version; at least `major.minor` is required.
    pub fn parse(text: &str) -> PynixResult<Self> {
        let version = Version::parse(text);
        let release = version.release();
        if version.is_legacy() || release.len() < 2 {
            return Err(PynixError::Config {
                message: format!("invalid python version `{text}`, expected e.g. 3.9.5"),
            });
        }
        Ok(Self {
            major: release[0],
            minor: release[1],
            patch: release.get(2).copied(),
            version,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// `3.9`
    pub fn python_version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// `3.9.5`
    pub fn python_full_version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch.unwrap_or(0))
    }

    /// Key of the runtime bucket in the source metadata layout: major then
    /// minor, untruncated (`39`, `310`).
    pub fn digits(&self) -> String {
        format!("{}{}", self.major, self.minor)
    }

    /// Interpreter attribute name in nixpkgs (`python39`).
    pub fn nix(&self) -> String {
        format!("python{}{}", self.major, self.minor)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.version, f)
    }
}
