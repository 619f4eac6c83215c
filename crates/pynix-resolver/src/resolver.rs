//! Backtracking resolution.
//!
//! Every package name has a criterion: the requirements collected for it,
//! who asked for them, and the candidates still admissible. Each round pins
//! the unsatisfied name with the fewest candidates. When no candidate of
//! that name can be pinned without emptying another criterion, the most
//! recent pin is dropped and marked incompatible.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use pynix_core::config::ResolverConfig;
use pynix_core::marker::{filter_applicable, MarkerContext};
use pynix_core::package::ResolvedPackage;
use pynix_core::requirement::Requirement;
use pynix_core::target::Target;
use pynix_util::errors::{PynixError, PynixResult};

use crate::cache::RunCache;
use crate::conflict::ConflictReport;
use crate::provider::combined::CombinedProvider;
use crate::provider::{build_matches, Candidate, CandidateId};

/// Limits for one resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub max_rounds: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_rounds: 1000 }
    }
}

impl From<&ResolverConfig> for ResolveOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
        }
    }
}

/// One requirement and the pinned candidate that declared it (`None` for
/// root requirements).
#[derive(Debug, Clone)]
struct Information {
    requirement: Requirement,
    parent: Option<Candidate>,
}

#[derive(Debug, Clone)]
struct Criterion {
    candidates: Vec<Candidate>,
    information: Vec<Information>,
    incompatibilities: Vec<CandidateId>,
}

impl Criterion {
    /// This criterion without `ids`; `None` when nothing would remain.
    fn excluded_of(&self, ids: &[CandidateId]) -> Option<Criterion> {
        let mut incompatibilities = self.incompatibilities.clone();
        incompatibilities.extend(ids.iter().cloned());
        let candidates: Vec<Candidate> = self
            .candidates
            .iter()
            .filter(|c| !incompatibilities.contains(&c.id()))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(Criterion {
            candidates,
            information: self.information.clone(),
            incompatibilities,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    /// Pins in the order they were made.
    mapping: Vec<(String, Candidate)>,
    criteria: BTreeMap<String, Criterion>,
}

impl State {
    fn pin(&self, name: &str) -> Option<&Candidate> {
        self.mapping
            .iter()
            .find(|(pinned, _)| pinned == name)
            .map(|(_, candidate)| candidate)
    }

    /// Pin `candidate`, moving the name to the end of the pin order.
    fn set_pin(&mut self, name: &str, candidate: Candidate) {
        self.mapping.retain(|(pinned, _)| pinned != name);
        self.mapping.push((name.to_string(), candidate));
    }
}

enum Merge {
    Merged(Criterion),
    Conflict(Criterion),
}

/// Whether a pinned candidate fulfils a requirement: version, requested
/// extras and build pattern.
fn is_satisfied_by(requirement: &Requirement, candidate: &Candidate) -> bool {
    if !requirement.admits(&candidate.version) {
        return false;
    }
    if !requirement.extras.is_subset(&candidate.extras) {
        return false;
    }
    match &requirement.build {
        None => true,
        Some(pattern) => candidate.build.as_deref().is_some_and(|build| {
            build_matches(build, &BTreeSet::from([pattern.clone()]))
        }),
    }
}

/// Candidates admissible for all collected requirements of a name, in
/// provider order.
fn find_matches(
    cache: &mut RunCache,
    provider: &CombinedProvider,
    name: &str,
    information: &[Information],
    incompatibilities: &[CandidateId],
) -> PynixResult<Vec<Candidate>> {
    let extras: BTreeSet<String> = information
        .iter()
        .flat_map(|i| i.requirement.extras.iter().cloned())
        .collect();
    let builds: BTreeSet<String> = information
        .iter()
        .filter_map(|i| i.requirement.build.clone())
        .collect();
    let all = cache.candidates(provider, name, &extras, &builds)?;
    Ok(all
        .iter()
        .filter(|c| information.iter().all(|i| i.requirement.admits(&c.version)))
        .filter(|c| !incompatibilities.contains(&c.id()))
        .cloned()
        .collect())
}

fn merge(
    cache: &mut RunCache,
    provider: &CombinedProvider,
    existing: Option<&Criterion>,
    requirement: &Requirement,
    parent: Option<&Candidate>,
) -> PynixResult<Merge> {
    let (mut information, incompatibilities) = match existing {
        Some(c) => (c.information.clone(), c.incompatibilities.clone()),
        None => (Vec::new(), Vec::new()),
    };
    information.push(Information {
        requirement: requirement.clone(),
        parent: parent.cloned(),
    });
    let candidates = find_matches(
        cache,
        provider,
        &requirement.name,
        &information,
        &incompatibilities,
    )?;
    let criterion = Criterion {
        candidates,
        information,
        incompatibilities,
    };
    if criterion.candidates.is_empty() {
        Ok(Merge::Conflict(criterion))
    } else {
        Ok(Merge::Merged(criterion))
    }
}

/// Mutable state of a single `resolve` call.
struct Session<'a> {
    provider: &'a CombinedProvider,
    cache: RunCache,
    /// Saved states below `current`.
    stack: Vec<State>,
    current: State,
}

impl<'a> Session<'a> {
    fn new(provider: &'a CombinedProvider) -> Self {
        Self {
            provider,
            cache: RunCache::new(),
            stack: Vec::new(),
            current: State::default(),
        }
    }

    fn push_state(&mut self) {
        self.stack.push(self.current.clone());
    }

    fn report(&self, causes: &[Criterion]) -> PynixError {
        let mut report = ConflictReport::new();
        for criterion in causes {
            for info in &criterion.information {
                report.add(
                    info.requirement.to_string(),
                    info.parent.as_ref().map(Candidate::to_string),
                );
            }
        }
        report.into_error(Some(self.provider.settings().describe()))
    }

    fn pin_satisfies(&self, name: &str, criterion: &Criterion) -> bool {
        let Some(pin) = self.current.pin(name) else {
            return false;
        };
        criterion
            .information
            .iter()
            .all(|i| is_satisfied_by(&i.requirement, pin))
    }

    fn solve(&mut self, roots: &[Requirement], max_rounds: usize) -> PynixResult<State> {
        for requirement in roots {
            let existing = self.current.criteria.get(&requirement.name);
            match merge(&mut self.cache, self.provider, existing, requirement, None)? {
                Merge::Merged(criterion) => {
                    self.current
                        .criteria
                        .insert(requirement.name.clone(), criterion);
                }
                Merge::Conflict(criterion) => return Err(self.report(&[criterion])),
            }
        }
        self.push_state();

        for round in 0..max_rounds {
            let next = self
                .current
                .criteria
                .iter()
                .filter(|(name, criterion)| !self.pin_satisfies(name, criterion))
                .min_by_key(|(_, criterion)| criterion.candidates.len())
                .map(|(name, criterion)| (name.clone(), criterion.candidates.len()));

            let Some((name, remaining)) = next else {
                tracing::debug!("resolution finished after {round} rounds");
                return Ok(std::mem::take(&mut self.current));
            };
            tracing::debug!(round, %name, remaining, "pinning");

            let causes = self.attempt_to_pin(&name)?;
            if causes.is_empty() {
                self.push_state();
            } else if !self.backtrack() {
                return Err(self.report(&causes));
            }
        }
        Err(PynixError::ResolutionTooDeep { rounds: max_rounds })
    }

    /// Try the candidates of `name` in order; on success the first one that
    /// keeps every criterion non-empty is pinned. Returns the criteria that
    /// ran empty otherwise.
    fn attempt_to_pin(&mut self, name: &str) -> PynixResult<Vec<Criterion>> {
        let Some(criterion) = self.current.criteria.get(name).cloned() else {
            return Ok(Vec::new());
        };
        let mut causes = Vec::new();
        for candidate in &criterion.candidates {
            match self.criteria_to_update(candidate)? {
                Err(conflict) => {
                    tracing::debug!("{candidate} conflicts on {}", conflict_name(&conflict));
                    causes.push(conflict);
                }
                Ok(updates) => {
                    tracing::debug!("pinned {candidate} ({})", candidate.provider);
                    self.current.set_pin(name, candidate.clone());
                    self.current.criteria.extend(updates);
                    return Ok(Vec::new());
                }
            }
        }
        Ok(causes)
    }

    /// Criteria after merging the dependencies of `candidate`, or the first
    /// criterion that runs out of candidates.
    fn criteria_to_update(
        &mut self,
        candidate: &Candidate,
    ) -> PynixResult<Result<BTreeMap<String, Criterion>, Criterion>> {
        let deps = self.cache.dependencies(self.provider, candidate)?;
        let mut updates: BTreeMap<String, Criterion> = BTreeMap::new();
        for requirement in deps.all() {
            let existing = updates
                .get(&requirement.name)
                .or_else(|| self.current.criteria.get(&requirement.name));
            match merge(
                &mut self.cache,
                self.provider,
                existing,
                requirement,
                Some(candidate),
            )? {
                Merge::Merged(criterion) => {
                    updates.insert(requirement.name.clone(), criterion);
                }
                Merge::Conflict(criterion) => return Ok(Err(criterion)),
            }
        }
        Ok(Ok(updates))
    }

    /// Undo pins until the accumulated incompatibilities leave every
    /// criterion with a candidate. Returns `false` when no pin is left to
    /// undo.
    fn backtrack(&mut self) -> bool {
        while self.stack.len() >= 2 {
            let (Some(mut broken), Some(base)) = (self.stack.pop(), self.stack.pop()) else {
                break;
            };
            self.current = base;
            let Some((name, candidate)) = broken.mapping.pop() else {
                continue;
            };
            tracing::debug!("backtracking: {candidate} marked incompatible");

            let mut incompatibilities: Vec<(String, Vec<CandidateId>)> = broken
                .criteria
                .iter()
                .map(|(k, c)| (k.clone(), c.incompatibilities.clone()))
                .collect();
            incompatibilities.push((name, vec![candidate.id()]));

            self.push_state();
            if self.patch_criteria(&incompatibilities) {
                return true;
            }
        }
        false
    }

    fn patch_criteria(&mut self, incompatibilities: &[(String, Vec<CandidateId>)]) -> bool {
        for (name, ids) in incompatibilities {
            if ids.is_empty() {
                continue;
            }
            let Some(criterion) = self.current.criteria.get(name) else {
                continue;
            };
            match criterion.excluded_of(ids) {
                Some(patched) => {
                    self.current.criteria.insert(name.clone(), patched);
                }
                None => return false,
            }
        }
        true
    }

    /// Pins reachable from the roots through requirements declared by the
    /// currently pinned candidates, as resolved packages.
    fn build_result(&mut self, state: State) -> PynixResult<Vec<ResolvedPackage>> {
        let pinned: HashMap<CandidateId, &str> = state
            .mapping
            .iter()
            .map(|(name, candidate)| (candidate.id(), name.as_str()))
            .collect();

        let mut connected: HashSet<&str> = HashSet::new();
        loop {
            let mut changed = false;
            for (name, criterion) in &state.criteria {
                if connected.contains(name.as_str()) {
                    continue;
                }
                let reachable = criterion.information.iter().any(|info| match &info.parent {
                    None => true,
                    Some(parent) => pinned
                        .get(&parent.id())
                        .is_some_and(|parent_name| connected.contains(parent_name)),
                });
                if reachable {
                    connected.insert(name);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut packages = Vec::new();
        for (name, candidate) in &state.mapping {
            if !connected.contains(name.as_str()) {
                continue;
            }
            let deps = self.cache.dependencies(self.provider, candidate)?;
            let names = |reqs: &[Requirement]| -> BTreeSet<String> {
                reqs.iter()
                    .map(|r| r.name.clone())
                    .filter(|dep| dep != name)
                    .collect()
            };
            let is_root = state
                .criteria
                .get(name)
                .is_some_and(|c| c.information.iter().any(|i| i.parent.is_none()));
            packages.push(ResolvedPackage {
                name: name.clone(),
                version: candidate.raw_version.clone(),
                build_inputs: names(&deps.build_time),
                prop_build_inputs: names(&deps.propagated),
                is_root,
                provider_info: self.provider.provider_info(candidate),
                extras_selected: candidate.extras.clone(),
                removed_circular_deps: BTreeSet::new(),
                build: candidate.build.clone(),
            });
        }
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        let (lists, deps) = self.cache.stats();
        tracing::debug!("resolved {} packages ({lists} candidate lists, {deps} dependency sets looked up)", packages.len());
        Ok(packages)
    }
}

fn conflict_name(criterion: &Criterion) -> &str {
    criterion
        .information
        .first()
        .map(|i| i.requirement.name.as_str())
        .unwrap_or_default()
}

/// Entry point: resolves requirements for one target against a combined
/// provider.
pub struct Resolver<'a> {
    provider: &'a CombinedProvider,
    context: MarkerContext,
    options: ResolveOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(provider: &'a CombinedProvider, target: &Target, options: ResolveOptions) -> Self {
        Self {
            provider,
            context: target.marker_context(),
            options,
        }
    }

    /// Resolve root requirements into one package per name.
    ///
    /// Roots whose markers do not hold for the target are dropped first. The
    /// result may still contain dependency cycles; see
    /// [`crate::graph::finalize`].
    pub fn resolve(&self, requirements: &[Requirement]) -> PynixResult<Vec<ResolvedPackage>> {
        let roots = filter_applicable(requirements, &self.context, &BTreeSet::new());
        tracing::debug!("resolving {} root requirements", roots.len());
        let mut session = Session::new(self.provider);
        let state = session.solve(&roots, self.options.max_rounds)?;
        session.build_result(state)
    }
}
