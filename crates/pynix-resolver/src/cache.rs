//! Per-run memoization of provider lookups.
//!
//! Backtracking asks for the same candidate lists and dependency sets over
//! and over. A [`RunCache`] lives exactly as long as one resolution run, so
//! separate runs never observe each other's lookups.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use pynix_util::errors::PynixResult;

use crate::provider::combined::CombinedProvider;
use crate::provider::{Candidate, CandidateId, Dependencies};

type CandidateQuery = (String, BTreeSet<String>, BTreeSet<String>);

#[derive(Default)]
pub struct RunCache {
    candidates: HashMap<CandidateQuery, Rc<Vec<Candidate>>>,
    dependencies: HashMap<CandidateId, Rc<Dependencies>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates for `(name, extras, builds)`, best first.
    pub fn candidates(
        &mut self,
        provider: &CombinedProvider,
        name: &str,
        extras: &BTreeSet<String>,
        builds: &BTreeSet<String>,
    ) -> PynixResult<Rc<Vec<Candidate>>> {
        let key = (name.to_string(), extras.clone(), builds.clone());
        if let Some(hit) = self.candidates.get(&key) {
            return Ok(Rc::clone(hit));
        }
        let found = Rc::new(provider.all_candidates(name, extras, builds)?);
        self.candidates.insert(key, Rc::clone(&found));
        Ok(found)
    }

    /// Dependencies of a candidate.
    pub fn dependencies(
        &mut self,
        provider: &CombinedProvider,
        candidate: &Candidate,
    ) -> PynixResult<Rc<Dependencies>> {
        let key = candidate.id();
        if let Some(hit) = self.dependencies.get(&key) {
            return Ok(Rc::clone(hit));
        }
        let deps = Rc::new(provider.dependencies_of(candidate)?);
        self.dependencies.insert(key, Rc::clone(&deps));
        Ok(deps)
    }

    /// Number of memoized `(candidate lists, dependency sets)`.
    pub fn stats(&self) -> (usize, usize) {
        (self.candidates.len(), self.dependencies.len())
    }
}
