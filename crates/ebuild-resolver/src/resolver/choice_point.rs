use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use ebuild_atom::{Atom, Cnf};

use crate::error::{ResolverError, Result};
use crate::package::{DepClass, Package};

/// Identifies a choice point across the plan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoiceId(pub u64);

impl fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot used to detect retries that made no progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceState {
    pub current: Option<String>,
    pub remaining: usize,
    pub filters: usize,
}

/// Resumable cursor over the ordered candidates for one atom.
///
/// The current candidate's dependency CNFs are kept with every filtered
/// atom stripped out. A candidate whose stripped CNF contains an empty
/// group can never be satisfied and is skipped. Once the cursor runs off
/// the end it stays exhausted.
#[derive(Debug, Clone)]
pub struct ChoicePoint {
    id: ChoiceId,
    atom: Atom,
    matches: VecDeque<Arc<Package>>,
    current: Option<Arc<Package>>,
    started: bool,
    solution_filters: HashSet<Atom>,
    depsets: Option<[Cnf; 4]>,
}

impl ChoicePoint {
    pub fn new(id: ChoiceId, atom: Atom, matches: Vec<Arc<Package>>) -> Self {
        Self {
            id,
            atom,
            matches: matches.into(),
            current: None,
            started: false,
            solution_filters: HashSet::new(),
            depsets: None,
        }
    }

    pub fn id(&self) -> ChoiceId {
        self.id
    }

    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// Current candidate, materializing the first one on first access
    pub fn current(&mut self) -> Option<Arc<Package>> {
        self.ensure_started();
        self.current.clone()
    }

    /// Current candidate without advancing the cursor
    pub fn current_pkg(&self) -> Option<&Arc<Package>> {
        self.current.as_ref()
    }

    pub fn is_exhausted(&mut self) -> bool {
        self.current().is_none()
    }

    /// Candidates still reachable, the current one included
    pub fn remaining(&self) -> usize {
        usize::from(self.current.is_some()) + self.matches.len()
    }

    /// Discard the current candidate and move on, returning whether one is
    /// left.
    pub fn force_next(&mut self) -> bool {
        self.ensure_started();
        if self.current.is_some() {
            self.advance();
        }
        self.current.is_some()
    }

    /// Strip `atoms` from every OR-group of the current and all later
    /// candidates.
    ///
    /// Returns true when the cursor moved or nothing is left, false when the
    /// current candidate survived the filtering.
    pub fn reduce_atoms<'a, I>(&mut self, atoms: I) -> bool
    where
        I: IntoIterator<Item = &'a Atom>,
    {
        self.ensure_started();
        let mut changed = false;
        for atom in atoms {
            changed |= self.solution_filters.insert(atom.clone());
        }

        let Some(pkg) = self.current.clone() else {
            return true;
        };
        if !changed {
            return false;
        }

        match self.filtered_depsets(&pkg) {
            Some(depsets) => {
                self.depsets = Some(depsets);
                false
            }
            None => {
                log::trace!("{}: {} pruned by filtered atoms", self.atom, pkg);
                self.advance();
                true
            }
        }
    }

    /// Filtered CNF of the current candidate for `class`
    pub fn depset(&mut self, class: DepClass) -> Result<&Cnf> {
        self.ensure_started();
        match &self.depsets {
            Some(depsets) => Ok(&depsets[class.index()]),
            None => Err(ResolverError::NoCandidate(self.atom.to_string())),
        }
    }

    pub fn bdepend(&mut self) -> Result<&Cnf> {
        self.depset(DepClass::Bdepend)
    }

    pub fn depend(&mut self) -> Result<&Cnf> {
        self.depset(DepClass::Depend)
    }

    pub fn rdepend(&mut self) -> Result<&Cnf> {
        self.depset(DepClass::Rdepend)
    }

    pub fn pdepend(&mut self) -> Result<&Cnf> {
        self.depset(DepClass::Pdepend)
    }

    pub fn solution_filters(&self) -> &HashSet<Atom> {
        &self.solution_filters
    }

    pub fn state(&self) -> ChoiceState {
        ChoiceState {
            current: self.current.as_ref().map(|p| p.to_string()),
            remaining: self.remaining(),
            filters: self.solution_filters.len(),
        }
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.current = None;
        self.depsets = None;
        while let Some(pkg) = self.matches.pop_front() {
            if let Some(depsets) = self.filtered_depsets(&pkg) {
                self.current = Some(pkg);
                self.depsets = Some(depsets);
                return;
            }
            log::trace!("{}: skipping {}, filtered atoms leave a group empty", self.atom, pkg);
        }
    }

    fn filtered_depsets(&self, pkg: &Package) -> Option<[Cnf; 4]> {
        let filter = |class: DepClass| -> Option<Cnf> {
            let mut cnf = pkg.depset(class).cnf_solutions();
            for group in cnf.iter_mut() {
                group.retain(|atom| !self.solution_filters.contains(atom));
                if group.is_empty() {
                    return None;
                }
            }
            Some(cnf)
        };
        Some([
            filter(DepClass::Bdepend)?,
            filter(DepClass::Depend)?,
            filter(DepClass::Rdepend)?,
            filter(DepClass::Pdepend)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::RepoId;

    fn pkg(cpv: &str, rdepend: &str) -> Arc<Package> {
        Arc::new(
            Package::builder(cpv)
                .rdepend(rdepend)
                .repo(RepoId::new("gentoo", false))
                .build()
                .unwrap(),
        )
    }

    fn atom(s: &str) -> Atom {
        Atom::parse(s).unwrap()
    }

    fn choices(pkgs: Vec<Arc<Package>>) -> ChoicePoint {
        ChoicePoint::new(ChoiceId(1), atom("dev-libs/a"), pkgs)
    }

    #[test]
    fn test_lazy_current() {
        let mut cp = choices(vec![pkg("dev-libs/a-2", ""), pkg("dev-libs/a-1", "")]);
        assert!(cp.current_pkg().is_none());
        assert_eq!(cp.remaining(), 2);
        assert_eq!(cp.current().unwrap().cpv(), "dev-libs/a-2");
        assert_eq!(cp.remaining(), 2);
    }

    #[test]
    fn test_force_next_until_exhausted() {
        let mut cp = choices(vec![pkg("dev-libs/a-2", ""), pkg("dev-libs/a-1", "")]);
        assert!(cp.force_next());
        assert_eq!(cp.current().unwrap().cpv(), "dev-libs/a-1");
        assert!(!cp.force_next());
        assert!(cp.is_exhausted());
        assert!(!cp.force_next());
        assert!(cp.current().is_none());
        assert!(matches!(cp.rdepend(), Err(ResolverError::NoCandidate(_))));
    }

    #[test]
    fn test_depsets_of_current() {
        let mut cp = choices(vec![pkg("dev-libs/a-1", "dev-libs/b || ( dev-libs/c dev-libs/d )")]);
        let rdepend = cp.rdepend().unwrap().clone();
        assert_eq!(rdepend.len(), 2);
        assert_eq!(rdepend[1], vec![atom("dev-libs/c"), atom("dev-libs/d")]);
        assert!(cp.depend().unwrap().is_empty());
    }

    #[test]
    fn test_reduce_keeps_candidate_when_group_survives() {
        let mut cp = choices(vec![pkg("dev-libs/a-1", "|| ( dev-libs/c dev-libs/d )")]);
        assert!(!cp.reduce_atoms([&atom("dev-libs/c")]));
        assert_eq!(cp.rdepend().unwrap(), &vec![vec![atom("dev-libs/d")]]);
        assert!(cp.solution_filters().contains(&atom("dev-libs/c")));
    }

    #[test]
    fn test_reduce_moves_when_group_empties() {
        let mut cp = choices(vec![
            pkg("dev-libs/a-3", "dev-libs/x"),
            pkg("dev-libs/a-2", "|| ( dev-libs/x dev-libs/y )"),
            pkg("dev-libs/a-1", "dev-libs/y"),
        ]);
        assert!(cp.reduce_atoms([&atom("dev-libs/x")]));
        assert_eq!(cp.current().unwrap().cpv(), "dev-libs/a-2");
        assert!(cp.reduce_atoms([&atom("dev-libs/y")]));
        assert!(cp.current().is_none());
        assert!(cp.reduce_atoms([&atom("dev-libs/z")]));
    }

    #[test]
    fn test_later_candidates_skip_filtered() {
        let mut cp = choices(vec![
            pkg("dev-libs/a-3", ""),
            pkg("dev-libs/a-2", "dev-libs/x"),
            pkg("dev-libs/a-1", ""),
        ]);
        assert!(!cp.reduce_atoms([&atom("dev-libs/x")]));
        assert!(cp.force_next());
        assert_eq!(cp.current().unwrap().cpv(), "dev-libs/a-1");
    }

    #[test]
    fn test_state_changes_on_progress() {
        let mut cp = choices(vec![pkg("dev-libs/a-2", "|| ( dev-libs/c dev-libs/d )"), pkg("dev-libs/a-1", "")]);
        cp.current();
        let before = cp.state();
        cp.reduce_atoms([&atom("dev-libs/c")]);
        let filtered = cp.state();
        assert_ne!(before, filtered);
        cp.force_next();
        assert_ne!(filtered, cp.state());
    }
}
