use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use ebuild_atom::Atom;

use super::choice_point::ChoiceId;
use super::pigeonholes::{Blocker, PigeonholedSlots, SlotConflict};
use super::transaction::Operation;
use crate::error::{ResolverError, Result};
use crate::package::Package;

/// Multiset counting how many times each item was added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCountingSet<T: Eq + Hash> {
    counts: HashMap<T, usize>,
}

impl<T: Eq + Hash> Default for RefCountingSet<T> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash> RefCountingSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference, returning the new count
    pub fn add(&mut self, item: T) -> usize {
        let count = self.counts.entry(item).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop one reference, returning false if the item was absent
    pub fn remove<Q>(&mut self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        match self.counts.get_mut(item) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(item);
                true
            }
            None => false,
        }
    }

    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.counts.contains_key(item)
    }

    pub fn count<Q>(&self, item: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.counts.get(item).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Why a package sits in the plan: the choice point that selected it, the
/// atom it satisfies and the atom whose resolution asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceBinding {
    pub id: ChoiceId,
    pub atom: Atom,
    pub requester: Option<Atom>,
}

impl ChoiceBinding {
    pub fn new(id: ChoiceId, atom: Atom, requester: Option<Atom>) -> Self {
        Self { id, atom, requester }
    }
}

/// The package a replace displaced, recorded so the replace can be undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Displaced {
    pub pkg: Arc<Package>,
    pub binding: ChoiceBinding,
    pub forced: bool,
}

/// A reversible mutation of [`PlanState`].
///
/// Ops are built with the constructors below and handed to
/// [`PlanState::apply`], which fills in whatever payload the revert needs
/// before appending the op to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Add {
        pkg: Arc<Package>,
        binding: ChoiceBinding,
        force: bool,
    },
    Remove {
        pkg: Arc<Package>,
        binding: Option<ChoiceBinding>,
    },
    Replace {
        pkg: Arc<Package>,
        binding: ChoiceBinding,
        force: bool,
        old: Option<Displaced>,
    },
    IncrefBlock {
        choice: ChoiceId,
        blocker: Blocker,
        key: String,
    },
    DecrefBlock {
        choice: ChoiceId,
        blocker: Blocker,
        key: String,
        position: usize,
    },
    /// Atom requested directly by the caller
    Hardref(Atom),
    /// Cycle marker
    Backref(Atom),
}

impl Op {
    pub fn add(binding: ChoiceBinding, pkg: Arc<Package>) -> Self {
        Op::Add {
            pkg,
            binding,
            force: false,
        }
    }

    pub fn force_add(binding: ChoiceBinding, pkg: Arc<Package>) -> Self {
        Op::Add {
            pkg,
            binding,
            force: true,
        }
    }

    pub fn remove(pkg: Arc<Package>) -> Self {
        Op::Remove { pkg, binding: None }
    }

    pub fn replace(binding: ChoiceBinding, pkg: Arc<Package>) -> Self {
        Op::Replace {
            pkg,
            binding,
            force: false,
            old: None,
        }
    }

    pub fn incref_block(choice: ChoiceId, blocker: Blocker, key: Option<&str>) -> Self {
        let key = key.unwrap_or(blocker.atom().key()).to_string();
        Op::IncrefBlock { choice, blocker, key }
    }

    pub fn decref_block(choice: ChoiceId, blocker: Blocker, key: Option<&str>) -> Self {
        let key = key.unwrap_or(blocker.atom().key()).to_string();
        Op::DecrefBlock {
            choice,
            blocker,
            key,
            position: 0,
        }
    }

    pub fn hardref(atom: Atom) -> Self {
        Op::Hardref(atom)
    }

    pub fn backref(atom: Atom) -> Self {
        Op::Backref(atom)
    }

    /// Bookkeeping ops that never show up as merge operations
    pub fn is_internal(&self) -> bool {
        !matches!(self, Op::Add { .. } | Op::Remove { .. } | Op::Replace { .. })
    }

    pub fn desc(&self) -> &'static str {
        match self {
            Op::Add { .. } => "add",
            Op::Remove { .. } => "remove",
            Op::Replace { .. } => "replace",
            Op::IncrefBlock { .. } => "incref_blocker",
            Op::DecrefBlock { .. } => "decref_blocker",
            Op::Hardref(_) => "hardref",
            Op::Backref(_) => "backref",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Add { pkg, .. } | Op::Remove { pkg, .. } => write!(f, "{} {}", self.desc(), pkg),
            Op::Replace { pkg, old, .. } => match old {
                Some(old) => write!(f, "replace {} with {}", old.pkg, pkg),
                None => write!(f, "replace with {}", pkg),
            },
            Op::IncrefBlock { choice, blocker, .. } | Op::DecrefBlock { choice, blocker, .. } => {
                write!(f, "{} {} for {}", self.desc(), blocker, choice)
            }
            Op::Hardref(atom) | Op::Backref(atom) => write!(f, "{} {}", self.desc(), atom),
        }
    }
}

/// Transactional resolver state.
///
/// Every mutation goes through [`apply`](Self::apply) and lands in an
/// append-only log; [`backtrack`](Self::backtrack) undoes a log suffix by
/// reverting entries newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanState {
    slots: PigeonholedSlots,
    log: Vec<Op>,
    pkg_choices: HashMap<Arc<Package>, ChoiceBinding>,
    rev_blockers: HashMap<ChoiceId, Vec<(Blocker, String)>>,
    blockers_refcnt: RefCountingSet<Blocker>,
    vdb_filter: RefCountingSet<Arc<Package>>,
    forced_restrictions: RefCountingSet<Atom>,
}

impl PlanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log position to hand to [`backtrack`](Self::backtrack) later
    pub fn current_state(&self) -> usize {
        self.log.len()
    }

    pub fn slots(&self) -> &PigeonholedSlots {
        &self.slots
    }

    pub fn log(&self) -> &[Op] {
        &self.log
    }

    pub fn binding(&self, pkg: &Package) -> Option<&ChoiceBinding> {
        self.pkg_choices.get(pkg)
    }

    /// Whether an installed package has been slated for removal or replacement
    pub fn vdb_filtered(&self, pkg: &Package) -> bool {
        self.vdb_filter.contains(pkg)
    }

    pub fn is_forced(&self, atom: &Atom) -> bool {
        self.forced_restrictions.contains(atom)
    }

    pub fn blocker_refcount(&self, blocker: &Blocker) -> usize {
        self.blockers_refcnt.count(blocker)
    }

    /// Slotted packages matching `atom`
    pub fn match_atom(&self, atom: &Atom) -> Vec<Arc<Package>> {
        self.slots.find_atom_matches(atom, None)
    }

    /// Apply `op`, returning whatever conflicts it ran into.
    ///
    /// An add or replace that hits conflicts leaves the state untouched and
    /// is not logged. An incref that hits slotted packages is still logged;
    /// the caller decides whether to backtrack.
    pub fn apply(&mut self, op: Op) -> Result<Vec<SlotConflict>> {
        match op {
            Op::Add { pkg, binding, force } => {
                let conflicts = self.slots.fill_slotting(&pkg, force);
                if !conflicts.is_empty() {
                    return Ok(conflicts);
                }
                self.pkg_choices.insert(Arc::clone(&pkg), binding.clone());
                self.log.push(Op::Add { pkg, binding, force });
            }
            Op::Remove { pkg, .. } => {
                let binding = self
                    .pkg_choices
                    .get(&pkg)
                    .cloned()
                    .ok_or_else(|| ResolverError::UnknownBinding(pkg.to_string()))?;
                self.slots.remove_slotting(&pkg)?;
                self.remove_pkg_blockers(binding.id)?;
                self.pkg_choices.remove(&pkg);
                self.vdb_filter.add(Arc::clone(&pkg));
                self.log.push(Op::Remove {
                    pkg,
                    binding: Some(binding),
                });
            }
            Op::Replace {
                pkg, binding, force, ..
            } => {
                let revert_point = self.current_state();
                let old = self
                    .slots
                    .get_conflicting_slot(&pkg)
                    .cloned()
                    .ok_or_else(|| ResolverError::UnknownSlotting(pkg.slotted_atom().to_string()))?;
                let forced = !self.slots.check_limiters(&old).is_empty();
                let old_binding = self
                    .pkg_choices
                    .get(&old)
                    .cloned()
                    .ok_or_else(|| ResolverError::UnknownBinding(old.to_string()))?;

                self.slots.remove_slotting(&old)?;
                self.remove_pkg_blockers(old_binding.id)?;

                let conflicts = self.slots.fill_slotting(&pkg, force);
                if !conflicts.is_empty() {
                    self.slots.fill_slotting(&old, forced);
                    self.backtrack(revert_point);
                    return Ok(conflicts);
                }

                self.pkg_choices.remove(&old);
                self.pkg_choices.insert(Arc::clone(&pkg), binding.clone());
                self.vdb_filter.add(Arc::clone(&old));
                self.log.push(Op::Replace {
                    pkg,
                    binding,
                    force,
                    old: Some(Displaced {
                        pkg: old,
                        binding: old_binding,
                        forced,
                    }),
                });
            }
            Op::IncrefBlock { choice, blocker, key } => {
                let hits = if self.blockers_refcnt.contains(&blocker) {
                    Vec::new()
                } else {
                    self.slots.add_limiter(blocker.clone(), Some(&key))
                };
                self.rev_blockers
                    .entry(choice)
                    .or_default()
                    .push((blocker.clone(), key.clone()));
                self.blockers_refcnt.add(blocker.clone());
                self.log.push(Op::IncrefBlock { choice, blocker, key });
                return Ok(hits.into_iter().map(SlotConflict::Occupant).collect());
            }
            Op::DecrefBlock {
                choice, blocker, key, ..
            } => {
                let unknown = || ResolverError::UnknownLimiter(blocker.to_string());
                let entries = self.rev_blockers.get_mut(&choice).ok_or_else(unknown)?;
                let position = entries
                    .iter()
                    .position(|(b, k)| *b == blocker && *k == key)
                    .ok_or_else(unknown)?;
                entries.remove(position);
                if entries.is_empty() {
                    self.rev_blockers.remove(&choice);
                }
                self.blockers_refcnt.remove(&blocker);
                if !self.blockers_refcnt.contains(&blocker) {
                    self.slots.remove_limiter(&blocker, Some(&key))?;
                }
                self.log.push(Op::DecrefBlock {
                    choice,
                    blocker,
                    key,
                    position,
                });
            }
            Op::Hardref(atom) => {
                self.forced_restrictions.add(atom.clone());
                self.log.push(Op::Hardref(atom));
            }
            Op::Backref(atom) => {
                self.log.push(Op::Backref(atom));
            }
        }
        Ok(Vec::new())
    }

    fn remove_pkg_blockers(&mut self, choice: ChoiceId) -> Result<()> {
        let entries = self.rev_blockers.get(&choice).cloned().unwrap_or_default();
        for (blocker, key) in entries {
            self.apply(Op::decref_block(choice, blocker, Some(&key)))?;
        }
        Ok(())
    }

    fn revert(&mut self, op: Op) -> Result<()> {
        match op {
            Op::Add { pkg, .. } => {
                self.slots.remove_slotting(&pkg)?;
                self.pkg_choices.remove(&pkg);
            }
            Op::Remove { pkg, binding } => {
                let binding = binding.ok_or_else(|| ResolverError::UnknownBinding(pkg.to_string()))?;
                if !self.slots.fill_slotting(&pkg, true).is_empty() {
                    return Err(ResolverError::UnknownSlotting(pkg.slotted_atom().to_string()));
                }
                self.pkg_choices.insert(Arc::clone(&pkg), binding);
                self.vdb_filter.remove(&pkg);
            }
            Op::Replace { pkg, old, .. } => {
                let old = old.ok_or_else(|| ResolverError::UnknownBinding(pkg.to_string()))?;
                self.slots.remove_slotting(&pkg)?;
                self.pkg_choices.remove(&pkg);
                if !self.slots.fill_slotting(&old.pkg, old.forced).is_empty() {
                    return Err(ResolverError::UnknownSlotting(old.pkg.slotted_atom().to_string()));
                }
                self.vdb_filter.remove(&old.pkg);
                self.pkg_choices.insert(old.pkg, old.binding);
            }
            Op::IncrefBlock { choice, blocker, key } => {
                let entries = self
                    .rev_blockers
                    .get_mut(&choice)
                    .ok_or_else(|| ResolverError::UnknownLimiter(blocker.to_string()))?;
                if entries.last() != Some(&(blocker.clone(), key.clone())) {
                    return Err(ResolverError::UnknownLimiter(blocker.to_string()));
                }
                entries.pop();
                if entries.is_empty() {
                    self.rev_blockers.remove(&choice);
                }
                self.blockers_refcnt.remove(&blocker);
                if !self.blockers_refcnt.contains(&blocker) {
                    self.slots.remove_limiter(&blocker, Some(&key))?;
                }
            }
            Op::DecrefBlock {
                choice,
                blocker,
                key,
                position,
            } => {
                if !self.blockers_refcnt.contains(&blocker) {
                    self.slots.add_limiter(blocker.clone(), Some(&key));
                }
                self.blockers_refcnt.add(blocker.clone());
                let entries = self.rev_blockers.entry(choice).or_default();
                entries.insert(position.min(entries.len()), (blocker, key));
            }
            Op::Hardref(atom) => {
                self.forced_restrictions.remove(&atom);
            }
            Op::Backref(_) => {}
        }
        Ok(())
    }

    /// Undo every log entry past `mark`, newest first.
    ///
    /// # Panics
    ///
    /// If `mark` lies beyond the log, or a revert finds the state
    /// inconsistent with the entry being undone.
    pub fn backtrack(&mut self, mark: usize) {
        assert!(
            mark <= self.log.len(),
            "backtrack to {} past the end of a {} entry log",
            mark,
            self.log.len()
        );
        let undone = self.log.split_off(mark);
        for op in undone.into_iter().rev() {
            let desc = op.to_string();
            if let Err(err) = self.revert(op) {
                panic!("plan state corrupted while reverting {}: {}", desc, err);
            }
        }
    }

    /// Merge operations in log order.
    ///
    /// Bookkeeping entries are skipped, as are installed packages pulled into
    /// the plan unchanged unless `include_livefs` is set.
    pub fn iter_ops(&self, include_livefs: bool) -> impl Iterator<Item = Operation> + '_ {
        self.log.iter().filter_map(move |op| match op {
            Op::Add { pkg, .. } => {
                (include_livefs || !pkg.repo().livefs()).then(|| Operation::Install(Arc::clone(pkg)))
            }
            Op::Remove { pkg, .. } => Some(Operation::Remove(Arc::clone(pkg))),
            Op::Replace {
                pkg, old: Some(old), ..
            } => (include_livefs || !pkg.repo().livefs()).then(|| Operation::Replace {
                old: Arc::clone(&old.pkg),
                new: Arc::clone(pkg),
            }),
            _ => None,
        })
    }

    /// Every slotted package with the binding that put it there
    pub fn packages(&self) -> impl Iterator<Item = (&Arc<Package>, &ChoiceBinding)> + '_ {
        self.pkg_choices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::RepoId;

    fn pkg(cpv: &str, livefs: bool) -> Arc<Package> {
        let repo = if livefs {
            RepoId::new("vdb", true)
        } else {
            RepoId::new("gentoo", false)
        };
        Arc::new(Package::builder(cpv).repo(repo).build().unwrap())
    }

    fn atom(s: &str) -> Atom {
        Atom::parse(s).unwrap()
    }

    fn binding(id: u64, s: &str) -> ChoiceBinding {
        ChoiceBinding::new(ChoiceId(id), atom(s), None)
    }

    #[test]
    fn test_refcounting_set() {
        let mut set = RefCountingSet::new();
        assert_eq!(set.add("a"), 1);
        assert_eq!(set.add("a"), 2);
        assert!(set.remove(&"a"));
        assert!(set.contains(&"a"));
        assert!(set.remove(&"a"));
        assert!(!set.contains(&"a"));
        assert!(!set.remove(&"a"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_add_and_backtrack() {
        let mut state = PlanState::new();
        let a = pkg("dev-libs/a-1", false);
        assert!(state.apply(Op::add(binding(1, "dev-libs/a"), a.clone())).unwrap().is_empty());
        assert_eq!(state.match_atom(&atom("dev-libs/a")), vec![a.clone()]);
        assert_eq!(state.current_state(), 1);

        state.backtrack(0);
        assert_eq!(state, PlanState::new());
    }

    #[test]
    fn test_conflicting_add_is_not_logged() {
        let mut state = PlanState::new();
        let a1 = pkg("dev-libs/a-1", false);
        let a2 = pkg("dev-libs/a-2", false);
        state.apply(Op::add(binding(1, "dev-libs/a"), a1.clone())).unwrap();
        let conflicts = state.apply(Op::add(binding(2, "dev-libs/a"), a2)).unwrap();
        assert_eq!(conflicts, vec![SlotConflict::Occupant(a1)]);
        assert_eq!(state.current_state(), 1);
    }

    #[test]
    fn test_blocker_refcount_touches_slots_once() {
        let mut state = PlanState::new();
        let b = Blocker::new(atom("!dev-libs/b"));
        state.apply(Op::incref_block(ChoiceId(1), b.clone(), None)).unwrap();
        state.apply(Op::incref_block(ChoiceId(2), b.clone(), None)).unwrap();
        assert_eq!(state.blocker_refcount(&b), 2);
        assert_eq!(state.slots().limiter_count(), 1);

        state.apply(Op::decref_block(ChoiceId(1), b.clone(), None)).unwrap();
        assert_eq!(state.slots().limiter_count(), 1);
        state.apply(Op::decref_block(ChoiceId(2), b.clone(), None)).unwrap();
        assert_eq!(state.slots().limiter_count(), 0);

        state.backtrack(2);
        assert_eq!(state.blocker_refcount(&b), 2);
        state.backtrack(0);
        assert_eq!(state, PlanState::new());
    }

    #[test]
    fn test_incref_reports_hits() {
        let mut state = PlanState::new();
        let b1 = pkg("dev-libs/b-1", false);
        state.apply(Op::add(binding(1, "dev-libs/b"), b1.clone())).unwrap();
        let hits = state
            .apply(Op::incref_block(ChoiceId(2), Blocker::new(atom("!dev-libs/b")), None))
            .unwrap();
        assert_eq!(hits, vec![SlotConflict::Occupant(b1)]);
        assert_eq!(state.current_state(), 2);
    }

    #[test]
    fn test_remove_detaches_blockers() {
        let mut state = PlanState::new();
        let a = pkg("dev-libs/a-1", true);
        let b = Blocker::new(atom("!dev-libs/b"));
        state.apply(Op::force_add(binding(1, "dev-libs/a"), a.clone())).unwrap();
        state.apply(Op::incref_block(ChoiceId(1), b.clone(), None)).unwrap();
        let before = state.clone();

        state.apply(Op::remove(a.clone())).unwrap();
        assert!(state.match_atom(&atom("dev-libs/a")).is_empty());
        assert_eq!(state.blocker_refcount(&b), 0);
        assert!(state.vdb_filtered(&a));
        let ops: Vec<_> = state.iter_ops(false).collect();
        assert_eq!(ops, vec![Operation::Remove(a.clone())]);

        state.backtrack(2);
        assert_eq!(state, before);
    }

    #[test]
    fn test_remove_unknown_package_fails_cleanly() {
        let mut state = PlanState::new();
        let a = pkg("dev-libs/a-1", true);
        assert!(matches!(state.apply(Op::remove(a)), Err(ResolverError::UnknownBinding(_))));
        assert_eq!(state, PlanState::new());
    }

    #[test]
    fn test_replace_and_revert() {
        let mut state = PlanState::new();
        let installed = pkg("dev-libs/a-1", true);
        let upgrade = pkg("dev-libs/a-2", false);
        state.apply(Op::force_add(binding(1, "dev-libs/a:0"), installed.clone())).unwrap();
        state
            .apply(Op::incref_block(ChoiceId(1), Blocker::new(atom("!dev-libs/z")), None))
            .unwrap();
        let before = state.clone();

        assert!(state
            .apply(Op::replace(binding(2, "dev-libs/a"), upgrade.clone()))
            .unwrap()
            .is_empty());
        assert_eq!(state.match_atom(&atom("dev-libs/a")), vec![upgrade.clone()]);
        assert!(state.vdb_filtered(&installed));
        assert_eq!(state.slots().limiter_count(), 0);
        let ops: Vec<_> = state.iter_ops(false).collect();
        assert_eq!(
            ops,
            vec![Operation::Replace {
                old: installed.clone(),
                new: upgrade.clone()
            }]
        );

        state.backtrack(before.current_state());
        assert_eq!(state, before);
    }

    #[test]
    fn test_failed_replace_leaves_no_trace() {
        let mut state = PlanState::new();
        let installed = pkg("dev-libs/a-1", true);
        let upgrade = pkg("dev-libs/a-2", false);
        state.apply(Op::force_add(binding(1, "dev-libs/a"), installed.clone())).unwrap();
        state
            .apply(Op::incref_block(ChoiceId(1), Blocker::new(atom("!dev-libs/z")), None))
            .unwrap();
        state
            .apply(Op::incref_block(ChoiceId(3), Blocker::new(atom("!>=dev-libs/a-2")), None))
            .unwrap();
        let before = state.clone();

        let conflicts = state.apply(Op::replace(binding(2, "dev-libs/a"), upgrade)).unwrap();
        assert!(matches!(conflicts.as_slice(), [SlotConflict::Blocker(_)]));
        assert_eq!(state, before);
    }

    #[test]
    fn test_hardref_and_backref() {
        let mut state = PlanState::new();
        state.apply(Op::hardref(atom("dev-libs/a"))).unwrap();
        state.apply(Op::backref(atom("dev-libs/a"))).unwrap();
        assert!(state.is_forced(&atom("dev-libs/a")));
        assert_eq!(state.iter_ops(true).count(), 0);
        assert!(state.log().iter().all(Op::is_internal));
        state.backtrack(0);
        assert!(!state.is_forced(&atom("dev-libs/a")));
    }

    #[test]
    fn test_iter_ops_hides_livefs_adds() {
        let mut state = PlanState::new();
        let installed = pkg("dev-libs/a-1", true);
        let fresh = pkg("dev-libs/b-1", false);
        state.apply(Op::force_add(binding(1, "dev-libs/a"), installed.clone())).unwrap();
        state.apply(Op::add(binding(2, "dev-libs/b"), fresh.clone())).unwrap();
        assert_eq!(state.iter_ops(false).collect::<Vec<_>>(), vec![Operation::Install(fresh.clone())]);
        assert_eq!(
            state.iter_ops(true).collect::<Vec<_>>(),
            vec![Operation::Install(installed), Operation::Install(fresh)]
        );
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn test_backtrack_past_end_panics() {
        let mut state = PlanState::new();
        state.backtrack(1);
    }
}
