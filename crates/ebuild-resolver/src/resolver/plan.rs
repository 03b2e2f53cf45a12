use std::collections::HashSet;
use std::sync::Arc;

use ebuild_atom::Atom;

use super::choice_point::{ChoiceId, ChoicePoint};
use super::pigeonholes::{Blocker, SlotConflict};
use super::policy::Policy;
use super::problem::{ChoiceFailure, FailureReason, FailureTrace, FrameEvent, Outcome, ResolveFailure};
use super::stack::{DbScope, DepMode, ResolverFrame, ResolverStack};
use super::state::{ChoiceBinding, Op, PlanState};
use super::transaction::Operation;
use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::package::{DepClass, Package};
use crate::repository::{CachingRepository, Repository};

type Resolution = std::result::Result<Outcome, Box<FailureTrace>>;

enum Viable {
    PreSolved(Arc<Package>),
    Candidates(ChoicePoint),
}

/// Depth-first dependency resolver.
///
/// Atoms are resolved one frame at a time against the configured
/// repositories; every committed change goes through the plan state's
/// operation log, and a failed branch is undone by backtracking that log.
pub struct MergePlan {
    repos: Vec<CachingRepository>,
    policy: Policy,
    config: ResolverConfig,
    state: PlanState,
    insoluble: HashSet<Atom>,
    next_choice: u64,
}

impl MergePlan {
    pub fn new(repos: Vec<Box<dyn Repository>>, policy: Policy, config: ResolverConfig) -> Self {
        let mut plan = Self {
            repos: repos.into_iter().map(CachingRepository::new).collect(),
            policy,
            config,
            state: PlanState::new(),
            insoluble: HashSet::new(),
            next_choice: 0,
        };
        if plan.config.preload_livefs {
            plan.load_livefs_state();
        }
        plan
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn repositories(&self) -> &[CachingRepository] {
        &self.repos
    }

    /// Atoms found to have no candidates at all
    pub fn insoluble(&self) -> &HashSet<Atom> {
        &self.insoluble
    }

    pub fn forget_insoluble(&mut self) {
        self.insoluble.clear();
    }

    pub fn current_mark(&self) -> usize {
        self.state.current_state()
    }

    /// Discard everything committed after `mark`
    pub fn reset(&mut self, mark: usize) {
        log::debug!("resetting plan to {}", mark);
        self.state.backtrack(mark);
    }

    pub fn iter_ops(&self, include_livefs: bool) -> impl Iterator<Item = Operation> + '_ {
        self.state.iter_ops(include_livefs)
    }

    /// Release the memoized repository matches
    pub fn free_caches(&mut self) {
        for repo in &mut self.repos {
            repo.clear();
        }
    }

    /// Resolve `atoms` in order, stopping at the first one that fails.
    ///
    /// Every atom is pinned before any is resolved. A failure leaves the
    /// successfully resolved atoms committed; callers wanting to skip the
    /// failed atom can [`reset`](Self::reset) to a mark taken beforehand.
    /// With `finalize`, the remaining installed packages are slotted once
    /// everything resolved.
    pub fn add_atoms(&mut self, atoms: &[Atom], finalize: bool) -> std::result::Result<(), ResolveFailure> {
        let mut stack = ResolverStack::new();
        for atom in atoms {
            self.apply(Op::hardref(atom.clone()));
        }
        for (blocker, atom) in Self::overlapping_requests(atoms) {
            log::warn!("requested blocker {} may block requested {}", blocker, atom);
        }
        for atom in atoms {
            log::info!("resolving {}", atom);
            let result = if atom.blocks() {
                self.add_root_blocker(atom)
            } else {
                self.rec_add_atom(&mut stack, atom, DbScope::All, DepMode::Root, false)
            };
            match result {
                Ok(outcome) => log::info!("{} {}", atom, outcome),
                Err(trace) => {
                    log::info!("failed to resolve {}", atom);
                    return Err(ResolveFailure::new(*trace));
                }
            }
        }
        if finalize {
            self.load_livefs_state();
        }
        log::info!(
            "plan holds {} operations, {} atoms known insoluble",
            self.state.iter_ops(false).count(),
            self.insoluble.len()
        );
        Ok(())
    }

    /// Schedule removal of the installed packages matching each atom.
    ///
    /// Nothing is changed if any atom matches no installed package.
    pub fn remove_atoms(&mut self, atoms: &[Atom]) -> Result<()> {
        let mark = self.current_mark();
        for atom in atoms {
            let restrict = atom.unblocked();
            self.ensure_livefs_loaded(&restrict);
            let installed: Vec<Arc<Package>> = self
                .state
                .match_atom(&restrict)
                .into_iter()
                .filter(|pkg| pkg.repo().livefs())
                .collect();
            if installed.is_empty() {
                self.state.backtrack(mark);
                return Err(ResolverError::NothingToRemove(atom.to_string()));
            }
            for pkg in installed {
                log::debug!("removing {}", pkg);
                if let Err(err) = self.state.apply(Op::remove(pkg)) {
                    self.state.backtrack(mark);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Slot every installed package whose slot is still free
    pub fn load_livefs_state(&mut self) {
        let installed: Vec<Arc<Package>> = self
            .repos
            .iter()
            .filter(|repo| repo.livefs())
            .flat_map(|repo| repo.packages())
            .collect();
        let mut loaded = 0;
        for pkg in installed {
            if self.force_slot_installed(&pkg, &pkg.slotted_atom()) {
                loaded += 1;
            }
        }
        log::debug!("loaded {} installed packages", loaded);
    }

    /// Pairs of requested blockers and requested atoms they may overlap
    fn overlapping_requests(atoms: &[Atom]) -> Vec<(&Atom, &Atom)> {
        let mut pairs = Vec::new();
        for blocker in atoms.iter().filter(|a| a.blocks()) {
            for atom in atoms.iter().filter(|a| !a.blocks()) {
                if blocker.intersects(atom) {
                    pairs.push((blocker, atom));
                }
            }
        }
        pairs
    }

    fn next_id(&mut self) -> ChoiceId {
        self.next_choice += 1;
        ChoiceId(self.next_choice)
    }

    fn apply(&mut self, op: Op) -> Vec<SlotConflict> {
        let desc = op.to_string();
        match self.state.apply(op) {
            Ok(conflicts) => conflicts,
            Err(err) => panic!("plan state rejected {}: {}", desc, err),
        }
    }

    fn force_slot_installed(&mut self, pkg: &Arc<Package>, restrict: &Atom) -> bool {
        if self.state.vdb_filtered(pkg) || self.state.slots().get_conflicting_slot(pkg).is_some() {
            return false;
        }
        let binding = ChoiceBinding::new(self.next_id(), restrict.clone(), None);
        self.apply(Op::force_add(binding, Arc::clone(pkg))).is_empty()
    }

    /// Slot the installed packages matching `restrict` so that later
    /// inserts see them as occupants and blockers see them as hits
    fn ensure_livefs_loaded(&mut self, restrict: &Atom) {
        let installed: Vec<Arc<Package>> = self
            .repos
            .iter_mut()
            .filter(|repo| repo.livefs())
            .flat_map(|repo| repo.itermatch(restrict).to_vec())
            .collect();
        for pkg in installed {
            if self.force_slot_installed(&pkg, restrict) {
                log::trace!("loaded installed {} for {}", pkg, restrict);
            }
        }
    }

    fn candidates(&mut self, atom: &Atom, dbs: DbScope) -> Vec<Arc<Package>> {
        let state = &self.state;
        let per_repo: Vec<(bool, Vec<Arc<Package>>)> = self
            .repos
            .iter_mut()
            .filter(|repo| dbs == DbScope::All || repo.livefs())
            .map(|repo| {
                let livefs = repo.livefs();
                let matches = repo
                    .itermatch(atom)
                    .iter()
                    .filter(|pkg| !livefs || !state.vdb_filtered(pkg))
                    .cloned()
                    .collect();
                (livefs, matches)
            })
            .collect();
        self.policy.order(per_repo)
    }

    fn viable(&mut self, atom: &Atom, dbs: DbScope) -> std::result::Result<Viable, FailureReason> {
        if self.insoluble.contains(atom) {
            return Err(FailureReason::GloballyInsoluble);
        }
        if let Some(pkg) = self.state.match_atom(atom).into_iter().next() {
            return Ok(Viable::PreSolved(pkg));
        }

        let candidates = self.candidates(atom, dbs);
        if candidates.is_empty() {
            if dbs == DbScope::All {
                self.insoluble.insert(atom.clone());
            }
            return Err(FailureReason::NoMatches);
        }

        let mut choices = ChoicePoint::new(self.next_id(), atom.clone(), candidates);
        choices.reduce_atoms(self.insoluble.iter());
        if choices.is_exhausted() {
            return Err(FailureReason::PrunedByInsolubles);
        }
        Ok(Viable::Candidates(choices))
    }

    fn rec_add_atom(
        &mut self,
        stack: &mut ResolverStack,
        atom: &Atom,
        dbs: DbScope,
        mode: DepMode,
        drop_cycles: bool,
    ) -> Resolution {
        let parent = stack.len().checked_sub(1);
        let depth = stack.len();
        let indent = "  ".repeat(depth);
        let requester = stack.requester_from(parent).cloned();
        log::debug!("{}processing {} ({})", indent, atom, mode);

        let fail = |reason: FailureReason, events: Vec<FrameEvent>| {
            Box::new(FailureTrace {
                atom: atom.clone(),
                mode,
                requester: requester.clone(),
                reason,
                events,
            })
        };

        let choices = match self.viable(atom, dbs) {
            Ok(Viable::PreSolved(pkg)) => {
                log::debug!("{}{} already satisfied by {}", indent, atom, pkg);
                if let Some(parent) = parent {
                    stack.frame_mut(parent).push_event(FrameEvent::PreSolved { atom: atom.clone(), pkg });
                }
                return Ok(Outcome::PreSolved);
            }
            Ok(Viable::Candidates(choices)) => choices,
            Err(reason) => {
                log::debug!("{}{}: {}", indent, atom, reason);
                return Err(fail(reason, Vec::new()));
            }
        };

        let viable = choices.remaining();
        let start_point = self.state.current_state();
        let idx = stack.add_frame(ResolverFrame::new(
            parent,
            choices,
            dbs,
            mode,
            start_point,
            depth,
            drop_cycles,
        ));
        stack.frame_mut(idx).push_event(FrameEvent::Viable(viable));

        let mut last_state = None;
        while let Some(pkg) = stack.frame_mut(idx).choices.current() {
            if self.config.debug {
                let state = stack.frame(idx).choices.state();
                assert!(
                    last_state.as_ref() != Some(&state),
                    "{} retried {} without progress",
                    atom,
                    pkg
                );
                last_state = Some(state);
            }

            // checked per candidate, a later one may cycle where the first did not
            match self.check_for_cycles(stack, idx) {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    log::debug!("{}{} resolved through a cycle ({})", indent, atom, outcome);
                    stack.frame_mut(idx).push_event(FrameEvent::Succeeded { pkg: None, outcome });
                    stack.pop_frame(true);
                    return Ok(outcome);
                }
                Err(reason) => {
                    log::debug!("{}{}: {}", indent, atom, reason);
                    let events = stack.pop_frame(false).map(|f| f.events).unwrap_or_default();
                    return Err(fail(reason, events));
                }
            }

            log::debug!("{}trying {}", indent, pkg);
            stack.frame_mut(idx).push_event(FrameEvent::Trying(Arc::clone(&pkg)));

            if let Some(outcome) = self.try_candidate(stack, idx, &pkg) {
                log::debug!("{}{} resolved to {} ({})", indent, atom, pkg, outcome);
                stack.frame_mut(idx).push_event(FrameEvent::Succeeded {
                    pkg: Some(Arc::clone(&pkg)),
                    outcome,
                });
                stack.pop_frame(true);
                return Ok(outcome);
            }
        }

        let events = stack.pop_frame(false).map(|f| f.events).unwrap_or_default();
        if self.config.drop_cycles && !drop_cycles {
            log::info!("{}{} failed, retrying with cycles dropped", indent, atom);
            return self.rec_add_atom(stack, atom, dbs, mode, true);
        }
        log::debug!("{}no candidate left for {}", indent, atom);
        Err(fail(FailureReason::Exhausted, events))
    }

    /// Process the current candidate of frame `idx`. On failure the state is
    /// back at the frame's start point and the choice point has moved on.
    fn try_candidate(&mut self, stack: &mut ResolverStack, idx: usize, pkg: &Arc<Package>) -> Option<Outcome> {
        let mut classes = Vec::with_capacity(3);
        if !pkg.built() || self.config.process_built_depends {
            classes.push(DepClass::Bdepend);
            classes.push(DepClass::Depend);
        }
        classes.push(DepClass::Rdepend);

        for class in classes {
            if !self.process_dependencies_and_blocks(stack, idx, pkg, class) {
                return None;
            }
        }

        match self.insert_choice(stack, idx, pkg) {
            Ok(Outcome::AlreadyPresent) => return Some(Outcome::AlreadyPresent),
            Ok(_) => {}
            Err(failure) => {
                self.reject(stack, idx, pkg, failure);
                stack.frame_mut(idx).choices.force_next();
                return None;
            }
        }

        if !self.process_dependencies_and_blocks(stack, idx, pkg, DepClass::Pdepend) {
            return None;
        }
        Some(Outcome::Inserted)
    }

    fn reject(&mut self, stack: &mut ResolverStack, idx: usize, pkg: &Arc<Package>, failure: ChoiceFailure) {
        let frame = stack.frame_mut(idx);
        log::debug!("{}rejected {}", "  ".repeat(frame.depth), pkg);
        frame.push_event(FrameEvent::ChoiceFailed {
            pkg: Arc::clone(pkg),
            failure,
        });
        let start_point = frame.start_point;
        self.state.backtrack(start_point);
    }

    fn process_dependencies_and_blocks(
        &mut self,
        stack: &mut ResolverStack,
        idx: usize,
        pkg: &Arc<Package>,
        class: DepClass,
    ) -> bool {
        let mode = DepMode::from(class);
        let frame = stack.frame_mut(idx);
        frame.processing = Some(mode);
        frame.push_event(FrameEvent::Mode(mode));
        let Ok(cnf) = frame.choices.depset(class).cloned() else {
            return false;
        };

        let blockers = match self.process_dependencies(stack, idx, mode, &cnf) {
            Ok(blockers) => blockers,
            Err(failure) => {
                self.reject(stack, idx, pkg, failure);
                return false;
            }
        };

        if let Err(failure) = self.insert_blockers(stack, idx, pkg, mode, blockers) {
            self.reject(stack, idx, pkg, failure);
            stack.frame_mut(idx).choices.force_next();
            return false;
        }
        true
    }

    /// Resolve each OR-group of `cnf`, returning the blockers to register.
    ///
    /// On failure the frame's choice point has already moved on.
    fn process_dependencies(
        &mut self,
        stack: &mut ResolverStack,
        idx: usize,
        mode: DepMode,
        cnf: &[Vec<Atom>],
    ) -> std::result::Result<Vec<Atom>, ChoiceFailure> {
        let mut blockers = Vec::new();
        let (dbs, drop_cycles) = {
            let frame = stack.frame(idx);
            (frame.dbs, frame.drop_cycles)
        };

        'groups: for group in cnf {
            let mut causes = Vec::new();
            for atom in group {
                if atom.blocks() {
                    blockers.push(atom.clone());
                    continue 'groups;
                }
                if stack.frame(idx).choices.solution_filters().contains(atom) {
                    continue;
                }

                let result = self.rec_add_atom(stack, atom, dbs, mode, drop_cycles);
                stack.frame_mut(idx).push_event(FrameEvent::Child {
                    atom: atom.clone(),
                    succeeded: result.is_ok(),
                });
                let trace = match result {
                    Ok(_) => continue 'groups,
                    Err(trace) => trace,
                };
                if drop_cycles && trace.reason.is_cycle() {
                    log::info!("{}dropping cyclic dependency {}", "  ".repeat(stack.frame(idx).depth), atom);
                    continue 'groups;
                }

                causes.push(*trace);
                let frame = stack.frame_mut(idx);
                frame.push_event(FrameEvent::Reduce(vec![atom.clone()]));
                if frame.choices.reduce_atoms([atom]) {
                    return Err(ChoiceFailure::Unsatisfied {
                        mode,
                        group: group.clone(),
                        causes,
                    });
                }
            }

            stack.frame_mut(idx).choices.force_next();
            return Err(ChoiceFailure::Unsatisfied {
                mode,
                group: group.clone(),
                causes,
            });
        }
        Ok(blockers)
    }

    fn insert_blockers(
        &mut self,
        stack: &mut ResolverStack,
        idx: usize,
        pkg: &Arc<Package>,
        mode: DepMode,
        blockers: Vec<Atom>,
    ) -> std::result::Result<(), ChoiceFailure> {
        let choice = stack.frame(idx).choices.id();
        for atom in blockers {
            if !pkg.repo().livefs() {
                self.ensure_livefs_loaded(&atom.unblocked());
            }
            let blocker = if atom.matches::<Package>(pkg) {
                Blocker::exempting(atom.clone(), Arc::clone(pkg))
            } else {
                Blocker::new(atom.clone())
            };

            let hits: Vec<Arc<Package>> = self
                .apply(Op::incref_block(choice, blocker.clone(), None))
                .into_iter()
                .filter_map(|conflict| match conflict {
                    SlotConflict::Occupant(hit) => Some(hit),
                    SlotConflict::Blocker(_) => None,
                })
                .collect();
            if hits.is_empty() {
                continue;
            }
            log::debug!(
                "{}{} blocks {} committed package(s)",
                "  ".repeat(stack.frame(idx).depth),
                atom,
                hits.len()
            );

            if atom.weak_blocker() && self.resolve_weak_blocker(stack, idx, mode, &blocker) {
                continue;
            }
            return Err(ChoiceFailure::Blocked {
                blocker: atom,
                hits: self.with_requesters(hits),
            });
        }
        Ok(())
    }

    /// Try to move the packages hit by a weak blocker to versions outside of
    /// it. Succeeds once the blocker no longer matches anything slotted.
    fn resolve_weak_blocker(
        &mut self,
        stack: &mut ResolverStack,
        idx: usize,
        mode: DepMode,
        blocker: &Blocker,
    ) -> bool {
        let complement = blocker.atom().complement();
        let drop_cycles = stack.frame(idx).drop_cycles;
        log::debug!("{}resolving {} away via {}", "  ".repeat(stack.frame(idx).depth), blocker, complement);
        if self
            .rec_add_atom(stack, &complement, DbScope::All, mode, drop_cycles)
            .is_err()
        {
            return false;
        }
        self.state
            .match_atom(&blocker.atom().unblocked())
            .iter()
            .all(|pkg| !blocker.matches(pkg))
    }

    fn insert_choice(
        &mut self,
        stack: &mut ResolverStack,
        idx: usize,
        pkg: &Arc<Package>,
    ) -> std::result::Result<Outcome, ChoiceFailure> {
        let atom = stack.frame(idx).atom.clone();
        let binding = ChoiceBinding::new(stack.frame(idx).choices.id(), atom.clone(), stack.requester(idx).cloned());

        if !pkg.repo().livefs() {
            self.ensure_livefs_loaded(&pkg.slotted_atom());
        }

        let mut conflicts = self.apply(Op::add(binding.clone(), Arc::clone(pkg)));
        if conflicts.is_empty() {
            return Ok(Outcome::Inserted);
        }

        if let [SlotConflict::Occupant(occupant)] = conflicts.as_slice() {
            let reinstall = occupant.cpv() == pkg.cpv() && occupant.slot() == pkg.slot();
            if occupant == pkg || ((occupant.is_virtual() || reinstall) && atom.matches::<Package>(occupant)) {
                return Ok(Outcome::AlreadyPresent);
            }
            if occupant.repo().livefs() && !pkg.repo().livefs() {
                log::debug!("{}replacing {} with {}", "  ".repeat(stack.frame(idx).depth), occupant, pkg);
                conflicts = self.apply(Op::replace(binding, Arc::clone(pkg)));
                if conflicts.is_empty() {
                    return Ok(Outcome::Inserted);
                }
            }
        }

        if !self.state.match_atom(&atom).is_empty() {
            return Ok(Outcome::AlreadyPresent);
        }

        let mut occupants = Vec::new();
        let mut blockers = Vec::new();
        for conflict in conflicts {
            match conflict {
                SlotConflict::Occupant(occupant) => occupants.push(occupant),
                SlotConflict::Blocker(blocker) => blockers.push(blocker),
            }
        }
        Err(ChoiceFailure::SlotConflict {
            occupants: self.with_requesters(occupants),
            blockers,
        })
    }

    fn with_requesters(&self, pkgs: Vec<Arc<Package>>) -> Vec<(Arc<Package>, Option<Atom>)> {
        pkgs.into_iter()
            .map(|pkg| {
                let requester = self.state.binding(&pkg).and_then(|b| b.requester.clone());
                (pkg, requester)
            })
            .collect()
    }

    /// Look for an ancestor of frame `idx` holding the same slot.
    ///
    /// `Ok(None)` lets resolution continue, `Ok(Some(_))` means the frame is
    /// satisfied without further work, and an error fails the frame.
    fn check_for_cycles(
        &mut self,
        stack: &mut ResolverStack,
        idx: usize,
    ) -> std::result::Result<Option<Outcome>, FailureReason> {
        let Some(&ancestor) = stack.slot_cycles(idx).first() else {
            return Ok(None);
        };
        if stack.pdepend_between(ancestor, idx) {
            return Ok(None);
        }

        let frame = stack.frame(ancestor);
        let Some(ancestor_pkg) = frame.choices.current_pkg().cloned() else {
            return Ok(None);
        };
        let ancestor_mode = frame.processing.unwrap_or(frame.mode);

        if stack.frame(idx).current_is_livefs() {
            if !ancestor_pkg.repo().livefs() {
                return Ok(None);
            }
            let atom = stack.frame(idx).atom.clone();
            self.apply(Op::backref(atom));
            return Ok(Some(Outcome::Cycle));
        }

        if !ancestor_mode.is_build_time() {
            return Err(FailureReason::UnbreakableCycle {
                ancestor: ancestor_pkg,
                mode: ancestor_mode,
                cause: None,
            });
        }

        let frame = stack.frame_mut(idx);
        frame.ignored = true;
        frame.push_event(FrameEvent::ForcedLivefs);
        let (atom, mode, drop_cycles) = (frame.atom.clone(), frame.mode, frame.drop_cycles);
        log::debug!(
            "{}{} cycles back to {}, limiting to installed packages",
            "  ".repeat(frame.depth),
            atom,
            ancestor_pkg
        );

        match self.rec_add_atom(stack, &atom, DbScope::Livefs, mode, drop_cycles) {
            Ok(_) => Ok(Some(Outcome::ForcedLivefs)),
            Err(cause) => Err(FailureReason::UnbreakableCycle {
                ancestor: ancestor_pkg,
                mode: ancestor_mode,
                cause: Some(cause),
            }),
        }
    }

    /// A blocker requested directly rather than through a package
    fn add_root_blocker(&mut self, atom: &Atom) -> Resolution {
        let mark = self.current_mark();
        self.ensure_livefs_loaded(&atom.unblocked());
        let choice = self.next_id();
        let hits: Vec<Arc<Package>> = self
            .apply(Op::incref_block(choice, Blocker::new(atom.clone()), None))
            .into_iter()
            .filter_map(|conflict| match conflict {
                SlotConflict::Occupant(hit) => Some(hit),
                SlotConflict::Blocker(_) => None,
            })
            .collect();
        if hits.is_empty() {
            return Ok(Outcome::Inserted);
        }
        self.state.backtrack(mark);
        Err(Box::new(FailureTrace {
            atom: atom.clone(),
            mode: DepMode::Root,
            requester: None,
            reason: FailureReason::Blocked(hits),
            events: Vec::new(),
        }))
    }
}

impl std::fmt::Debug for MergePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergePlan")
            .field("repos", &self.repos)
            .field("policy", &self.policy)
            .field("config", &self.config)
            .field("ops", &self.state.current_state())
            .field("insoluble", &self.insoluble.len())
            .finish()
    }
}
