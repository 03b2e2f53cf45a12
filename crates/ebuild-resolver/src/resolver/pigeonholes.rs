use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ebuild_atom::Atom;

use crate::error::{ResolverError, Result};
use crate::package::Package;

/// A blocking restriction registered against a package key.
///
/// A blocker introduced by a package never blocks that package itself; the
/// introducing package is recorded as exempt when the blocker would match it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Blocker {
    atom: Atom,
    exempt: Option<Arc<Package>>,
}

impl Blocker {
    pub fn new(atom: Atom) -> Self {
        Self { atom, exempt: None }
    }

    pub fn exempting(atom: Atom, pkg: Arc<Package>) -> Self {
        Self {
            atom,
            exempt: Some(pkg),
        }
    }

    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    pub fn matches(&self, pkg: &Package) -> bool {
        self.atom.matches(pkg) && self.exempt.as_deref() != Some(pkg)
    }
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exempt {
            Some(pkg) => write!(f, "{} (except {})", self.atom, pkg),
            None => write!(f, "{}", self.atom),
        }
    }
}

/// Something standing in the way of slotting a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotConflict {
    /// The slot is already held by this package
    Occupant(Arc<Package>),
    /// A registered blocker matches the package
    Blocker(Blocker),
}

/// Slot occupancy and blocker registry.
///
/// Holds at most one package per `(key, slot)` pair, plus the blockers
/// registered for each key. It does no undo bookkeeping of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PigeonholedSlots {
    slots: HashMap<String, BTreeMap<String, Arc<Package>>>,
    limiters: HashMap<String, HashSet<Blocker>>,
}

impl PigeonholedSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to slot `pkg`.
    ///
    /// Returns the occupant of its slot and every blocker matching it. The
    /// package is inserted only when nothing is returned. `force` ignores
    /// blockers, but an occupied slot is never overwritten.
    pub fn fill_slotting(&mut self, pkg: &Arc<Package>, force: bool) -> Vec<SlotConflict> {
        let mut conflicts: Vec<SlotConflict> = Vec::new();
        if !force {
            conflicts.extend(self.check_limiters(pkg).into_iter().map(SlotConflict::Blocker));
        }
        if let Some(occupant) = self.get_conflicting_slot(pkg) {
            conflicts.push(SlotConflict::Occupant(Arc::clone(occupant)));
        }
        if conflicts.is_empty() {
            self.slots
                .entry(pkg.key().to_string())
                .or_default()
                .insert(pkg.slot().to_string(), Arc::clone(pkg));
        }
        conflicts
    }

    pub fn remove_slotting(&mut self, pkg: &Package) -> Result<()> {
        let unknown = || ResolverError::UnknownSlotting(pkg.to_string());
        let bucket = self.slots.get_mut(pkg.key()).ok_or_else(unknown)?;
        match bucket.get(pkg.slot()) {
            Some(occupant) if occupant.as_ref() == pkg => {}
            _ => return Err(unknown()),
        }
        bucket.remove(pkg.slot());
        if bucket.is_empty() {
            self.slots.remove(pkg.key());
        }
        Ok(())
    }

    /// Register `blocker` under `key` (its atom's key by default), returning
    /// the slotted packages it matches.
    pub fn add_limiter(&mut self, blocker: Blocker, key: Option<&str>) -> Vec<Arc<Package>> {
        let key = key.unwrap_or(blocker.atom.key()).to_string();
        let hits = self.find_blocker_matches(&blocker, &key);
        self.limiters.entry(key).or_default().insert(blocker);
        hits
    }

    pub fn remove_limiter(&mut self, blocker: &Blocker, key: Option<&str>) -> Result<()> {
        let key = key.unwrap_or(blocker.atom.key());
        let registered = self
            .limiters
            .get_mut(key)
            .map(|set| set.remove(blocker))
            .unwrap_or(false);
        if !registered {
            return Err(ResolverError::UnknownLimiter(blocker.to_string()));
        }
        if self.limiters.get(key).is_some_and(HashSet::is_empty) {
            self.limiters.remove(key);
        }
        Ok(())
    }

    /// The package holding `pkg`'s slot, if any
    pub fn get_conflicting_slot(&self, pkg: &Package) -> Option<&Arc<Package>> {
        self.slots.get(pkg.key())?.get(pkg.slot())
    }

    /// Slotted packages matching `atom`, looked up under `key` when given
    pub fn find_atom_matches(&self, atom: &Atom, key: Option<&str>) -> Vec<Arc<Package>> {
        let key = key.unwrap_or(atom.key());
        self.slots
            .get(key)
            .map(|bucket| {
                bucket
                    .values()
                    .filter(|pkg| atom.matches::<Package>(pkg))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find_blocker_matches(&self, blocker: &Blocker, key: &str) -> Vec<Arc<Package>> {
        self.slots
            .get(key)
            .map(|bucket| bucket.values().filter(|pkg| blocker.matches(pkg)).cloned().collect())
            .unwrap_or_default()
    }

    /// Registered blockers matching `pkg`, in a stable order
    pub fn check_limiters(&self, pkg: &Package) -> Vec<Blocker> {
        let mut hits: Vec<Blocker> = self
            .limiters
            .get(pkg.key())
            .map(|set| set.iter().filter(|b| b.matches(pkg)).cloned().collect())
            .unwrap_or_default();
        hits.sort_by_cached_key(|b| b.to_string());
        hits
    }

    /// Every slotted package
    pub fn occupants(&self) -> impl Iterator<Item = &Arc<Package>> + '_ {
        self.slots.values().flat_map(|bucket| bucket.values())
    }

    pub fn limiter_count(&self) -> usize {
        self.limiters.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.limiters.is_empty()
    }
}
