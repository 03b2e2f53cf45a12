//! Memoizing wrapper used by the resolver

use std::collections::HashMap;
use std::sync::Arc;

use ebuild_atom::Atom;

use super::Repository;
use crate::package::{Package, RepoId};

/// Wraps a repository and caches `itermatch` results per atom until
/// [`clear`](Self::clear) is called.
pub struct CachingRepository {
    inner: Box<dyn Repository>,
    cache: HashMap<Atom, Vec<Arc<Package>>>,
}

impl CachingRepository {
    pub fn new(inner: Box<dyn Repository>) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    pub fn info(&self) -> &RepoId {
        self.inner.info()
    }

    pub fn livefs(&self) -> bool {
        self.inner.livefs()
    }

    pub fn itermatch(&mut self, atom: &Atom) -> &[Arc<Package>] {
        let inner = &self.inner;
        self.cache
            .entry(atom.clone())
            .or_insert_with(|| inner.itermatch(atom).collect())
    }

    pub fn packages(&self) -> impl Iterator<Item = Arc<Package>> + '_ {
        self.inner.packages()
    }

    pub fn cached_atoms(&self) -> usize {
        self.cache.len()
    }

    /// Drop every memoized match list
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for CachingRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingRepository")
            .field("repo", self.inner.info())
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    #[test]
    fn test_cache_and_clear() {
        let mut repo = MemoryRepository::new("gentoo", false);
        repo.add(Package::builder("dev-libs/foo-1")).unwrap();
        let mut cached = CachingRepository::new(Box::new(repo));

        let atom = Atom::parse("dev-libs/foo").unwrap();
        assert_eq!(cached.itermatch(&atom).len(), 1);
        assert_eq!(cached.itermatch(&atom).len(), 1);
        assert_eq!(cached.cached_atoms(), 1);

        cached.clear();
        assert_eq!(cached.cached_atoms(), 0);
        assert!(!cached.livefs());
    }
}
