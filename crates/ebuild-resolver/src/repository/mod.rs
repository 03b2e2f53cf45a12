//! Package repositories

mod caching;
mod memory;

pub use caching::CachingRepository;
pub use memory::{MemoryRepository, PackageEntry, RepositoryDocument};

use std::sync::Arc;

use ebuild_atom::Atom;

use crate::package::{Package, RepoId};

/// A source of candidate packages.
///
/// `itermatch` may yield matches in any order; the resolver applies its own
/// ordering on top.
pub trait Repository {
    fn info(&self) -> &RepoId;

    /// Packages matching `atom`
    fn itermatch<'a>(&'a self, atom: &'a Atom) -> Box<dyn Iterator<Item = Arc<Package>> + 'a>;

    /// Every package in the repository
    fn packages<'a>(&'a self) -> Box<dyn Iterator<Item = Arc<Package>> + 'a>;

    fn livefs(&self) -> bool {
        self.info().livefs()
    }
}
