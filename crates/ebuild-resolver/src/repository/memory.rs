//! In-memory repository, optionally loaded from a JSON document

use std::path::Path;
use std::sync::Arc;

use ebuild_atom::Atom;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::Repository;
use crate::error::Result;
use crate::package::{DepClass, Package, PackageBuilder, RepoId};

/// Serialized form of a repository:
///
/// ```json
/// {
///     "name": "gentoo",
///     "livefs": false,
///     "packages": [
///         { "cpv": "dev-libs/foo-1.0", "slot": "0", "rdepend": "dev-libs/bar" }
///     ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryDocument {
    pub name: String,
    #[serde(default)]
    pub livefs: bool,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
}

/// A single package in a [`RepositoryDocument`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageEntry {
    pub cpv: String,
    pub slot: Option<String>,
    pub subslot: Option<String>,
    pub built: Option<bool>,
    pub bdepend: String,
    pub depend: String,
    pub rdepend: String,
    pub pdepend: String,
}

impl PackageEntry {
    fn into_builder(self) -> PackageBuilder {
        let mut builder = Package::builder(&self.cpv)
            .depends_on(DepClass::Bdepend, &self.bdepend)
            .depends_on(DepClass::Depend, &self.depend)
            .depends_on(DepClass::Rdepend, &self.rdepend)
            .depends_on(DepClass::Pdepend, &self.pdepend);
        if let Some(slot) = &self.slot {
            builder = builder.slot(slot);
        }
        if let Some(subslot) = &self.subslot {
            builder = builder.subslot(subslot);
        }
        if let Some(built) = self.built {
            builder = builder.built(built);
        }
        builder
    }
}

/// Repository holding its packages in memory, grouped by key in insertion
/// order.
#[derive(Debug)]
pub struct MemoryRepository {
    info: RepoId,
    packages: IndexMap<String, Vec<Arc<Package>>>,
}

impl MemoryRepository {
    pub fn new(name: &str, livefs: bool) -> Self {
        Self {
            info: RepoId::new(name, livefs),
            packages: IndexMap::new(),
        }
    }

    /// Build a package into this repository
    pub fn add(&mut self, builder: PackageBuilder) -> Result<Arc<Package>> {
        let pkg = Arc::new(builder.repo(self.info.clone()).build()?);
        self.packages
            .entry(pkg.key().to_string())
            .or_default()
            .push(Arc::clone(&pkg));
        Ok(pkg)
    }

    pub fn from_document(doc: RepositoryDocument) -> Result<Self> {
        let mut repo = Self::new(&doc.name, doc.livefs);
        for entry in doc.packages {
            repo.add(entry.into_builder())?;
        }
        log::debug!("Loaded {} packages into repository {}", repo.len(), doc.name);
        Ok(repo)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let doc: RepositoryDocument = serde_json::from_str(content)?;
        Self::from_document(doc)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl Repository for MemoryRepository {
    fn info(&self) -> &RepoId {
        &self.info
    }

    fn itermatch<'a>(&'a self, atom: &'a Atom) -> Box<dyn Iterator<Item = Arc<Package>> + 'a> {
        match self.packages.get(atom.key()) {
            Some(pkgs) => Box::new(pkgs.iter().filter(move |p| atom.matches::<Package>(p)).cloned()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn packages<'a>(&'a self) -> Box<dyn Iterator<Item = Arc<Package>> + 'a> {
        Box::new(self.packages.values().flatten().cloned())
    }
}
