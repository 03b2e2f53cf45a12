//! Package model consumed by the resolver

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ebuild_atom::{Atom, Cpv, DepSet, Matchable, Version};

use crate::error::{ResolverError, Result};

/// Identity of the repository a package came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    name: Arc<str>,
    livefs: bool,
}

impl RepoId {
    pub fn new(name: &str, livefs: bool) -> Self {
        Self {
            name: Arc::from(name),
            livefs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the repository describes installed packages
    pub fn livefs(&self) -> bool {
        self.livefs
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The four dependency classes of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepClass {
    /// Build-time dependencies for the host
    Bdepend,
    /// Build-time dependencies for the target
    Depend,
    /// Run-time dependencies
    Rdepend,
    /// Post-merge dependencies
    Pdepend,
}

impl DepClass {
    pub const ALL: [DepClass; 4] = [
        DepClass::Bdepend,
        DepClass::Depend,
        DepClass::Rdepend,
        DepClass::Pdepend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DepClass::Bdepend => "bdepend",
            DepClass::Depend => "depend",
            DepClass::Rdepend => "rdepend",
            DepClass::Pdepend => "pdepend",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DepClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable candidate package.
///
/// Two packages are the same package when they share cpv, slot and
/// repository; the same cpv from the installed database and from a source
/// repository are distinct.
#[derive(Debug, Clone)]
pub struct Package {
    cpv: String,
    key: String,
    version: Version,
    slot: String,
    subslot: String,
    repo: RepoId,
    built: bool,
    depends: [DepSet; 4],
}

impl Package {
    pub fn builder(cpv: &str) -> PackageBuilder {
        PackageBuilder::new(cpv)
    }

    pub fn cpv(&self) -> &str {
        &self.cpv
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn subslot(&self) -> &str {
        &self.subslot
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn built(&self) -> bool {
        self.built
    }

    pub fn is_virtual(&self) -> bool {
        self.key.starts_with("virtual/")
    }

    pub fn depset(&self, class: DepClass) -> &DepSet {
        &self.depends[class.index()]
    }

    pub fn bdepend(&self) -> &DepSet {
        self.depset(DepClass::Bdepend)
    }

    pub fn depend(&self) -> &DepSet {
        self.depset(DepClass::Depend)
    }

    pub fn rdepend(&self) -> &DepSet {
        self.depset(DepClass::Rdepend)
    }

    pub fn pdepend(&self) -> &DepSet {
        self.depset(DepClass::Pdepend)
    }

    /// `key:slot` restriction selecting whatever occupies this package's slot
    pub fn slotted_atom(&self) -> Atom {
        Atom::slotted(&self.key, &self.slot)
    }
}

impl Matchable for Package {
    fn key(&self) -> &str {
        &self.key
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn slot(&self) -> &str {
        &self.slot
    }

    fn subslot(&self) -> &str {
        &self.subslot
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.cpv == other.cpv && self.slot == other.slot && self.repo.name == other.repo.name
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cpv.hash(state);
        self.slot.hash(state);
        self.repo.name.hash(state);
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}::{}", self.cpv, self.slot, self.repo)
    }
}

/// Builder for [`Package`]
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    cpv: String,
    slot: String,
    subslot: Option<String>,
    repo: Option<RepoId>,
    built: Option<bool>,
    depends: [String; 4],
}

impl PackageBuilder {
    pub fn new(cpv: &str) -> Self {
        Self {
            cpv: cpv.to_string(),
            slot: "0".to_string(),
            subslot: None,
            repo: None,
            built: None,
            depends: Default::default(),
        }
    }

    pub fn slot(mut self, slot: &str) -> Self {
        self.slot = slot.to_string();
        self
    }

    pub fn subslot(mut self, subslot: &str) -> Self {
        self.subslot = Some(subslot.to_string());
        self
    }

    pub fn repo(mut self, repo: RepoId) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Mark the package as a binary (or installed) package. Defaults to the
    /// repository's livefs flag.
    pub fn built(mut self, built: bool) -> Self {
        self.built = Some(built);
        self
    }

    pub fn depends_on(mut self, class: DepClass, deps: &str) -> Self {
        self.depends[class.index()] = deps.to_string();
        self
    }

    pub fn bdepend(self, deps: &str) -> Self {
        self.depends_on(DepClass::Bdepend, deps)
    }

    pub fn depend(self, deps: &str) -> Self {
        self.depends_on(DepClass::Depend, deps)
    }

    pub fn rdepend(self, deps: &str) -> Self {
        self.depends_on(DepClass::Rdepend, deps)
    }

    pub fn pdepend(self, deps: &str) -> Self {
        self.depends_on(DepClass::Pdepend, deps)
    }

    pub fn build(self) -> Result<Package> {
        let (key, version) = Cpv::parse(&self.cpv)?.into_parts();

        if self.slot.is_empty() || self.slot.contains('/') {
            return Err(ResolverError::InvalidPackage {
                cpv: self.cpv,
                reason: format!("invalid slot \"{}\"", self.slot),
            });
        }

        let repo = self.repo.unwrap_or_else(|| RepoId::new("unknown", false));
        let built = self.built.unwrap_or(repo.livefs());
        let subslot = self.subslot.unwrap_or_else(|| self.slot.clone());

        let [bdepend, depend, rdepend, pdepend] = self.depends;
        let depends = [
            DepSet::parse(&bdepend)?,
            DepSet::parse(&depend)?,
            DepSet::parse(&rdepend)?,
            DepSet::parse(&pdepend)?,
        ];

        Ok(Package {
            cpv: self.cpv,
            key,
            version,
            slot: self.slot,
            subslot,
            repo,
            built,
            depends,
        })
    }
}
