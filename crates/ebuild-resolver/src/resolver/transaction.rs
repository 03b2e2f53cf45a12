use std::fmt;
use std::sync::Arc;

use crate::package::Package;

/// A single merge operation produced by a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Install a package into a free slot
    Install(Arc<Package>),
    /// Replace the installed occupant of a slot
    Replace {
        old: Arc<Package>,
        new: Arc<Package>,
    },
    /// Remove an installed package
    Remove(Arc<Package>),
}

impl Operation {
    /// The package that ends up installed, if any
    pub fn target(&self) -> Option<&Arc<Package>> {
        match self {
            Operation::Install(pkg) => Some(pkg),
            Operation::Replace { new, .. } => Some(new),
            Operation::Remove(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Install(_) => "install",
            Operation::Replace { .. } => "replace",
            Operation::Remove(_) => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install(pkg) => write!(f, "install {}", pkg),
            Operation::Replace { old, new } => write!(f, "replace {} with {}", old, new),
            Operation::Remove(pkg) => write!(f, "remove {}", pkg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::RepoId;

    #[test]
    fn test_display() {
        let old = Arc::new(
            Package::builder("dev-libs/a-1")
                .repo(RepoId::new("vdb", true))
                .build()
                .unwrap(),
        );
        let new = Arc::new(
            Package::builder("dev-libs/a-2")
                .repo(RepoId::new("gentoo", false))
                .build()
                .unwrap(),
        );
        let op = Operation::Replace {
            old: old.clone(),
            new: new.clone(),
        };
        assert_eq!(op.to_string(), "replace dev-libs/a-1:0::vdb with dev-libs/a-2:0::gentoo");
        assert_eq!(op.target(), Some(&new));
        assert_eq!(Operation::Remove(old).target(), None);
        assert_eq!(Operation::Install(new).kind(), "install");
    }
}
