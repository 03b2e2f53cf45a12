//! Dependency resolution for Gentoo-style package managers.
//!
//! Given requested atoms, the installed package database and any number of
//! candidate repositories, [`MergePlan`] searches depth-first for a set of
//! packages satisfying every dependency, blocker and slot constraint, and
//! yields the ordered install/replace/remove operations that reach it.

pub mod config;
pub mod error;
pub mod package;
pub mod repository;
pub mod resolver;

pub use config::ResolverConfig;
pub use error::{ResolverError, Result};
pub use package::{DepClass, Package, PackageBuilder, RepoId};
pub use repository::{CachingRepository, MemoryRepository, Repository};
pub use resolver::{DepMode, FailureReason, FailureTrace, MergePlan, Operation, Policy, ResolveFailure};
