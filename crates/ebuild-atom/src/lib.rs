//! Gentoo-style package atoms
//!
//! This crate provides version parsing and comparison following the package
//! manager specification, atom parsing and matching, and dependency string
//! parsing with conversion to conjunctive normal form.

mod atom;
mod cpv;
mod depset;
mod error;
mod operator;
mod version;

pub use atom::{Atom, Matchable};
pub use cpv::Cpv;
pub use depset::{Cnf, DepNode, DepSet};
pub use error::AtomError;
pub use operator::Operator;
pub use version::{Suffix, Version};
