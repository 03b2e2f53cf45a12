//! Resolver configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`MergePlan`](crate::MergePlan), loadable from TOML:
///
/// ```toml
/// drop-cycles = true
/// process-built-depends = false
/// preload-livefs = false
/// debug = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolverConfig {
    /// Retry a failed atom once while ignoring cyclic dependency failures
    pub drop_cycles: bool,
    /// Process build-time dependencies of already built packages
    pub process_built_depends: bool,
    /// Slot every installed package when the plan is created
    pub preload_livefs: bool,
    /// Assert that every retry of a choice observes a changed choice point
    pub debug: bool,
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drop_cycles(mut self, enabled: bool) -> Self {
        self.drop_cycles = enabled;
        self
    }

    pub fn process_built_depends(mut self, enabled: bool) -> Self {
        self.process_built_depends = enabled;
        self
    }

    pub fn preload_livefs(mut self, enabled: bool) -> Self {
        self.preload_livefs = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
