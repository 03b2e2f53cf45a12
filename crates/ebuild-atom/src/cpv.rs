//! Category/package-version identifiers

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AtomError;
use crate::version::Version;

lazy_static! {
    // Package names may contain hyphens, so the name is matched lazily and
    // the remainder must form a complete version.
    pub(crate) static ref CPV_RE: Regex = Regex::new(
        r"^([A-Za-z0-9_][A-Za-z0-9+_.-]*)/([A-Za-z0-9_][A-Za-z0-9+_-]*?)-(\d+(?:\.\d+)*[a-z]?(?:_(?:alpha|beta|pre|rc|p)\d*)*(?:-r\d+)?)$"
    ).unwrap();

    pub(crate) static ref KEY_RE: Regex = Regex::new(
        r"^[A-Za-z0-9_][A-Za-z0-9+_.-]*/[A-Za-z0-9_][A-Za-z0-9+_-]*$"
    ).unwrap();
}

/// A fully versioned package name such as `dev-libs/openssl-3.0.13-r1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpv {
    category: String,
    package: String,
    version: Version,
}

impl Cpv {
    pub fn parse(input: &str) -> Result<Self, AtomError> {
        let caps = CPV_RE
            .captures(input)
            .ok_or_else(|| AtomError::InvalidCpv(input.to_string()))?;

        Ok(Self {
            category: caps[1].to_string(),
            package: caps[2].to_string(),
            version: Version::parse(&caps[3])?,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The unversioned `category/package` key
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.package)
    }

    pub fn into_parts(self) -> (String, Version) {
        let key = self.key();
        (key, self.version)
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.category, self.package, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hyphenated_name() {
        let cpv = Cpv::parse("dev-perl/Module-Build-Tiny-0.47-r2").unwrap();
        assert_eq!(cpv.category(), "dev-perl");
        assert_eq!(cpv.package(), "Module-Build-Tiny");
        assert_eq!(cpv.version().as_str(), "0.47-r2");
        assert_eq!(cpv.key(), "dev-perl/Module-Build-Tiny");
    }

    #[test]
    fn test_parse_rejects_unversioned() {
        assert!(Cpv::parse("dev-libs/openssl").is_err());
        assert!(Cpv::parse("openssl-1.0").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let cpv = Cpv::parse("sys-apps/portage-3.0.63").unwrap();
        assert_eq!(cpv.to_string(), "sys-apps/portage-3.0.63");
    }
}
