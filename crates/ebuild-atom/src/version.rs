//! Version parsing and comparison

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AtomError;

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(
        r"^(\d+(?:\.\d+)*)([a-z]?)((?:_(?:alpha|beta|pre|rc|p)\d*)*)(?:-r(\d+))?$"
    ).unwrap();

    static ref SUFFIX_RE: Regex = Regex::new(r"_(alpha|beta|pre|rc|p)(\d*)").unwrap();
}

/// Version suffixes, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

impl Suffix {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "alpha" => Some(Suffix::Alpha),
            "beta" => Some(Suffix::Beta),
            "pre" => Some(Suffix::Pre),
            "rc" => Some(Suffix::Rc),
            "p" => Some(Suffix::P),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Suffix::Alpha => "alpha",
            Suffix::Beta => "beta",
            Suffix::Pre => "pre",
            Suffix::Rc => "rc",
            Suffix::P => "p",
        }
    }
}

/// A parsed package version such as `1.2.3b_rc1-r2`.
///
/// Equality and ordering follow the version comparison algorithm of the
/// package manager specification, so `1.0` compares equal to `1.00` and
/// `1.0-r0` compares equal to `1.0`.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    numbers: Vec<String>,
    letter: Option<char>,
    suffixes: Vec<(Suffix, String)>,
    revision: String,
}

impl Version {
    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self, AtomError> {
        let caps = VERSION_RE
            .captures(input)
            .ok_or_else(|| AtomError::InvalidVersion(input.to_string()))?;

        let numbers = caps[1].split('.').map(str::to_string).collect();
        let letter = caps.get(2).and_then(|m| m.as_str().chars().next());
        let suffixes = caps
            .get(3)
            .map(|m| {
                SUFFIX_RE
                    .captures_iter(m.as_str())
                    .filter_map(|c| Some((Suffix::from_str(&c[1])?, c[2].to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let revision = caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default();

        Ok(Self {
            raw: input.to_string(),
            numbers,
            letter,
            suffixes,
            revision,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Revision number, zero when absent
    pub fn revision(&self) -> u64 {
        self.revision.parse().unwrap_or(0)
    }

    /// Compare two versions while ignoring their revisions
    pub fn cmp_base(&self, other: &Version) -> Ordering {
        self.compare(other, false)
    }

    /// Whether this version starts with `prefix`, matching whole components only.
    ///
    /// `1.2.3` and `1.2` both match the prefix `1.2`, `1.20` does not.
    pub fn glob_matches(&self, prefix: &Version) -> bool {
        let Some(rest) = self.raw.strip_prefix(prefix.as_str()) else {
            return false;
        };
        let ends_in_digit = prefix.raw.ends_with(|c: char| c.is_ascii_digit());
        !(ends_in_digit && rest.starts_with(|c: char| c.is_ascii_digit()))
    }

    fn compare(&self, other: &Version, with_revision: bool) -> Ordering {
        let ord = cmp_numeric(&self.numbers[0], &other.numbers[0]);
        if ord != Ordering::Equal {
            return ord;
        }

        for (a, b) in self.numbers[1..].iter().zip(&other.numbers[1..]) {
            let ord = if a.starts_with('0') || b.starts_with('0') {
                a.trim_end_matches('0').cmp(b.trim_end_matches('0'))
            } else {
                cmp_numeric(a, b)
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        let ord = self.numbers.len().cmp(&other.numbers.len());
        if ord != Ordering::Equal {
            return ord;
        }

        let ord = self.letter.cmp(&other.letter);
        if ord != Ordering::Equal {
            return ord;
        }

        for ((sa, na), (sb, nb)) in self.suffixes.iter().zip(&other.suffixes) {
            let ord = sa.cmp(sb).then_with(|| cmp_numeric(na, nb));
            if ord != Ordering::Equal {
                return ord;
            }
        }

        // A trailing extra suffix only makes a version newer when it is `_p`.
        let common = self.suffixes.len().min(other.suffixes.len());
        if let Some((suffix, _)) = self.suffixes.get(common) {
            return if *suffix == Suffix::P { Ordering::Greater } else { Ordering::Less };
        }
        if let Some((suffix, _)) = other.suffixes.get(common) {
            return if *suffix == Suffix::P { Ordering::Less } else { Ordering::Greater };
        }

        if with_revision {
            cmp_numeric(&self.revision, &other.revision)
        } else {
            Ordering::Equal
        }
    }
}

/// Compare two digit strings as arbitrary-size integers
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other, true) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other, true)
    }
}

impl FromStr for Version {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
