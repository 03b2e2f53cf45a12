//! Version operators for atoms

use std::fmt;

use crate::error::AtomError;
use crate::version::Version;

/// Comparison operators accepted in front of a versioned atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Less than (<)
    Less,
    /// Less than or equal (<=)
    LessOrEqual,
    /// Equal (=)
    Equal,
    /// Version prefix match (=...*)
    EqualGlob,
    /// Equal ignoring revision (~)
    Approximate,
    /// Greater than or equal (>=)
    GreaterOrEqual,
    /// Greater than (>)
    Greater,
}

impl Operator {
    /// Split a leading operator off an atom body.
    ///
    /// The glob form is reported as [`Operator::Equal`]; the caller upgrades
    /// it once the trailing `*` has been seen.
    pub fn split_prefix(s: &str) -> (Option<Self>, &str) {
        for (prefix, op) in [
            ("<=", Operator::LessOrEqual),
            (">=", Operator::GreaterOrEqual),
            ("<", Operator::Less),
            (">", Operator::Greater),
            ("=", Operator::Equal),
            ("~", Operator::Approximate),
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return (Some(op), rest);
            }
        }
        (None, s)
    }

    /// Parse an operator from its textual form
    pub fn from_str(s: &str) -> Result<Self, AtomError> {
        match Self::split_prefix(s) {
            (Some(op), "") => Ok(op),
            _ => Err(AtomError::InvalidOperator(s.to_string())),
        }
    }

    /// Get the string representation of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal | Operator::EqualGlob => "=",
            Operator::Approximate => "~",
            Operator::GreaterOrEqual => ">=",
            Operator::Greater => ">",
        }
    }

    /// Check `candidate <op> pattern`
    pub fn matches(&self, candidate: &Version, pattern: &Version) -> bool {
        match self {
            Operator::Less => candidate < pattern,
            Operator::LessOrEqual => candidate <= pattern,
            Operator::Equal => candidate == pattern,
            Operator::EqualGlob => candidate.glob_matches(pattern),
            Operator::Approximate => candidate.cmp_base(pattern).is_eq(),
            Operator::GreaterOrEqual => candidate >= pattern,
            Operator::Greater => candidate > pattern,
        }
    }

    pub(crate) fn is_lower_bound(&self) -> bool {
        matches!(self, Operator::Greater | Operator::GreaterOrEqual)
    }

    pub(crate) fn is_upper_bound(&self) -> bool {
        matches!(self, Operator::Less | Operator::LessOrEqual)
    }

    pub(crate) fn is_inclusive(&self) -> bool {
        !matches!(self, Operator::Less | Operator::Greater)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
