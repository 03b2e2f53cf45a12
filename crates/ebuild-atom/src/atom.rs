//! Package atoms: restrictions over category/package, version and slot

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::cpv::{CPV_RE, KEY_RE};
use crate::error::AtomError;
use crate::operator::Operator;
use crate::version::Version;

lazy_static! {
    static ref SLOT_RE: Regex = Regex::new(
        r"^([A-Za-z0-9_][A-Za-z0-9+_.-]*)?(?:/([A-Za-z0-9_][A-Za-z0-9+_.-]*))?([=*])?$"
    ).unwrap();
}

/// What an atom needs to know about a package in order to match it
pub trait Matchable {
    fn key(&self) -> &str;
    fn version(&self) -> &Version;
    fn slot(&self) -> &str;
    fn subslot(&self) -> &str;
}

/// Blocker strength of an atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlockKind {
    None,
    /// `!atom`, may be resolved by moving to a version outside the block
    Weak,
    /// `!!atom`
    Strong,
}

/// A parsed atom such as `>=dev-libs/openssl-3:0/3`, `!<sys-apps/foo-2` or
/// `dev-lang/python:3.12`.
///
/// Atoms compare and hash by their canonical text, so two atoms spelled the
/// same way are interchangeable as set members.
#[derive(Debug, Clone)]
pub struct Atom {
    repr: String,
    key: String,
    op: Option<Operator>,
    version: Option<Version>,
    slot: Option<String>,
    subslot: Option<String>,
    block: BlockKind,
    negated: bool,
}

impl Atom {
    /// Parse an atom string
    pub fn parse(input: &str) -> Result<Self, AtomError> {
        let (block, body) = if let Some(rest) = input.strip_prefix("!!") {
            (BlockKind::Strong, rest)
        } else if let Some(rest) = input.strip_prefix('!') {
            (BlockKind::Weak, rest)
        } else {
            (BlockKind::None, input)
        };

        if body.contains("::") {
            return Err(AtomError::invalid_atom(input, "repository dependencies are not supported"));
        }

        let (body, slot_part) = match body.split_once(':') {
            Some((b, s)) => (b, Some(s)),
            None => (body, None),
        };

        let (slot, subslot) = match slot_part {
            Some(part) => {
                let caps = SLOT_RE
                    .captures(part)
                    .ok_or_else(|| AtomError::invalid_atom(input, "malformed slot"))?;
                let slot = caps.get(1).map(|m| m.as_str().to_string());
                let subslot = caps.get(2).map(|m| m.as_str().to_string());
                if slot.is_none() && (subslot.is_some() || caps.get(3).is_none()) {
                    return Err(AtomError::invalid_atom(input, "empty slot"));
                }
                (slot, subslot)
            }
            None => (None, None),
        };

        let (op, rest) = Operator::split_prefix(body);
        let (key, op, version) = match op {
            Some(mut op) => {
                let rest = match rest.strip_suffix('*') {
                    Some(stripped) if op == Operator::Equal => {
                        op = Operator::EqualGlob;
                        stripped
                    }
                    Some(_) => {
                        return Err(AtomError::invalid_atom(input, "'*' is only valid with '='"));
                    }
                    None => rest,
                };
                let caps = CPV_RE
                    .captures(rest)
                    .ok_or_else(|| AtomError::invalid_atom(input, "operator requires a version"))?;
                let key = format!("{}/{}", &caps[1], &caps[2]);
                (key, Some(op), Some(Version::parse(&caps[3])?))
            }
            None => {
                if rest.ends_with('*') {
                    return Err(AtomError::invalid_atom(input, "'*' requires the '=' operator"));
                }
                if CPV_RE.is_match(rest) {
                    return Err(AtomError::MissingOperator(input.to_string()));
                }
                if !KEY_RE.is_match(rest) {
                    return Err(AtomError::invalid_atom(input, "expected category/package"));
                }
                (rest.to_string(), None, None)
            }
        };

        let mut atom = Self {
            repr: String::new(),
            key,
            op,
            version,
            slot,
            subslot,
            block,
            negated: false,
        };
        atom.repr = atom.render();
        Ok(atom)
    }

    /// A non-blocking `key:slot` restriction
    pub fn slotted(key: &str, slot: &str) -> Self {
        let mut atom = Self::unversioned(key);
        atom.slot = Some(slot.to_string());
        atom.repr = atom.render();
        atom
    }

    /// A plain `category/package` restriction for an already validated key
    fn unversioned(key: &str) -> Self {
        Self {
            repr: key.to_string(),
            key: key.to_string(),
            op: None,
            version: None,
            slot: None,
            subslot: None,
            block: BlockKind::None,
            negated: false,
        }
    }

    /// The non-blocking restriction matching every package of this atom's
    /// key that this atom does not match.
    ///
    /// For a weak blocker this describes "a version that is not blocked".
    pub fn complement(&self) -> Self {
        let mut inner = self.clone();
        inner.block = BlockKind::None;
        inner.negated = false;
        inner.repr = inner.render();

        Self {
            repr: format!("{} !({})", self.key, inner.repr),
            negated: !self.negated,
            block: BlockKind::None,
            ..inner
        }
    }

    /// Same restriction without the blocker marker
    pub fn unblocked(&self) -> Self {
        let mut atom = self.clone();
        atom.block = BlockKind::None;
        atom.repr = atom.render();
        atom
    }

    fn render(&self) -> String {
        let mut out = String::new();
        match self.block {
            BlockKind::None => {}
            BlockKind::Weak => out.push('!'),
            BlockKind::Strong => out.push_str("!!"),
        }
        if let Some(op) = self.op {
            out.push_str(op.as_str());
        }
        out.push_str(&self.key);
        if let Some(version) = &self.version {
            out.push('-');
            out.push_str(version.as_str());
        }
        if self.op == Some(Operator::EqualGlob) {
            out.push('*');
        }
        if let Some(slot) = &self.slot {
            out.push(':');
            out.push_str(slot);
        }
        if let Some(subslot) = &self.subslot {
            out.push('/');
            out.push_str(subslot);
        }
        out
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn op(&self) -> Option<Operator> {
        self.op
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    pub fn subslot(&self) -> Option<&str> {
        self.subslot.as_deref()
    }

    /// Whether this atom is a blocker of either strength
    pub fn blocks(&self) -> bool {
        self.block != BlockKind::None
    }

    pub fn weak_blocker(&self) -> bool {
        self.block == BlockKind::Weak
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Whether `target` satisfies this restriction.
    ///
    /// The blocker marker does not change what an atom matches: a blocker
    /// matches exactly the packages it blocks.
    pub fn matches<M: Matchable + ?Sized>(&self, target: &M) -> bool {
        if target.key() != self.key {
            return false;
        }
        self.restriction_matches(target) != self.negated
    }

    fn restriction_matches<M: Matchable + ?Sized>(&self, target: &M) -> bool {
        if let Some(slot) = &self.slot {
            if slot != target.slot() {
                return false;
            }
        }
        if let Some(subslot) = &self.subslot {
            if subslot != target.subslot() {
                return false;
            }
        }
        match (self.op, &self.version) {
            (Some(op), Some(version)) => op.matches(target.version(), version),
            _ => true,
        }
    }

    /// Conservative overlap test: false only when no package can match both
    /// atoms.
    pub fn intersects(&self, other: &Atom) -> bool {
        if self.key != other.key {
            return false;
        }
        if self.negated || other.negated {
            return true;
        }
        if let (Some(a), Some(b)) = (&self.slot, &other.slot) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.subslot, &other.subslot) {
            if a != b {
                return false;
            }
        }

        let (Some(op_a), Some(ver_a), Some(op_b), Some(ver_b)) =
            (self.op, &self.version, other.op, &other.version)
        else {
            return true;
        };

        if op_a == Operator::Equal {
            return op_b.matches(ver_a, ver_b);
        }
        if op_b == Operator::Equal {
            return op_a.matches(ver_b, ver_a);
        }

        let (lower, upper) = if op_a.is_lower_bound() && op_b.is_upper_bound() {
            ((op_a, ver_a), (op_b, ver_b))
        } else if op_b.is_lower_bound() && op_a.is_upper_bound() {
            ((op_b, ver_b), (op_a, ver_a))
        } else {
            // Same-direction ranges always overlap; globs and `~` are treated
            // as unbounded.
            return true;
        };

        match lower.1.cmp(upper.1) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => lower.0.is_inclusive() && upper.0.is_inclusive(),
            std::cmp::Ordering::Greater => false,
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

impl FromStr for Atom {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Atom::parse(s)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}
