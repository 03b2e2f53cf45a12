//! Dependency strings and their conjunctive normal form

use std::fmt;
use std::str::FromStr;

use crate::atom::Atom;
use crate::error::AtomError;

/// An ordered list of OR-groups; every group needs one satisfied atom
pub type Cnf = Vec<Vec<Atom>>;

/// A node of a parsed dependency string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepNode {
    Atom(Atom),
    /// `( ... )`
    AllOf(Vec<DepNode>),
    /// `|| ( ... )`
    AnyOf(Vec<DepNode>),
}

/// A parsed dependency string such as `dev-libs/a || ( dev-libs/b dev-libs/c )`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepSet {
    nodes: Vec<DepNode>,
}

impl DepSet {
    pub fn new(nodes: Vec<DepNode>) -> Self {
        Self { nodes }
    }

    /// Parse a whitespace separated dependency string
    pub fn parse(input: &str) -> Result<Self, AtomError> {
        let mut tokens = input.split_whitespace();
        let nodes = parse_group(input, &mut tokens, false)?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[DepNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Convert to conjunctive normal form.
    ///
    /// Any-of groups are distributed over their all-of children. Groups keep
    /// the order atoms appear in, duplicate atoms within a group and
    /// duplicate groups are dropped, and an empty `|| ( )` counts as
    /// satisfied.
    pub fn cnf_solutions(&self) -> Cnf {
        let mut out: Cnf = Vec::new();
        for node in &self.nodes {
            for clause in node_cnf(node) {
                if !out.contains(&clause) {
                    out.push(clause);
                }
            }
        }
        out
    }
}

fn parse_group<'a, I>(
    input: &str,
    tokens: &mut I,
    nested: bool,
) -> Result<Vec<DepNode>, AtomError>
where
    I: Iterator<Item = &'a str>,
{
    let mut nodes = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            ")" => {
                if nested {
                    return Ok(nodes);
                }
                return Err(AtomError::Unbalanced(input.to_string()));
            }
            "(" => nodes.push(DepNode::AllOf(parse_group(input, tokens, true)?)),
            "||" => {
                if tokens.next() != Some("(") {
                    return Err(AtomError::DanglingAnyOf(input.to_string()));
                }
                nodes.push(DepNode::AnyOf(parse_group(input, tokens, true)?));
            }
            t if t.ends_with('?') => return Err(AtomError::UseConditional(t.to_string())),
            t => nodes.push(DepNode::Atom(Atom::parse(t)?)),
        }
    }
    if nested {
        return Err(AtomError::Unbalanced(input.to_string()));
    }
    Ok(nodes)
}

fn node_cnf(node: &DepNode) -> Cnf {
    match node {
        DepNode::Atom(atom) => vec![vec![atom.clone()]],
        DepNode::AllOf(children) => children.iter().flat_map(node_cnf).collect(),
        DepNode::AnyOf(children) => {
            let mut acc: Cnf = vec![Vec::new()];
            for child in children {
                let cnf = node_cnf(child);
                if cnf.is_empty() {
                    return Vec::new();
                }
                let mut next = Vec::with_capacity(acc.len() * cnf.len());
                for clause in &acc {
                    for other in &cnf {
                        let mut merged = clause.clone();
                        for atom in other {
                            if !merged.contains(atom) {
                                merged.push(atom.clone());
                            }
                        }
                        next.push(merged);
                    }
                }
                acc = next;
            }
            acc.retain(|clause| !clause.is_empty());
            acc
        }
    }
}

impl FromStr for DepSet {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DepSet::parse(s)
    }
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[DepNode]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        match node {
            DepNode::Atom(atom) => write!(f, "{}", atom)?,
            DepNode::AllOf(children) => {
                write!(f, "( ")?;
                write_nodes(f, children)?;
                write!(f, " )")?;
            }
            DepNode::AnyOf(children) => {
                write!(f, "|| ( ")?;
                write_nodes(f, children)?;
                write!(f, " )")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for DepSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes)
    }
}
