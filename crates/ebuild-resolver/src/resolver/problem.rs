use std::fmt;
use std::sync::Arc;

use ebuild_atom::Atom;

use super::pigeonholes::Blocker;
use super::stack::DepMode;
use crate::package::Package;

/// How a frame concluded successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A committed package already satisfied the atom
    PreSolved,
    /// The candidate was slotted
    Inserted,
    /// The candidate's slot already held an equivalent package
    AlreadyPresent,
    /// A benign cycle back to an ancestor
    Cycle,
    /// Satisfied from installed packages after a cycle
    ForcedLivefs,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::PreSolved => "pre-solved",
            Outcome::Inserted => "inserted",
            Outcome::AlreadyPresent => "already present",
            Outcome::Cycle => "cycle",
            Outcome::ForcedLivefs => "forced livefs",
        };
        f.write_str(s)
    }
}

/// Diagnostic record kept by each resolver frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Number of candidates materialized for the atom
    Viable(usize),
    Trying(Arc<Package>),
    Mode(DepMode),
    /// Atoms stripped from the choice point after failing
    Reduce(Vec<Atom>),
    ChoiceFailed {
        pkg: Arc<Package>,
        failure: ChoiceFailure,
    },
    Succeeded {
        pkg: Option<Arc<Package>>,
        outcome: Outcome,
    },
    /// A child atom concluded
    Child { atom: Atom, succeeded: bool },
    /// A child atom was already satisfied by a committed package
    PreSolved { atom: Atom, pkg: Arc<Package> },
    /// The frame fell back to installed packages to break a cycle
    ForcedLivefs,
}

/// Why a single candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceFailure {
    /// No atom of a dependency group could be resolved
    Unsatisfied {
        mode: DepMode,
        group: Vec<Atom>,
        causes: Vec<FailureTrace>,
    },
    /// A blocker of the candidate matches committed packages
    Blocked {
        blocker: Atom,
        hits: Vec<(Arc<Package>, Option<Atom>)>,
    },
    /// The candidate could not be slotted
    SlotConflict {
        occupants: Vec<(Arc<Package>, Option<Atom>)>,
        blockers: Vec<Blocker>,
    },
}

/// Why a whole frame failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No repository has a match
    NoMatches,
    /// The atom failed before in this plan
    GloballyInsoluble,
    /// Every candidate needs an atom already known to be insoluble
    PrunedByInsolubles,
    /// The candidate cycles back to an ancestor holding the same slot
    UnbreakableCycle {
        ancestor: Arc<Package>,
        mode: DepMode,
        cause: Option<Box<FailureTrace>>,
    },
    /// Every candidate was tried and rejected
    Exhausted,
    /// A requested blocker matches committed packages
    Blocked(Vec<Arc<Package>>),
}

impl FailureReason {
    pub fn is_cycle(&self) -> bool {
        matches!(self, FailureReason::UnbreakableCycle { .. })
    }
}

/// Explanation of a failed atom, built from the frame's event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureTrace {
    pub atom: Atom,
    pub mode: DepMode,
    pub requester: Option<Atom>,
    pub reason: FailureReason,
    pub events: Vec<FrameEvent>,
}

impl FailureTrace {
    /// This trace and every nested cause, depth first
    pub fn walk(&self) -> Vec<&FailureTrace> {
        let mut out = vec![self];
        if let FailureReason::UnbreakableCycle { cause: Some(cause), .. } = &self.reason {
            out.extend(cause.walk());
        }
        for event in &self.events {
            if let FrameEvent::ChoiceFailed {
                failure: ChoiceFailure::Unsatisfied { causes, .. },
                ..
            } = event
            {
                for cause in causes {
                    out.extend(cause.walk());
                }
            }
        }
        out
    }

    /// Candidates rejected by this frame, in the order they were tried
    pub fn rejected(&self) -> impl Iterator<Item = (&Arc<Package>, &ChoiceFailure)> + '_ {
        self.events.iter().filter_map(|event| match event {
            FrameEvent::ChoiceFailed { pkg, failure } => Some((pkg, failure)),
            _ => None,
        })
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{}{} ({}", indent, self.atom, self.mode)?;
        match &self.requester {
            Some(requester) => write!(f, ", required by {}", requester)?,
            None => write!(f, ", requested directly")?,
        }
        writeln!(f, "): {}", self.reason)?;

        if let FailureReason::UnbreakableCycle { cause: Some(cause), .. } = &self.reason {
            cause.render(f, depth + 1)?;
        }

        for event in &self.events {
            match event {
                FrameEvent::ChoiceFailed { pkg, failure } => {
                    write!(f, "{}  {}: ", indent, pkg)?;
                    match failure {
                        ChoiceFailure::Unsatisfied { mode, group, causes } => {
                            let group: Vec<String> = group.iter().map(|a| a.to_string()).collect();
                            writeln!(f, "cannot satisfy {} group [{}]", mode, group.join(" "))?;
                            for cause in causes {
                                cause.render(f, depth + 2)?;
                            }
                        }
                        ChoiceFailure::Blocked { blocker, hits } => {
                            writeln!(f, "blocker {} matches", blocker)?;
                            for (hit, requester) in hits {
                                write_occupant(f, &indent, hit, requester.as_ref())?;
                            }
                        }
                        ChoiceFailure::SlotConflict { occupants, blockers } => {
                            writeln!(f, "slot conflict")?;
                            for (occupant, requester) in occupants {
                                write_occupant(f, &indent, occupant, requester.as_ref())?;
                            }
                            for blocker in blockers {
                                writeln!(f, "{}    blocked by {}", indent, blocker)?;
                            }
                        }
                    }
                }
                FrameEvent::Reduce(atoms) => {
                    let atoms: Vec<String> = atoms.iter().map(|a| a.to_string()).collect();
                    writeln!(f, "{}  pruned {}", indent, atoms.join(" "))?;
                }
                FrameEvent::PreSolved { atom, pkg } => {
                    writeln!(f, "{}  {} already satisfied by {}", indent, atom, pkg)?;
                }
                FrameEvent::ForcedLivefs => {
                    writeln!(f, "{}  cycle: retried against installed packages", indent)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn write_occupant(
    f: &mut fmt::Formatter<'_>,
    indent: &str,
    pkg: &Package,
    requester: Option<&Atom>,
) -> fmt::Result {
    match requester {
        Some(requester) => writeln!(f, "{}    {} (required by {})", indent, pkg, requester),
        None if pkg.repo().livefs() => writeln!(f, "{}    {} (installed)", indent, pkg),
        None => writeln!(f, "{}    {} (requested directly)", indent, pkg),
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoMatches => write!(f, "no matching packages"),
            FailureReason::GloballyInsoluble => write!(f, "already known to be insoluble"),
            FailureReason::PrunedByInsolubles => {
                write!(f, "every candidate depends on an insoluble atom")
            }
            FailureReason::UnbreakableCycle { ancestor, mode, .. } => {
                write!(f, "unbreakable cycle through {} ({})", ancestor, mode)
            }
            FailureReason::Exhausted => write!(f, "no candidate could be used"),
            FailureReason::Blocked(hits) => {
                let hits: Vec<String> = hits.iter().map(|p| p.to_string()).collect();
                write!(f, "blocks {}", hits.join(", "))
            }
        }
    }
}

impl fmt::Display for FailureTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// A top-level atom that could not be resolved
#[derive(Debug, Clone, thiserror::Error)]
#[error("unable to resolve {atom}:\n{trace}")]
pub struct ResolveFailure {
    pub atom: Atom,
    pub trace: FailureTrace,
}

impl ResolveFailure {
    pub fn new(trace: FailureTrace) -> Self {
        Self {
            atom: trace.atom.clone(),
            trace,
        }
    }
}
