use std::fmt;

use ebuild_atom::Atom;

use super::choice_point::ChoicePoint;
use super::problem::FrameEvent;
use crate::package::DepClass;

/// Why an atom is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepMode {
    /// Requested directly by the caller
    Root,
    Bdepend,
    Depend,
    Rdepend,
    Pdepend,
}

impl DepMode {
    pub fn is_build_time(self) -> bool {
        matches!(self, DepMode::Bdepend | DepMode::Depend)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DepMode::Root => "root",
            DepMode::Bdepend => "bdepend",
            DepMode::Depend => "depend",
            DepMode::Rdepend => "rdepend",
            DepMode::Pdepend => "pdepend",
        }
    }
}

impl From<DepClass> for DepMode {
    fn from(class: DepClass) -> Self {
        match class {
            DepClass::Bdepend => DepMode::Bdepend,
            DepClass::Depend => DepMode::Depend,
            DepClass::Rdepend => DepMode::Rdepend,
            DepClass::Pdepend => DepMode::Pdepend,
        }
    }
}

impl fmt::Display for DepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which repositories a frame may draw candidates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbScope {
    All,
    /// Installed packages only, used to break build-time cycles
    Livefs,
}

/// One atom-resolution attempt
#[derive(Debug, Clone)]
pub struct ResolverFrame {
    pub parent: Option<usize>,
    pub atom: Atom,
    pub choices: ChoicePoint,
    pub dbs: DbScope,
    pub mode: DepMode,
    /// Dependency class the frame's candidate is currently processing
    pub processing: Option<DepMode>,
    /// Plan state log position when the frame was entered
    pub start_point: usize,
    pub depth: usize,
    pub drop_cycles: bool,
    /// Bypassed by cycle handling; skipped when scanning for cycles
    pub ignored: bool,
    pub succeeded: Option<bool>,
    pub events: Vec<FrameEvent>,
}

impl ResolverFrame {
    pub fn new(
        parent: Option<usize>,
        choices: ChoicePoint,
        dbs: DbScope,
        mode: DepMode,
        start_point: usize,
        depth: usize,
        drop_cycles: bool,
    ) -> Self {
        Self {
            parent,
            atom: choices.atom().clone(),
            choices,
            dbs,
            mode,
            processing: None,
            start_point,
            depth,
            drop_cycles,
            ignored: false,
            succeeded: None,
            events: Vec::new(),
        }
    }

    /// Whether the frame's current candidate comes from installed packages
    pub fn current_is_livefs(&self) -> bool {
        self.choices
            .current_pkg()
            .is_some_and(|pkg| pkg.repo().livefs())
    }

    pub fn push_event(&mut self, event: FrameEvent) {
        self.events.push(event);
    }
}

impl fmt::Display for ResolverFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {} {} ({})", self.depth, self.atom, self.mode)?;
        if let Some(pkg) = self.choices.current_pkg() {
            write!(f, ": {}", pkg)?;
        }
        Ok(())
    }
}

/// Explicit stack of resolver frames.
///
/// Pushes and pops pair with the resolver's own recursion, which lets cycle
/// detection inspect every ancestor of the frame being processed.
#[derive(Debug, Clone, Default)]
pub struct ResolverStack {
    frames: Vec<ResolverFrame>,
}

impl ResolverStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame, returning its index
    pub fn add_frame(&mut self, frame: ResolverFrame) -> usize {
        log::trace!("{}push {}", "  ".repeat(frame.depth), frame);
        self.frames.push(frame);
        self.frames.len() - 1
    }

    pub fn pop_frame(&mut self, succeeded: bool) -> Option<ResolverFrame> {
        let mut frame = self.frames.pop()?;
        frame.succeeded = Some(succeeded);
        log::trace!(
            "{}pop {} ({})",
            "  ".repeat(frame.depth),
            frame,
            if succeeded { "ok" } else { "failed" }
        );
        Some(frame)
    }

    pub fn current(&self) -> Option<&ResolverFrame> {
        self.frames.last()
    }

    pub fn frame(&self, idx: usize) -> &ResolverFrame {
        &self.frames[idx]
    }

    pub fn frame_mut(&mut self, idx: usize) -> &mut ResolverFrame {
        &mut self.frames[idx]
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[ResolverFrame] {
        &self.frames
    }

    /// Atom of the nearest frame at or above `parent` that was not bypassed
    pub fn requester_from(&self, mut parent: Option<usize>) -> Option<&Atom> {
        while let Some(p) = parent {
            let frame = &self.frames[p];
            if !frame.ignored {
                return Some(&frame.atom);
            }
            parent = frame.parent;
        }
        None
    }

    /// Atom of the frame that asked for frame `idx`
    pub fn requester(&self, idx: usize) -> Option<&Atom> {
        self.requester_from(self.frames[idx].parent)
    }

    /// Ancestors of frame `idx` whose current candidate occupies the same
    /// key and slot as its own, most recent first. Ignored frames never
    /// count.
    pub fn slot_cycles(&self, idx: usize) -> Vec<usize> {
        let Some(pkg) = self.frames[idx].choices.current_pkg() else {
            return Vec::new();
        };
        (0..idx)
            .rev()
            .filter(|&i| {
                let frame = &self.frames[i];
                !frame.ignored
                    && frame
                        .choices
                        .current_pkg()
                        .is_some_and(|other| other.key() == pkg.key() && other.slot() == pkg.slot())
            })
            .collect()
    }

    /// Whether any edge on the path from `ancestor` down to `idx` is a
    /// post-merge dependency.
    pub fn pdepend_between(&self, ancestor: usize, idx: usize) -> bool {
        self.frames[ancestor + 1..=idx]
            .iter()
            .any(|frame| frame.mode == DepMode::Pdepend)
    }
}
