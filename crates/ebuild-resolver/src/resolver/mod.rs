//! The resolver core: slot tracking, choice points, the undoable plan state
//! and the depth-first merge plan driving them.

mod choice_point;
mod pigeonholes;
mod plan;
mod policy;
mod problem;
mod stack;
mod state;
mod transaction;


pub use choice_point::{ChoiceId, ChoicePoint, ChoiceState};
pub use pigeonholes::{Blocker, PigeonholedSlots, SlotConflict};
pub use plan::MergePlan;
pub use policy::{CandidateOrder, Policy, RepoPreference};
pub use problem::{ChoiceFailure, FailureReason, FailureTrace, FrameEvent, Outcome, ResolveFailure};
pub use stack::{DbScope, DepMode, ResolverFrame, ResolverStack};
pub use state::{ChoiceBinding, Displaced, Op, PlanState, RefCountingSet};
pub use transaction::Operation;
