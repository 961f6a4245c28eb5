//! Workflow domain types for Turnstile
//!
//! An [`ActionSet`] is one running instance of a named multi-step
//! workflow: an ordered list of [`Action`]s, a consumption flag that
//! guarantees at-most-once completion side effects, and the rights
//! granted at construction time. Builders produce [`ActionSetDraft`]s;
//! the engine materializes them, drives status transitions, and flips
//! the consumption fence.

#![deny(unsafe_code)]

pub mod actionset;
pub mod draft;

mod error;

pub use actionset::{Action, ActionKind, ActionSet, ActionSetId, ActionSetStatus, ActionStatus};
pub use draft::{ActionSetDraft, ActionSpec};
pub use error::{FlowError, FlowResult};
