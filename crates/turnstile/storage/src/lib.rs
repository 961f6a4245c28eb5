//! Storage collaborator for the Turnstile workflow core.
//!
//! The engines never talk to a database directly — they consume the
//! narrow traits in [`traits`]: conditional get/put keyed by actionset
//! id and by entity instance for rights grants. The conditional writes
//! (`put_actionset_if`, `put_entity_grants_if`) are the compare-and-set
//! primitives that make the consumption fence and the grant caps safe
//! under concurrency.
//!
//! [`memory::InMemoryFlowStorage`] is the deterministic reference
//! backend used by tests and local runs.

#![deny(unsafe_code)]

pub mod memory;
pub mod model;
pub mod traits;

mod error;

pub use error::{StorageError, StorageResult};
pub use model::Job;
pub use traits::{ActionSetStore, FlowStorage, GrantStore, JobQueue, QueryWindow};
