//! Storage-facing records that are not owned by another crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A side-effect job handed to the dispatch collaborator by lifecycle
/// implementations. Delivery is at-least-once; consumers must be
/// idempotent per `(kind, payload)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// What kind of work this is (e.g. `"mint_tickets"`, `"send_email"`)
    pub kind: String,
    /// Opaque job arguments
    pub payload: Value,
    /// When the job was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}
