//! ActionSets: running instances of named multi-step workflows
//!
//! An ActionSet tracks the runtime state of one workflow: the ordered
//! steps, their statuses and working data, the rights granted at
//! construction, and the one-way `consumed` flag that fences completion
//! side effects.

use crate::{FlowError, FlowResult};
use chrono::{DateTime, Utc};
use flow_checks::Schema;
use rights_types::PrincipalId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for an actionset
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionSetId(pub String);

impl ActionSetId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for ActionSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Action ───────────────────────────────────────────────────────────

/// Status of one step within an actionset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Not yet attempted
    #[default]
    Pending,
    /// Data submitted, awaiting downstream confirmation
    Waiting,
    /// Terminal success
    Done,
    /// Terminal failure, carries the error payload
    Error,
}

impl ActionStatus {
    /// `done` and `error` are terminal per step
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// What kind of step this is — decides whether a caller may edit it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Requires caller-submitted data
    Input,
    /// Resolved by trusted integrations (payment capture, chain events)
    Computed,
    /// Marker step resolved by trusted integrations when the flow lands
    Terminal,
}

/// One step within an actionset
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    /// Logical step name (e.g. `"ticket_selection"`)
    pub name: String,
    /// Step kind
    pub kind: ActionKind,
    /// The right gating edits of this step; whether it is public comes
    /// from the rights configuration for the actionset entity type
    pub right: String,
    /// An input step with this flag set rests at `waiting` after a
    /// valid submission until a trusted integration settles it
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Current status
    pub status: ActionStatus,
    /// The step's working data — opaque to the engine
    pub data: Value,
    /// Failure payload, populated only when status is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Declared payload shape, handed to the checks runner on update
    pub schema: Schema,
    /// Workflow-required field names for the completeness phase
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Action {
    /// Whether the step has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether callers may submit data for this step at all
    pub fn is_editable(&self) -> bool {
        self.kind == ActionKind::Input
    }
}

// ── ActionSet ────────────────────────────────────────────────────────

/// Derived status of the whole actionset — computed on read, never stored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSetStatus {
    /// At least one step is not yet done and none has failed
    InProgress,
    /// Every step is done
    Completed,
    /// At least one step failed
    Error,
}

/// One instance of a named multi-step workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSet {
    /// Unique identifier, assigned at creation, immutable
    pub id: ActionSetId,
    /// Workflow type tag — selects the builder/lifecycle pair
    pub name: String,
    /// The principal that created the actionset
    pub owner: PrincipalId,
    /// Rights granted at construction time, kept as part of the record.
    /// Live authorization reads the rights store, which the engine
    /// populates from this same mapping.
    pub rights: BTreeMap<PrincipalId, Vec<String>>,
    /// Ordered steps; order is significant and fixed at creation
    pub actions: Vec<Action>,
    /// One-way completion fence. Once true, every further mutation
    /// fails; the registered lifecycle hook has been invoked.
    pub consumed: bool,
    /// Conditional-write token, bumped on every successful write
    pub version: u64,
    /// When the actionset was created
    pub created_at: DateTime<Utc>,
    /// When the actionset was last touched by the engine
    pub updated_at: DateTime<Utc>,
}

impl ActionSet {
    /// Derived status: `error` wins over `completed` wins over progress
    pub fn status(&self) -> ActionSetStatus {
        if self
            .actions
            .iter()
            .any(|a| a.status == ActionStatus::Error)
        {
            ActionSetStatus::Error
        } else if self.actions.iter().all(|a| a.status == ActionStatus::Done) {
            ActionSetStatus::Completed
        } else {
            ActionSetStatus::InProgress
        }
    }

    /// Whether every step is done
    pub fn is_complete(&self) -> bool {
        self.actions.iter().all(|a| a.status == ActionStatus::Done)
    }

    /// The "current" step: the lowest-indexed action not in a terminal
    /// status. `None` when every step is terminal.
    pub fn current_action(&self) -> Option<usize> {
        self.actions.iter().position(|a| !a.is_terminal())
    }

    /// Bounds-checked step access
    pub fn action(&self, index: usize) -> FlowResult<&Action> {
        self.actions.get(index).ok_or(FlowError::InvalidIndex {
            index,
            len: self.actions.len(),
        })
    }

    /// Bounds-checked mutable step access
    pub fn action_mut(&mut self, index: usize) -> FlowResult<&mut Action> {
        let len = self.actions.len();
        self.actions
            .get_mut(index)
            .ok_or(FlowError::InvalidIndex { index, len })
    }
}
