//! Drafts: what a workflow builder hands to the engine
//!
//! A builder assembles the ordered step specifications and the initial
//! rights for the caller (and anyone else the workflow involves). The
//! engine materializes the draft into a persisted [`crate::ActionSet`]
//! and writes the initial grants; the draft itself never touches
//! storage.

use crate::{Action, ActionKind, ActionStatus, FlowError, FlowResult};
use flow_checks::Schema;
use rights_types::PrincipalId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ── Step specification ───────────────────────────────────────────────

/// Specification of one step, produced by a builder
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub kind: ActionKind,
    /// The right gating edits of this step
    pub right: String,
    /// Rest at `waiting` after a valid submission until settled by a
    /// trusted integration
    #[serde(default)]
    pub requires_confirmation: bool,
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ActionSpec {
    fn new(name: impl Into<String>, kind: ActionKind, right: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            right: right.into(),
            requires_confirmation: false,
            schema: Schema::new(),
            required: Vec::new(),
        }
    }

    /// A caller-editable step
    pub fn input(name: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Input, right)
    }

    /// A step resolved by trusted integrations
    pub fn computed(name: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Computed, right)
    }

    /// A terminal marker step
    pub fn terminal(name: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Terminal, right)
    }

    /// Require downstream confirmation before the step counts as done
    pub fn with_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    /// Declare the payload shape for this step
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Add a workflow-required field name
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Materialize the spec into a pending step
    pub fn into_action(self) -> Action {
        Action {
            name: self.name,
            kind: self.kind,
            right: self.right,
            requires_confirmation: self.requires_confirmation,
            status: ActionStatus::Pending,
            data: Value::Null,
            error: None,
            schema: self.schema,
            required: self.required,
        }
    }
}

// ── Draft ────────────────────────────────────────────────────────────

/// What a builder returns: the ordered steps plus the initial grants
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionSetDraft {
    pub actions: Vec<ActionSpec>,
    /// Principal → rights to bootstrap-grant at creation. Must include
    /// the caller with at least one right.
    pub rights: BTreeMap<PrincipalId, Vec<String>>,
}

impl ActionSetDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn with_action(mut self, spec: ActionSpec) -> Self {
        self.actions.push(spec);
        self
    }

    /// Add an initial grant
    pub fn grant(mut self, principal: PrincipalId, right: impl Into<String>) -> Self {
        self.rights.entry(principal).or_default().push(right.into());
        self
    }

    /// Enforce the draft invariants the engine relies on: a constructed
    /// actionset is never empty, and the creating caller always appears
    /// in the construction-time rights.
    pub fn validate(&self, owner: &PrincipalId) -> FlowResult<()> {
        if self.actions.is_empty() {
            return Err(FlowError::Builder(
                "draft must contain at least one action".to_string(),
            ));
        }
        match self.rights.get(owner) {
            Some(rights) if !rights.is_empty() => Ok(()),
            _ => Err(FlowError::Builder(
                "draft must grant the caller at least one right".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_materializes_pending() {
        let action = ActionSpec::input("select_tickets", "edit")
            .with_schema(Schema::new())
            .require("qty")
            .into_action();
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.kind, ActionKind::Input);
        assert_eq!(action.data, Value::Null);
        assert_eq!(action.required, vec!["qty".to_string()]);
    }

    #[test]
    fn test_confirmation_flag() {
        let spec = ActionSpec::input("bind_card", "edit").with_confirmation();
        assert!(spec.requires_confirmation);
        assert!(!ActionSpec::input("x", "edit").requires_confirmation);
    }

    #[test]
    fn test_draft_validation() {
        let owner = PrincipalId::new("u1");

        let empty = ActionSetDraft::new().grant(owner.clone(), "owner");
        assert!(matches!(empty.validate(&owner), Err(FlowError::Builder(_))));

        let no_rights = ActionSetDraft::new().with_action(ActionSpec::input("a", "edit"));
        assert!(matches!(
            no_rights.validate(&owner),
            Err(FlowError::Builder(_))
        ));

        let ok = ActionSetDraft::new()
            .with_action(ActionSpec::input("a", "edit"))
            .grant(owner.clone(), "owner");
        assert!(ok.validate(&owner).is_ok());

        // Rights for someone else don't satisfy the owner invariant.
        let other_only = ActionSetDraft::new()
            .with_action(ActionSpec::input("a", "edit"))
            .grant(PrincipalId::new("u2"), "owner");
        assert!(matches!(
            other_only.validate(&owner),
            Err(FlowError::Builder(_))
        ));
    }
}
