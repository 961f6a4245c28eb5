//! The actionset state machine
//!
//! Owns the authoritative lifecycle of workflow instances: creation via
//! registered builders, caller updates gated by rights and validated by
//! the checks runner, settlement of confirmation-gated steps by trusted
//! integrations, and the one-way consumption fence that guarantees
//! at-most-once lifecycle invocation.
//!
//! Every mutation goes through the storage collaborator's conditional
//! write. Concurrent writers race on the stored version; the loser
//! re-reads and re-evaluates — in particular, a loser that re-reads
//! `consumed = true` gets `AlreadyConsumed` and never invokes the hook.

use crate::registry::WorkflowRegistry;
use chrono::Utc;
use flow_checks::{CheckReport, ChecksRunner};
use flow_types::{ActionSet, ActionSetId, ActionStatus, FlowError, FlowResult};
use rights_engine::RightsEngine;
use rights_types::{PrincipalId, RightsResult};
use serde_json::Value;
use std::sync::Arc;
use turnstile_storage::{ActionSetStore, StorageError};

/// Entity type under which actionset rights are declared and granted.
pub const ACTIONSET_ENTITY: &str = "actionset";

/// Upper bound on conditional-write retries before the operation is
/// reported as a storage failure.
const MAX_CAS_RETRIES: usize = 8;

// ── Outcome ──────────────────────────────────────────────────────────

/// Result of an accepted update or settlement call.
///
/// Validation failures are not errors: they come back as
/// [`UpdateOutcome::Rejected`] carrying the checks report verbatim, so
/// workflow-specific handling can decide between re-prompting and
/// marking the step failed.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The payload failed validation; nothing was mutated
    Rejected(CheckReport),
    /// The step was applied; the workflow is still in progress
    Applied { actionset: ActionSet },
    /// The step completed the workflow: `consumed` flipped and the
    /// lifecycle hook ran. A hook failure is reported here, never
    /// rolled back.
    Completed {
        actionset: ActionSet,
        hook_error: Option<String>,
    },
}

impl UpdateOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The actionset after the mutation, when one happened
    pub fn actionset(&self) -> Option<&ActionSet> {
        match self {
            Self::Rejected(_) => None,
            Self::Applied { actionset } | Self::Completed { actionset, .. } => Some(actionset),
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// The workflow engine: one per process, shared by the routing layer.
pub struct ActionSetEngine {
    store: Arc<dyn ActionSetStore>,
    rights: Arc<RightsEngine>,
    registry: Arc<WorkflowRegistry>,
}

impl ActionSetEngine {
    pub fn new(
        store: Arc<dyn ActionSetStore>,
        rights: Arc<RightsEngine>,
        registry: Arc<WorkflowRegistry>,
    ) -> Self {
        Self {
            store,
            rights,
            registry,
        }
    }

    /// The rights engine this engine authorizes against
    pub fn rights(&self) -> &Arc<RightsEngine> {
        &self.rights
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Create a new actionset for the named workflow.
    ///
    /// The registered builder authorizes `args` and assembles the
    /// draft; the engine enforces the draft invariants, persists the
    /// actionset, and bootstraps the initial rights grants.
    pub async fn create(
        &self,
        name: &str,
        caller: &PrincipalId,
        args: Value,
    ) -> FlowResult<ActionSet> {
        let builder = self.registry.builder(name)?;
        let draft = builder.build(caller, args).await?;
        draft.validate(caller)?;

        let now = Utc::now();
        let set = ActionSet {
            id: ActionSetId::generate(),
            name: name.to_string(),
            owner: caller.clone(),
            rights: draft.rights.clone(),
            actions: draft
                .actions
                .into_iter()
                .map(|spec| spec.into_action())
                .collect(),
            consumed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert_actionset(set.clone())
            .await
            .map_err(|err| FlowError::Storage(err.to_string()))?;

        for (principal, rights) in &set.rights {
            self.rights
                .bootstrap_grant(principal, ACTIONSET_ENTITY, set.id.as_str(), rights)
                .await?;
        }

        tracing::info!(
            actionset_id = %set.id,
            workflow = %set.name,
            owner = %set.owner,
            "actionset created"
        );
        Ok(set)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch an actionset. Visible if the caller holds any right on it
    /// or the actionset entity type declares a public right. Missing
    /// instances are reported as `Unauthorized` — existence is never
    /// leaked to callers without rights.
    pub async fn fetch(&self, id: &ActionSetId, caller: &PrincipalId) -> FlowResult<ActionSet> {
        let set = match self.load(id).await? {
            Some(set) => set,
            None => return Err(FlowError::Unauthorized),
        };

        if self.rights.any_public_right(ACTIONSET_ENTITY)
            || self
                .rights
                .holds_any_right(caller, ACTIONSET_ENTITY, id.as_str())
                .await?
        {
            Ok(set)
        } else {
            Err(FlowError::Unauthorized)
        }
    }

    // ── Caller updates ───────────────────────────────────────────────

    /// Submit data for a step.
    ///
    /// Without `action_idx` the update targets the current step (the
    /// lowest-indexed non-terminal action). The consumption fence is
    /// evaluated before anything else; the caller must hold the step's
    /// edit right unless that right is public; the payload must pass
    /// both validation phases. A valid submission settles the step to
    /// `done`, or to `waiting` when the step awaits downstream
    /// confirmation. The update that turns the last step `done` flips
    /// `consumed` in the same conditional write and invokes the
    /// lifecycle hook exactly once.
    pub async fn update(
        &self,
        id: &ActionSetId,
        caller: &PrincipalId,
        data: Value,
        action_idx: Option<usize>,
    ) -> FlowResult<UpdateOutcome> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut set = match self.load(id).await? {
                Some(set) => set,
                None => return Err(FlowError::Unauthorized),
            };
            if set.consumed {
                return Err(FlowError::AlreadyConsumed(set.id));
            }

            let index = match action_idx {
                Some(index) => {
                    if index >= set.actions.len() {
                        return Err(FlowError::InvalidIndex {
                            index,
                            len: set.actions.len(),
                        });
                    }
                    index
                }
                None => set.current_action().ok_or(FlowError::NoEditableAction)?,
            };

            let (right, schema, required, requires_confirmation) = {
                let action = &set.actions[index];
                if !action.is_editable() {
                    return Err(FlowError::NotEditable { index });
                }
                match action.status {
                    // `error` steps may be re-driven by an authorized
                    // caller; `done` is final, `waiting` already has
                    // data in flight.
                    ActionStatus::Pending | ActionStatus::Error => {}
                    ActionStatus::Done | ActionStatus::Waiting => {
                        return Err(FlowError::NotEditable { index })
                    }
                }
                (
                    action.right.clone(),
                    action.schema.clone(),
                    action.required.clone(),
                    action.requires_confirmation,
                )
            };

            if !self
                .rights
                .check(caller, ACTIONSET_ENTITY, id.as_str(), &right)
                .await?
            {
                return Err(FlowError::Unauthorized);
            }

            let validated = match ChecksRunner::run(&data, &schema, &required) {
                CheckReport::Valid { result } => result,
                rejected => return Ok(UpdateOutcome::Rejected(rejected)),
            };

            {
                let action = &mut set.actions[index];
                action.data = validated;
                action.error = None;
                action.status = if requires_confirmation {
                    ActionStatus::Waiting
                } else {
                    ActionStatus::Done
                };
            }
            set.updated_at = Utc::now();

            match self.commit(set).await? {
                Committed::Done(outcome) => return Ok(outcome),
                Committed::Lost => continue,
            }
        }
        Err(FlowError::Storage(
            "conditional write retries exhausted".to_string(),
        ))
    }

    // ── Trusted settlement ───────────────────────────────────────────

    /// Settle a step to `done`. This is the trusted surface for
    /// external collaborators (payment confirmations, chain events) and
    /// must not be exposed to callers — it performs no rights check.
    /// Re-settling an already-done step is a no-op, so at-least-once
    /// delivery upstream is harmless.
    pub async fn complete_action(
        &self,
        id: &ActionSetId,
        index: usize,
    ) -> FlowResult<UpdateOutcome> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut set = self.load_for_settlement(id).await?;
            if index >= set.actions.len() {
                return Err(FlowError::InvalidIndex {
                    index,
                    len: set.actions.len(),
                });
            }

            match set.actions[index].status {
                ActionStatus::Done => return Ok(UpdateOutcome::Applied { actionset: set }),
                ActionStatus::Pending | ActionStatus::Waiting => {}
                ActionStatus::Error => return Err(FlowError::NotEditable { index }),
            }

            set.actions[index].status = ActionStatus::Done;
            set.actions[index].error = None;
            set.updated_at = Utc::now();

            match self.commit(set).await? {
                Committed::Done(outcome) => return Ok(outcome),
                Committed::Lost => continue,
            }
        }
        Err(FlowError::Storage(
            "conditional write retries exhausted".to_string(),
        ))
    }

    /// Settle a step to `error` with a failure payload. Part of the
    /// trusted surface; idempotent on an already-failed step.
    pub async fn fail_action(
        &self,
        id: &ActionSetId,
        index: usize,
        error: Value,
    ) -> FlowResult<ActionSet> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut set = self.load_for_settlement(id).await?;
            if index >= set.actions.len() {
                return Err(FlowError::InvalidIndex {
                    index,
                    len: set.actions.len(),
                });
            }

            match set.actions[index].status {
                ActionStatus::Error => return Ok(set),
                ActionStatus::Done => return Err(FlowError::NotEditable { index }),
                ActionStatus::Pending | ActionStatus::Waiting => {}
            }

            set.actions[index].status = ActionStatus::Error;
            set.actions[index].error = Some(error.clone());
            set.updated_at = Utc::now();

            let expected = set.version;
            set.version += 1;
            match self.store.put_actionset_if(set.clone(), expected).await {
                Ok(()) => {
                    tracing::info!(
                        actionset_id = %set.id,
                        action = %set.actions[index].name,
                        "action failed"
                    );
                    return Ok(set);
                }
                Err(StorageError::Conflict(_)) => continue,
                Err(err) => return Err(FlowError::Storage(err.to_string())),
            }
        }
        Err(FlowError::Storage(
            "conditional write retries exhausted".to_string(),
        ))
    }

    // ── Rights passthroughs (the caller-facing authorization API) ────

    pub async fn grant_right(
        &self,
        actor: &PrincipalId,
        grantee: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        right: &str,
    ) -> RightsResult<()> {
        self.rights
            .grant(actor, grantee, entity_type, entity_value, right)
            .await
    }

    pub async fn revoke_right(
        &self,
        actor: &PrincipalId,
        grantee: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        right: &str,
    ) -> RightsResult<()> {
        self.rights
            .revoke(actor, grantee, entity_type, entity_value, right)
            .await
    }

    pub async fn check_right(
        &self,
        principal: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        right: &str,
    ) -> RightsResult<bool> {
        self.rights
            .check(principal, entity_type, entity_value, right)
            .await
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn load(&self, id: &ActionSetId) -> FlowResult<Option<ActionSet>> {
        self.store
            .get_actionset(id)
            .await
            .map_err(|err| FlowError::Storage(err.to_string()))
    }

    /// Load for the trusted settlement surface: a missing record is a
    /// storage-level problem there, not an authorization question.
    async fn load_for_settlement(&self, id: &ActionSetId) -> FlowResult<ActionSet> {
        let set = self
            .load(id)
            .await?
            .ok_or_else(|| FlowError::Storage(format!("actionset {} not found", id)))?;
        if set.consumed {
            return Err(FlowError::AlreadyConsumed(set.id));
        }
        Ok(set)
    }

    /// Write the mutated record under the conditional-write discipline
    /// and, when this write completed the workflow, flip `consumed` in
    /// the same write and run the lifecycle hook.
    async fn commit(&self, mut set: ActionSet) -> FlowResult<Committed> {
        let completing = set.is_complete();
        if completing {
            set.consumed = true;
        }

        let expected = set.version;
        set.version += 1;
        match self.store.put_actionset_if(set.clone(), expected).await {
            Ok(()) => {
                if completing {
                    Ok(Committed::Done(self.run_completion(set).await))
                } else {
                    Ok(Committed::Done(UpdateOutcome::Applied { actionset: set }))
                }
            }
            Err(StorageError::Conflict(_)) => Ok(Committed::Lost),
            Err(err) => Err(FlowError::Storage(err.to_string())),
        }
    }

    /// The consumed flag is already durable when this runs; a hook
    /// failure is logged and reported, never rolled back. Hooks are
    /// invoked at most once per actionset by construction — only the
    /// writer that won the conditional write reaches this point.
    async fn run_completion(&self, actionset: ActionSet) -> UpdateOutcome {
        tracing::info!(
            actionset_id = %actionset.id,
            workflow = %actionset.name,
            "actionset consumed"
        );

        let hook = match self.registry.hook(&actionset.name) {
            Ok(hook) => hook,
            Err(err) => {
                tracing::warn!(
                    actionset_id = %actionset.id,
                    error = %err,
                    "no completion hook resolved"
                );
                return UpdateOutcome::Completed {
                    actionset,
                    hook_error: Some(err.to_string()),
                };
            }
        };

        let hook_error = match hook.on_complete(&actionset).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(
                    actionset_id = %actionset.id,
                    error = %err,
                    "completion hook failed; consumption stands"
                );
                Some(err.to_string())
            }
        };
        UpdateOutcome::Completed {
            actionset,
            hook_error,
        }
    }
}

/// Result of one conditional-write attempt.
enum Committed {
    Done(UpdateOutcome),
    Lost,
}
