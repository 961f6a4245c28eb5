//! Turnstile workflow engine
//!
//! Every multi-step, rights-gated flow in the backend — event creation,
//! cart checkout, invitations, payment binding — runs on this engine.
//! The engine knows nothing about any of them: feature modules register
//! an [`ActionSetBuilder`] and a [`CompletionHook`] per workflow name,
//! and the engine drives the shared machinery.
//!
//! # Architecture
//!
//! - [`WorkflowRegistry`] — name-keyed builder/hook lookup, assembled at
//!   process start and injected
//! - [`ActionSetEngine`] — creation, caller updates, trusted settlement,
//!   and the consumption fence
//! - `rights-engine` — authorization for every mutation
//! - `flow-checks` — two-phase validation of caller payloads
//! - `turnstile-storage` — conditional-write persistence collaborator
//!
//! # Key principle
//!
//! Completion side effects run **at most once per actionset**. The
//! `consumed` flag flips in the same conditional write that turns the
//! last action `done`; only the writer that wins that write invokes the
//! registered hook. Hooks hand real work to the dispatch queue and must
//! tolerate at-least-once delivery downstream.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use flow_engine::{
//!     ActionSetBuilder, ActionSetEngine, CompletionHook, UpdateOutcome, WorkflowRegistry,
//!     ACTIONSET_ENTITY,
//! };
//! use flow_checks::{FieldSpec, Schema};
//! use flow_types::{ActionSet, ActionSetDraft, ActionSpec, FlowResult};
//! use rights_engine::RightsEngine;
//! use rights_types::{PrincipalId, RightSpec, RightsConfig};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use turnstile_storage::memory::InMemoryFlowStorage;
//! use turnstile_storage::{ActionSetStore, GrantStore};
//!
//! struct CartBuilder;
//!
//! #[async_trait]
//! impl ActionSetBuilder for CartBuilder {
//!     async fn build(&self, caller: &PrincipalId, _args: Value) -> FlowResult<ActionSetDraft> {
//!         Ok(ActionSetDraft::new()
//!             .with_action(
//!                 ActionSpec::input("select_tickets", "edit")
//!                     .with_schema(Schema::new().field("qty", FieldSpec::integer().min(1.0)))
//!                     .require("qty"),
//!             )
//!             .grant(caller.clone(), "owner"))
//!     }
//! }
//!
//! struct CartHook;
//!
//! #[async_trait]
//! impl CompletionHook for CartHook {
//!     async fn on_complete(&self, _actionset: &ActionSet) -> FlowResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let storage = Arc::new(InMemoryFlowStorage::new());
//!     let config = RightsConfig::new()
//!         .declare(
//!             ACTIONSET_ENTITY,
//!             "owner",
//!             RightSpec::new().with_count(1).with_edit_rights().counts_as("edit"),
//!         )
//!         .declare(ACTIONSET_ENTITY, "edit", RightSpec::new());
//!     let rights = Arc::new(
//!         RightsEngine::new(config, storage.clone() as Arc<dyn GrantStore>).unwrap(),
//!     );
//!
//!     let mut registry = WorkflowRegistry::new();
//!     registry.register("cart_create", Arc::new(CartBuilder), Arc::new(CartHook));
//!
//!     let engine = ActionSetEngine::new(
//!         storage as Arc<dyn ActionSetStore>,
//!         rights,
//!         Arc::new(registry),
//!     );
//!
//!     let caller = PrincipalId::new("user-1");
//!     let set = engine.create("cart_create", &caller, Value::Null).await.unwrap();
//!     let outcome = engine
//!         .update(&set.id, &caller, json!({"qty": 2}), None)
//!         .await
//!         .unwrap();
//!     assert!(matches!(outcome, UpdateOutcome::Completed { .. }));
//! }
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod registry;

pub use engine::{ActionSetEngine, UpdateOutcome, ACTIONSET_ENTITY};
pub use registry::{ActionSetBuilder, CompletionHook, WorkflowRegistry};
