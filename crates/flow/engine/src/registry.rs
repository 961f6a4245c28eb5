//! Builder/lifecycle registry: the engine's two extension points
//!
//! Feature modules plug into the generic engine by registering, under a
//! workflow name, a builder (assembles the initial actionset) and a
//! completion hook (reacts when the actionset is consumed). The registry
//! is an explicit object assembled at process start and injected into
//! the engine — there is no ambient global, so tests swap in fakes
//! freely.

use async_trait::async_trait;
use flow_types::{ActionSet, ActionSetDraft, FlowError, FlowResult};
use rights_types::PrincipalId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Assembles the initial actionset for one workflow type.
///
/// Invoked once, at creation time, before any action exists. The builder
/// is responsible for authorizing `args` itself (e.g. rejecting a
/// checkout draft for a cart the caller does not own) — the registry
/// performs no authorization on its behalf. Failures are returned as
/// [`FlowError`] values, never panics.
#[async_trait]
pub trait ActionSetBuilder: Send + Sync {
    async fn build(&self, caller: &PrincipalId, args: Value) -> FlowResult<ActionSetDraft>;
}

/// Reacts to a consumed actionset.
///
/// Invoked by the engine's consumption fence, after the `consumed` flag
/// is durably set. The fence is one-way: a hook failure is logged and
/// reported but never rolls the flag back, so implementations must
/// tolerate at-least-once invocation — hand real side effects to the
/// dispatch queue rather than doing them inline.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_complete(&self, actionset: &ActionSet) -> FlowResult<()>;
}

struct WorkflowEntry {
    builder: Arc<dyn ActionSetBuilder>,
    hook: Arc<dyn CompletionHook>,
}

/// Name-keyed lookup of builder/hook pairs, populated at process start.
#[derive(Default)]
pub struct WorkflowRegistry {
    entries: HashMap<String, WorkflowEntry>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow. Re-registering a name replaces the previous
    /// pair; startup wiring is expected to register each name once.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: Arc<dyn ActionSetBuilder>,
        hook: Arc<dyn CompletionHook>,
    ) {
        let name = name.into();
        if self
            .entries
            .insert(name.clone(), WorkflowEntry { builder, hook })
            .is_some()
        {
            tracing::warn!(workflow = %name, "workflow re-registered, replacing previous pair");
        }
    }

    /// Resolve the builder for a workflow name. An unknown name is a
    /// wiring problem, not a runtime condition.
    pub fn builder(&self, name: &str) -> FlowResult<Arc<dyn ActionSetBuilder>> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.builder))
            .ok_or_else(|| FlowError::UnknownWorkflow(name.to_string()))
    }

    /// Resolve the completion hook for a workflow name.
    pub fn hook(&self, name: &str) -> FlowResult<Arc<dyn CompletionHook>> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.hook))
            .ok_or_else(|| FlowError::UnknownWorkflow(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered workflow names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::ActionSpec;

    struct FakeBuilder;

    #[async_trait]
    impl ActionSetBuilder for FakeBuilder {
        async fn build(&self, caller: &PrincipalId, _args: Value) -> FlowResult<ActionSetDraft> {
            Ok(ActionSetDraft::new()
                .with_action(ActionSpec::input("details", "edit"))
                .grant(caller.clone(), "owner"))
        }
    }

    struct FakeHook;

    #[async_trait]
    impl CompletionHook for FakeHook {
        async fn on_complete(&self, _actionset: &ActionSet) -> FlowResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let mut registry = WorkflowRegistry::new();
        registry.register("event_create", Arc::new(FakeBuilder), Arc::new(FakeHook));

        assert!(registry.contains("event_create"));
        assert_eq!(registry.count(), 1);

        let builder = registry.builder("event_create").unwrap();
        let draft = builder
            .build(&PrincipalId::new("u1"), Value::Null)
            .await
            .unwrap();
        assert_eq!(draft.actions.len(), 1);

        assert!(registry.hook("event_create").is_ok());
    }

    #[tokio::test]
    async fn test_unknown_name() {
        let registry = WorkflowRegistry::new();
        assert!(matches!(
            registry.builder("ghost"),
            Err(FlowError::UnknownWorkflow(_))
        ));
        assert!(matches!(
            registry.hook("ghost"),
            Err(FlowError::UnknownWorkflow(_))
        ));
    }

    #[test]
    fn test_names() {
        let mut registry = WorkflowRegistry::new();
        registry.register("a", Arc::new(FakeBuilder), Arc::new(FakeHook));
        registry.register("b", Arc::new(FakeBuilder), Arc::new(FakeHook));
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }
}
