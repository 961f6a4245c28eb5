//! Capability-based authorization engine for Turnstile.
//!
//! Answers "can principal P perform right R on entity (type, id)?" and
//! mutates grants. Rights are declared statically per entity type
//! ([`RightsConfig`]); grants are persisted per entity instance as one
//! page mutated under a compare-and-set version, so a holder-cap check
//! and the write it guards are atomic.
//!
//! The `count_as` implication closure is computed once at construction;
//! a cycle in the static declaration is a configuration error that
//! stops startup, never a request-time failure.

#![deny(unsafe_code)]

use rights_types::{
    EntityGrants, GrantRow, PrincipalId, RightSpec, RightsConfig, RightsConfigError, RightsError,
    RightsResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use turnstile_storage::{GrantStore, StorageError};

/// Upper bound on conditional-write retries before the operation is
/// reported as a storage failure.
const MAX_CAS_RETRIES: usize = 8;

/// The rights engine: one per process, shared by every workflow.
pub struct RightsEngine {
    config: RightsConfig,
    /// entity type → right → transitive `count_as` closure
    closures: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    store: Arc<dyn GrantStore>,
}

impl RightsEngine {
    /// Build the engine, validating the configuration and precomputing
    /// every implication closure. Fails fast on a cyclic or dangling
    /// `count_as` declaration — callers must treat that as fatal.
    pub fn new(
        config: RightsConfig,
        store: Arc<dyn GrantStore>,
    ) -> Result<Self, RightsConfigError> {
        config.validate()?;

        let mut closures: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for entity_type in config.entity_types() {
            let mut per_right = BTreeMap::new();
            if let Some(rights) = config.rights_for(entity_type) {
                for right in rights.keys() {
                    per_right.insert(right.clone(), config.closure_of(entity_type, right));
                }
            }
            closures.insert(entity_type.to_string(), per_right);
        }

        Ok(Self {
            config,
            closures,
            store,
        })
    }

    /// The static configuration this engine was built from
    pub fn config(&self) -> &RightsConfig {
        &self.config
    }

    /// Whether any right on the entity type is declared public
    pub fn any_public_right(&self, entity_type: &str) -> bool {
        self.config.any_public(entity_type)
    }

    // ── Checks ───────────────────────────────────────────────────────

    /// Can `principal` perform `right` on the given entity instance?
    ///
    /// Public rights pass without a grant row. Otherwise the principal
    /// must hold the right directly, or hold some right whose
    /// `count_as` closure includes it.
    pub async fn check(
        &self,
        principal: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        right: &str,
    ) -> RightsResult<bool> {
        let spec = self.spec(entity_type, right)?;
        if spec.public {
            return Ok(true);
        }

        let page = self.load(entity_type, entity_value).await?;
        let Some(row) = page.as_ref().and_then(|p| p.row(principal)) else {
            return Ok(false);
        };
        Ok(self.row_grants(entity_type, row, right))
    }

    /// Whether the principal holds *any* right on the entity instance.
    /// Used by fetch-style visibility checks.
    pub async fn holds_any_right(
        &self,
        principal: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
    ) -> RightsResult<bool> {
        let page = self.load(entity_type, entity_value).await?;
        Ok(page
            .as_ref()
            .and_then(|p| p.row(principal))
            .map(|row| row.held_rights().next().is_some())
            .unwrap_or(false))
    }

    /// Whether the actor may grant/revoke rights on the entity: some
    /// effective right of theirs must be declared `can_edit_rights`.
    pub async fn can_edit_rights(
        &self,
        actor: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
    ) -> RightsResult<bool> {
        let page = self.load(entity_type, entity_value).await?;
        Ok(page
            .as_ref()
            .and_then(|p| p.row(actor))
            .map(|row| self.row_can_edit(entity_type, row))
            .unwrap_or(false))
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Grant `right` to `grantee`, authorized by `actor`.
    ///
    /// Granting also sets every right in the `count_as` closure on the
    /// same row. The holder cap governs direct grants of the named
    /// right only: implied rights are written without checking *their*
    /// caps (the asymmetry documented in DESIGN.md).
    pub async fn grant(
        &self,
        actor: &PrincipalId,
        grantee: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        right: &str,
    ) -> RightsResult<()> {
        let spec = self.spec(entity_type, right)?.clone();
        let closure = self.closure(entity_type, right);

        for _ in 0..MAX_CAS_RETRIES {
            let (mut page, expected) = self.load_page(entity_type, entity_value).await?;

            let authorized = page
                .row(actor)
                .map(|row| self.row_can_edit(entity_type, row))
                .unwrap_or(false);
            if !authorized {
                return Err(RightsError::Unauthorized);
            }

            if let Some(cap) = spec.count {
                let already_holds = page.row(grantee).map(|r| r.holds(right)).unwrap_or(false);
                if !already_holds && page.holders_of(right) as u32 >= cap {
                    return Err(RightsError::LimitExceeded {
                        right: right.to_string(),
                        cap,
                    });
                }
            }

            let now = chrono::Utc::now();
            let row = page.row_mut_or_insert(grantee.clone(), now);
            row.set(right, true, now);
            for implied in &closure {
                row.set(implied.clone(), true, now);
            }
            page.version += 1;

            match self.store.put_entity_grants_if(page, expected).await {
                Ok(()) => {
                    tracing::debug!(
                        grantee = %grantee,
                        entity_type,
                        entity_value,
                        right,
                        "right granted"
                    );
                    return Ok(());
                }
                Err(StorageError::Conflict(_)) => continue,
                Err(err) => return Err(RightsError::Storage(err.to_string())),
            }
        }
        Err(RightsError::Storage(
            "conditional write retries exhausted".to_string(),
        ))
    }

    /// Revoke `right` from `grantee`, authorized by `actor`.
    ///
    /// Clears the single boolean. Implied rights granted alongside it
    /// are untouched, and the row itself is never deleted.
    pub async fn revoke(
        &self,
        actor: &PrincipalId,
        grantee: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        right: &str,
    ) -> RightsResult<()> {
        self.spec(entity_type, right)?;

        for _ in 0..MAX_CAS_RETRIES {
            let (mut page, expected) = self.load_page(entity_type, entity_value).await?;

            let authorized = page
                .row(actor)
                .map(|row| self.row_can_edit(entity_type, row))
                .unwrap_or(false);
            if !authorized {
                return Err(RightsError::Unauthorized);
            }

            let now = chrono::Utc::now();
            if let Some(pos) = page.rows.iter().position(|r| &r.grantee == grantee) {
                page.rows[pos].set(right, false, now);
            } else {
                // Nothing to clear; the revoke is a no-op.
                return Ok(());
            }
            page.version += 1;

            match self.store.put_entity_grants_if(page, expected).await {
                Ok(()) => {
                    tracing::debug!(
                        grantee = %grantee,
                        entity_type,
                        entity_value,
                        right,
                        "right revoked"
                    );
                    return Ok(());
                }
                Err(StorageError::Conflict(_)) => continue,
                Err(err) => return Err(RightsError::Storage(err.to_string())),
            }
        }
        Err(RightsError::Storage(
            "conditional write retries exhausted".to_string(),
        ))
    }

    /// The entity-creation bootstrap: write initial grants with no
    /// acting principal and no cap checks. Only entity constructors
    /// (e.g. the flow engine materializing a builder draft) call this.
    pub async fn bootstrap_grant(
        &self,
        grantee: &PrincipalId,
        entity_type: &str,
        entity_value: &str,
        rights: &[String],
    ) -> RightsResult<()> {
        for right in rights {
            self.spec(entity_type, right)?;
        }

        for _ in 0..MAX_CAS_RETRIES {
            let (mut page, expected) = self.load_page(entity_type, entity_value).await?;

            let now = chrono::Utc::now();
            let closures: Vec<BTreeSet<String>> = rights
                .iter()
                .map(|right| self.closure(entity_type, right))
                .collect();
            let row = page.row_mut_or_insert(grantee.clone(), now);
            for (right, closure) in rights.iter().zip(&closures) {
                row.set(right.clone(), true, now);
                for implied in closure {
                    row.set(implied.clone(), true, now);
                }
            }
            page.version += 1;

            match self.store.put_entity_grants_if(page, expected).await {
                Ok(()) => {
                    tracing::debug!(
                        grantee = %grantee,
                        entity_type,
                        entity_value,
                        "bootstrap grants written"
                    );
                    return Ok(());
                }
                Err(StorageError::Conflict(_)) => continue,
                Err(err) => return Err(RightsError::Storage(err.to_string())),
            }
        }
        Err(RightsError::Storage(
            "conditional write retries exhausted".to_string(),
        ))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn spec(&self, entity_type: &str, right: &str) -> RightsResult<&RightSpec> {
        let rights = self
            .config
            .rights_for(entity_type)
            .ok_or_else(|| RightsError::UnknownEntityType(entity_type.to_string()))?;
        rights.get(right).ok_or_else(|| RightsError::UnknownRight {
            entity_type: entity_type.to_string(),
            right: right.to_string(),
        })
    }

    fn closure(&self, entity_type: &str, right: &str) -> BTreeSet<String> {
        self.closures
            .get(entity_type)
            .and_then(|per_right| per_right.get(right))
            .cloned()
            .unwrap_or_default()
    }

    /// Does this row grant `right`, directly or through a closure?
    fn row_grants(&self, entity_type: &str, row: &GrantRow, right: &str) -> bool {
        if row.holds(right) {
            return true;
        }
        row.held_rights().any(|held| {
            self.closures
                .get(entity_type)
                .and_then(|per_right| per_right.get(held))
                .map(|closure| closure.contains(right))
                .unwrap_or(false)
        })
    }

    /// Does any effective right on this row carry `can_edit_rights`?
    fn row_can_edit(&self, entity_type: &str, row: &GrantRow) -> bool {
        let Some(rights) = self.config.rights_for(entity_type) else {
            return false;
        };
        rights
            .iter()
            .filter(|(_, spec)| spec.can_edit_rights)
            .any(|(name, _)| self.row_grants(entity_type, row, name))
    }

    async fn load(
        &self,
        entity_type: &str,
        entity_value: &str,
    ) -> RightsResult<Option<EntityGrants>> {
        self.store
            .get_entity_grants(entity_type, entity_value)
            .await
            .map_err(|err| RightsError::Storage(err.to_string()))
    }

    /// Load the page for mutation, returning the expected version for
    /// the conditional write (`None` when the page is new).
    async fn load_page(
        &self,
        entity_type: &str,
        entity_value: &str,
    ) -> RightsResult<(EntityGrants, Option<u64>)> {
        match self.load(entity_type, entity_value).await? {
            Some(page) => {
                let version = page.version;
                Ok((page, Some(version)))
            }
            None => Ok((EntityGrants::new(entity_type, entity_value), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rights_types::RightSpec;
    use turnstile_storage::memory::InMemoryFlowStorage;

    fn config() -> RightsConfig {
        RightsConfig::new()
            .declare(
                "event",
                "owner",
                RightSpec::new()
                    .with_count(1)
                    .with_edit_rights()
                    .counts_as("admin"),
            )
            .declare(
                "event",
                "admin",
                RightSpec::new().with_count(3).counts_as("edit"),
            )
            .declare("event", "edit", RightSpec::new())
            .declare("category", "route_search", RightSpec::new().with_public())
    }

    fn engine() -> RightsEngine {
        RightsEngine::new(config(), Arc::new(InMemoryFlowStorage::new())).unwrap()
    }

    fn principal(id: &str) -> PrincipalId {
        PrincipalId::new(id)
    }

    #[test]
    fn test_cyclic_config_is_fatal() {
        let bad = RightsConfig::new()
            .declare("event", "a", RightSpec::new().counts_as("b"))
            .declare("event", "b", RightSpec::new().counts_as("a"));
        let result = RightsEngine::new(bad, Arc::new(InMemoryFlowStorage::new()));
        assert!(matches!(result, Err(RightsConfigError::CountAsCycle { .. })));
    }

    #[tokio::test]
    async fn test_public_right_bypasses_grants() {
        let engine = engine();
        // No grant row exists at all.
        assert!(engine
            .check(&principal("anyone"), "category", "cat-1", "route_search")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_check_without_grant_denies() {
        let engine = engine();
        assert!(!engine
            .check(&principal("u1"), "event", "ev-1", "edit")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unknown_right_is_an_error() {
        let engine = engine();
        assert!(matches!(
            engine.check(&principal("u1"), "event", "ev-1", "ghost").await,
            Err(RightsError::UnknownRight { .. })
        ));
        assert!(matches!(
            engine.check(&principal("u1"), "venue", "v-1", "owner").await,
            Err(RightsError::UnknownEntityType(_))
        ));
    }

    #[tokio::test]
    async fn test_count_as_is_transitive() {
        let engine = engine();
        let owner = principal("u1");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();

        // owner → admin → edit, with no separate grants.
        assert!(engine.check(&owner, "event", "ev-1", "owner").await.unwrap());
        assert!(engine.check(&owner, "event", "ev-1", "admin").await.unwrap());
        assert!(engine.check(&owner, "event", "ev-1", "edit").await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_requires_edit_rights() {
        let engine = engine();
        let owner = principal("u1");
        let outsider = principal("u2");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();

        // The outsider holds nothing and cannot grant.
        assert!(matches!(
            engine
                .grant(&outsider, &outsider, "event", "ev-1", "edit")
                .await,
            Err(RightsError::Unauthorized)
        ));

        // The owner can.
        engine
            .grant(&owner, &outsider, "event", "ev-1", "edit")
            .await
            .unwrap();
        assert!(engine
            .check(&outsider, "event", "ev-1", "edit")
            .await
            .unwrap());

        // Holding plain `edit` does not confer grant powers.
        assert!(matches!(
            engine
                .grant(&outsider, &principal("u3"), "event", "ev-1", "edit")
                .await,
            Err(RightsError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_count_cap_enforced() {
        let engine = engine();
        let owner = principal("u1");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();

        // `owner` is capped at one holder and u1 already holds it.
        let result = engine
            .grant(&owner, &principal("u2"), "event", "ev-1", "owner")
            .await;
        assert!(matches!(
            result,
            Err(RightsError::LimitExceeded { cap: 1, .. })
        ));

        // Re-granting to the existing holder is not a new holder.
        engine
            .grant(&owner, &owner, "event", "ev-1", "owner")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_implied_grant_bypasses_its_own_cap() {
        let engine = engine();
        let owner = principal("u1");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();

        // `admin` is capped at 3. Fill the cap with direct grants...
        for grantee in ["u2", "u3"] {
            engine
                .grant(&owner, &principal(grantee), "event", "ev-1", "admin")
                .await
                .unwrap();
        }
        // (owner already holds admin via bootstrap closure → 3 holders)
        assert!(matches!(
            engine
                .grant(&owner, &principal("u4"), "event", "ev-1", "admin")
                .await,
            Err(RightsError::LimitExceeded { .. })
        ));

        // ...but a right that *implies* admin is not stopped by admin's
        // cap. The grant below writes admin=true on a fourth row.
        let relaxed = RightsConfig::new()
            .declare(
                "event",
                "owner",
                RightSpec::new().with_edit_rights().counts_as("admin"),
            )
            .declare("event", "admin", RightSpec::new().with_count(1))
            .declare("event", "edit", RightSpec::new());
        let engine = RightsEngine::new(relaxed, Arc::new(InMemoryFlowStorage::new())).unwrap();
        let owner = principal("u1");
        engine
            .bootstrap_grant(&owner, "event", "ev-2", &["owner".to_string()])
            .await
            .unwrap();
        // admin cap (1) is already filled by the owner's implied grant,
        // yet granting `owner` to u2 succeeds and implies admin again.
        engine
            .grant(&owner, &principal("u2"), "event", "ev-2", "owner")
            .await
            .unwrap();
        assert!(engine
            .check(&principal("u2"), "event", "ev-2", "admin")
            .await
            .unwrap());
        // A *direct* grant of admin now fails: the cap counts all rows
        // holding the flag, implied ones included.
        assert!(matches!(
            engine
                .grant(&owner, &principal("u3"), "event", "ev-2", "admin")
                .await,
            Err(RightsError::LimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_revoke_clears_only_the_named_right() {
        let engine = engine();
        let owner = principal("u1");
        let grantee = principal("u2");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();
        engine
            .grant(&owner, &grantee, "event", "ev-1", "admin")
            .await
            .unwrap();
        assert!(engine.check(&grantee, "event", "ev-1", "edit").await.unwrap());

        engine
            .revoke(&owner, &grantee, "event", "ev-1", "admin")
            .await
            .unwrap();
        assert!(!engine
            .check(&grantee, "event", "ev-1", "admin")
            .await
            .unwrap());

        // The implied `edit` flag written at grant time is untouched.
        assert!(engine.check(&grantee, "event", "ev-1", "edit").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_missing_row_is_noop() {
        let engine = engine();
        let owner = principal("u1");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();
        engine
            .revoke(&owner, &principal("ghost"), "event", "ev-1", "edit")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_holds_any_right() {
        let engine = engine();
        let owner = principal("u1");
        assert!(!engine
            .holds_any_right(&owner, "event", "ev-1")
            .await
            .unwrap());

        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["edit".to_string()])
            .await
            .unwrap();
        assert!(engine
            .holds_any_right(&owner, "event", "ev-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_capped_grants_admit_exactly_one() {
        // Two concurrent grants race for a count=1 right on the same
        // entity. The entity-page CAS admits exactly one.
        let store = Arc::new(InMemoryFlowStorage::new());
        let cap_config = RightsConfig::new()
            .declare("event", "owner", RightSpec::new().with_edit_rights())
            .declare("event", "head_steward", RightSpec::new().with_count(1));
        let engine = Arc::new(RightsEngine::new(cap_config, store).unwrap());
        let owner = principal("u1");
        engine
            .bootstrap_grant(&owner, "event", "ev-1", &["owner".to_string()])
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = Arc::clone(&engine);
            let owner = owner.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .grant(
                        &owner,
                        &principal(&format!("steward-{}", i)),
                        "event",
                        "ev-1",
                        "head_steward",
                    )
                    .await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    // ── Property: the cap invariant holds for any grant sequence ─────

    proptest! {
        #[test]
        fn property_cap_never_exceeded(grantees in proptest::collection::vec(0u8..6, 1..24)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            rt.block_on(async move {
                let cap_config = RightsConfig::new()
                    .declare("event", "owner", RightSpec::new().with_edit_rights())
                    .declare("event", "head_steward", RightSpec::new().with_count(2));
                let store = Arc::new(InMemoryFlowStorage::new());
                let engine = RightsEngine::new(cap_config, Arc::clone(&store) as Arc<dyn GrantStore>)
                    .expect("config");
                let owner = PrincipalId::new("owner");
                engine
                    .bootstrap_grant(&owner, "event", "ev-p", &["owner".to_string()])
                    .await
                    .expect("bootstrap");

                for g in grantees {
                    let grantee = PrincipalId::new(format!("u{}", g));
                    // Every individual grant may pass or hit the cap;
                    // the invariant is on the stored page below.
                    let _ = engine
                        .grant(&owner, &grantee, "event", "ev-p", "head_steward")
                        .await;
                }

                let page = store
                    .get_entity_grants("event", "ev-p")
                    .await
                    .expect("read")
                    .expect("page");
                assert!(page.holders_of("head_steward") <= 2);
            });
        }
    }
}
