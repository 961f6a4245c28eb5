//! Persisted grant records
//!
//! Grants are stored as one page per entity instance. The page carries a
//! single version used for conditional writes: the holder cap is a
//! cross-row invariant, so counting and writing must be atomic per
//! entity, not per row. Rows are never deleted — a revoke clears the
//! boolean and leaves the record auditable.

use crate::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Grant row ────────────────────────────────────────────────────────

/// The grants one principal holds on one entity instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrantRow {
    /// Who holds the rights
    pub grantee: PrincipalId,
    /// Right name → granted flag. Cleared flags stay in the map.
    pub rights: BTreeMap<String, bool>,
    /// When the row was first created
    pub created_at: DateTime<Utc>,
    /// When the row was last touched
    pub updated_at: DateTime<Utc>,
}

impl GrantRow {
    pub fn new(grantee: PrincipalId, at: DateTime<Utc>) -> Self {
        Self {
            grantee,
            rights: BTreeMap::new(),
            created_at: at,
            updated_at: at,
        }
    }

    /// Whether the named right is currently set
    pub fn holds(&self, right: &str) -> bool {
        self.rights.get(right).copied().unwrap_or(false)
    }

    /// Set or clear a right flag
    pub fn set(&mut self, right: impl Into<String>, granted: bool, at: DateTime<Utc>) {
        self.rights.insert(right.into(), granted);
        self.updated_at = at;
    }

    /// Names of all rights currently set
    pub fn held_rights(&self) -> impl Iterator<Item = &str> {
        self.rights
            .iter()
            .filter(|(_, granted)| **granted)
            .map(|(name, _)| name.as_str())
    }
}

// ── Entity page ──────────────────────────────────────────────────────

/// All grant rows for one entity instance, mutated under one
/// compare-and-set version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityGrants {
    /// The protected entity's type (e.g. `"event"`, `"actionset"`)
    pub entity_type: String,
    /// The protected instance's id
    pub entity_value: String,
    /// One row per grantee that has ever been granted anything
    pub rows: Vec<GrantRow>,
    /// Conditional-write token, bumped on every successful write
    pub version: u64,
}

impl EntityGrants {
    pub fn new(entity_type: impl Into<String>, entity_value: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_value: entity_value.into(),
            rows: Vec::new(),
            version: 0,
        }
    }

    /// The row for a principal, if any grant was ever recorded
    pub fn row(&self, principal: &PrincipalId) -> Option<&GrantRow> {
        self.rows.iter().find(|r| &r.grantee == principal)
    }

    /// The row for a principal, created empty if absent
    pub fn row_mut_or_insert(
        &mut self,
        principal: PrincipalId,
        at: DateTime<Utc>,
    ) -> &mut GrantRow {
        let pos = match self.rows.iter().position(|r| r.grantee == principal) {
            Some(pos) => pos,
            None => {
                self.rows.push(GrantRow::new(principal, at));
                self.rows.len() - 1
            }
        };
        &mut self.rows[pos]
    }

    /// How many grantees currently hold the named right
    pub fn holders_of(&self, right: &str) -> usize {
        self.rows.iter().filter(|r| r.holds(right)).count()
    }
}
