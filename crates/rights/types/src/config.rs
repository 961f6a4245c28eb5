//! Static rights configuration
//!
//! One declaration per protected entity type, not per instance. The
//! configuration is assembled at process start and validated once:
//! `count_as` targets must exist and the implication relation must be
//! acyclic. Request-time code never re-validates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// ── Right descriptor ─────────────────────────────────────────────────

/// Declaration of a single named right on an entity type
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RightSpec {
    /// Cap on how many grantees may simultaneously hold this right on
    /// one entity instance. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Holders may grant and revoke rights on the same entity
    #[serde(default)]
    pub can_edit_rights: bool,
    /// No grant required — any caller passes the check
    #[serde(default)]
    pub public: bool,
    /// Rights implicitly granted alongside this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub count_as: Vec<String>,
}

impl RightSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of simultaneous holders
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Let holders grant/revoke rights on the entity
    pub fn with_edit_rights(mut self) -> Self {
        self.can_edit_rights = true;
        self
    }

    /// Mark the right public: checks pass without any grant
    pub fn with_public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Declare that holding this right also grants `right`
    pub fn counts_as(mut self, right: impl Into<String>) -> Self {
        self.count_as.push(right.into());
        self
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// The full static rights declaration: entity type → right name → spec
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RightsConfig {
    entities: BTreeMap<String, BTreeMap<String, RightSpec>>,
}

impl RightsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a right on an entity type
    pub fn declare(
        mut self,
        entity_type: impl Into<String>,
        right: impl Into<String>,
        spec: RightSpec,
    ) -> Self {
        self.entities
            .entry(entity_type.into())
            .or_default()
            .insert(right.into(), spec);
        self
    }

    /// All rights declared for an entity type
    pub fn rights_for(&self, entity_type: &str) -> Option<&BTreeMap<String, RightSpec>> {
        self.entities.get(entity_type)
    }

    /// Look up one right's spec
    pub fn spec(&self, entity_type: &str, right: &str) -> Option<&RightSpec> {
        self.entities.get(entity_type).and_then(|r| r.get(right))
    }

    /// Declared entity types
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Whether any right on the entity type is public
    pub fn any_public(&self, entity_type: &str) -> bool {
        self.entities
            .get(entity_type)
            .map(|rights| rights.values().any(|s| s.public))
            .unwrap_or(false)
    }

    /// Validate the whole declaration: every `count_as` target must be
    /// declared on the same entity type, and the implication relation
    /// must be acyclic. Called once at startup; violations are fatal.
    pub fn validate(&self) -> Result<(), RightsConfigError> {
        for (entity_type, rights) in &self.entities {
            for (name, spec) in rights {
                for target in &spec.count_as {
                    if !rights.contains_key(target) {
                        return Err(RightsConfigError::UnknownCountAsTarget {
                            entity_type: entity_type.clone(),
                            right: name.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
            for name in rights.keys() {
                let mut path = Vec::new();
                Self::walk_for_cycle(rights, name, name, &mut path).map_err(|cycle| {
                    RightsConfigError::CountAsCycle {
                        entity_type: entity_type.clone(),
                        path: cycle,
                    }
                })?;
            }
        }
        Ok(())
    }

    fn walk_for_cycle(
        rights: &BTreeMap<String, RightSpec>,
        origin: &str,
        current: &str,
        path: &mut Vec<String>,
    ) -> Result<(), String> {
        path.push(current.to_string());
        if let Some(spec) = rights.get(current) {
            for target in &spec.count_as {
                if target == origin {
                    path.push(target.clone());
                    return Err(path.join(" -> "));
                }
                if path.iter().any(|seen| seen == target) {
                    // A cycle not through `origin`; it will be reported
                    // when validation walks from its own origin.
                    continue;
                }
                Self::walk_for_cycle(rights, origin, target, path)?;
            }
        }
        path.pop();
        Ok(())
    }

    /// The transitive implication closure of one right, excluding the
    /// right itself. Meaningful only on a validated (acyclic) config.
    pub fn closure_of(&self, entity_type: &str, right: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let Some(rights) = self.entities.get(entity_type) else {
            return closure;
        };
        let mut stack: Vec<&str> = match rights.get(right) {
            Some(spec) => spec.count_as.iter().map(String::as_str).collect(),
            None => return closure,
        };
        while let Some(current) = stack.pop() {
            if current == right || !closure.insert(current.to_string()) {
                continue;
            }
            if let Some(spec) = rights.get(current) {
                stack.extend(spec.count_as.iter().map(String::as_str));
            }
        }
        closure
    }
}

// ── Errors ───────────────────────────────────────────────────────────

/// Fatal configuration errors, detected once at startup
#[derive(Debug, Error)]
pub enum RightsConfigError {
    #[error("right '{right}' on entity type '{entity_type}' lists unknown countAs target '{target}'")]
    UnknownCountAsTarget {
        entity_type: String,
        right: String,
        target: String,
    },

    #[error("countAs cycle on entity type '{entity_type}': {path}")]
    CountAsCycle { entity_type: String, path: String },
}
