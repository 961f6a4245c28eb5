//! Rights domain types for Turnstile
//!
//! Rights are declared statically per *entity type* (events, categories,
//! carts, actionsets, …) and granted per *entity instance* to principals.
//! The static side is [`RightsConfig`]: a vocabulary of named rights with
//! holder caps, grant-edit delegation, public bypass, and `count_as`
//! implication. The persisted side is [`EntityGrants`]: one page of
//! [`GrantRow`]s per entity instance, mutated under a single
//! compare-and-set version so cap checks stay atomic.

#![deny(unsafe_code)]

pub mod config;
pub mod grant;

mod error;

pub use config::{RightSpec, RightsConfig, RightsConfigError};
pub use error::{RightsError, RightsResult};
pub use grant::{EntityGrants, GrantRow};

use serde::{Deserialize, Serialize};

// ── Principal Identifier ─────────────────────────────────────────────

/// A principal — the subject of rights checks and grants. Principals are
/// minted by the identity layer; this core only carries their ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_id() {
        let id = PrincipalId::new("user-1");
        assert_eq!(id.as_str(), "user-1");
        assert_eq!(format!("{}", id), "user-1");
    }
}
