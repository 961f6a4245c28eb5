use crate::model::Job;
use crate::StorageResult;
use async_trait::async_trait;
use flow_types::{ActionSet, ActionSetId};
use rights_types::EntityGrants;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for actionset records.
///
/// The conditional write is the single concurrency primitive the flow
/// engine relies on: two concurrent updates that both observe "all
/// actions now done" race on `put_actionset_if`, and exactly one wins.
#[async_trait]
pub trait ActionSetStore: Send + Sync {
    /// Insert a newly built actionset. Conflict if the id exists.
    async fn insert_actionset(&self, set: ActionSet) -> StorageResult<()>;

    /// Get one actionset by id.
    async fn get_actionset(&self, id: &ActionSetId) -> StorageResult<Option<ActionSet>>;

    /// Replace the stored record only if its current version equals
    /// `expected_version`. Returns `Conflict` otherwise.
    async fn put_actionset_if(&self, set: ActionSet, expected_version: u64)
        -> StorageResult<()>;

    /// List records newest-first.
    async fn list_actionsets(&self, window: QueryWindow) -> StorageResult<Vec<ActionSet>>;
}

/// Storage interface for rights grant pages.
///
/// Grants are keyed per entity instance and written as one page so that
/// holder-cap checks are atomic with the write that would violate them.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Get the grant page for one entity instance.
    async fn get_entity_grants(
        &self,
        entity_type: &str,
        entity_value: &str,
    ) -> StorageResult<Option<EntityGrants>>;

    /// Replace the page only if its stored version equals
    /// `expected_version`; `None` means the page must not exist yet.
    async fn put_entity_grants_if(
        &self,
        grants: EntityGrants,
        expected_version: Option<u64>,
    ) -> StorageResult<()>;
}

/// Unified storage bundle for backends serving the whole core.
pub trait FlowStorage: ActionSetStore + GrantStore + Send + Sync {}

impl<T> FlowStorage for T where T: ActionSetStore + GrantStore + Send + Sync {}

/// At-least-once dispatch collaborator used by lifecycle
/// implementations; the flow engine itself never enqueues.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> StorageResult<()>;
}
