//! In-memory reference implementation of the Turnstile storage traits.
//!
//! Deterministic and test-friendly. Conditional writes are checked under
//! the write lock, which makes them linearizable per key — the property
//! the consumption fence and the grant caps depend on. Production
//! deployments use a transactional backend behind the same traits.

use crate::model::Job;
use crate::traits::{ActionSetStore, GrantStore, JobQueue, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use flow_types::{ActionSet, ActionSetId};
use rights_types::EntityGrants;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// In-memory storage adapter.
#[derive(Default)]
pub struct InMemoryFlowStorage {
    actionsets: RwLock<HashMap<ActionSetId, ActionSet>>,
    grants: RwLock<HashMap<(String, String), EntityGrants>>,
}

impl InMemoryFlowStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionSetStore for InMemoryFlowStorage {
    async fn insert_actionset(&self, set: ActionSet) -> StorageResult<()> {
        let mut guard = self
            .actionsets
            .write()
            .map_err(|_| StorageError::Backend("actionsets lock poisoned".to_string()))?;

        if guard.contains_key(&set.id) {
            return Err(StorageError::Conflict(format!(
                "actionset {} already exists",
                set.id
            )));
        }
        guard.insert(set.id.clone(), set);
        Ok(())
    }

    async fn get_actionset(&self, id: &ActionSetId) -> StorageResult<Option<ActionSet>> {
        let guard = self
            .actionsets
            .read()
            .map_err(|_| StorageError::Backend("actionsets lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn put_actionset_if(
        &self,
        set: ActionSet,
        expected_version: u64,
    ) -> StorageResult<()> {
        let mut guard = self
            .actionsets
            .write()
            .map_err(|_| StorageError::Backend("actionsets lock poisoned".to_string()))?;

        let stored = guard
            .get_mut(&set.id)
            .ok_or_else(|| StorageError::NotFound(format!("actionset {} not found", set.id)))?;

        if stored.version != expected_version {
            return Err(StorageError::Conflict(format!(
                "actionset {} is at version {}, expected {}",
                set.id, stored.version, expected_version
            )));
        }
        *stored = set;
        Ok(())
    }

    async fn list_actionsets(&self, window: QueryWindow) -> StorageResult<Vec<ActionSet>> {
        let guard = self
            .actionsets
            .read()
            .map_err(|_| StorageError::Backend("actionsets lock poisoned".to_string()))?;

        let mut sets: Vec<ActionSet> = guard.values().cloned().collect();
        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = if window.limit == 0 {
            sets.len()
        } else {
            window.limit
        };
        Ok(sets.into_iter().skip(window.offset).take(limit).collect())
    }
}

#[async_trait]
impl GrantStore for InMemoryFlowStorage {
    async fn get_entity_grants(
        &self,
        entity_type: &str,
        entity_value: &str,
    ) -> StorageResult<Option<EntityGrants>> {
        let guard = self
            .grants
            .read()
            .map_err(|_| StorageError::Backend("grants lock poisoned".to_string()))?;
        Ok(guard
            .get(&(entity_type.to_string(), entity_value.to_string()))
            .cloned())
    }

    async fn put_entity_grants_if(
        &self,
        grants: EntityGrants,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        let mut guard = self
            .grants
            .write()
            .map_err(|_| StorageError::Backend("grants lock poisoned".to_string()))?;

        let key = (grants.entity_type.clone(), grants.entity_value.clone());
        match (guard.get(&key), expected_version) {
            (None, None) => {
                guard.insert(key, grants);
                Ok(())
            }
            (None, Some(_)) => Err(StorageError::NotFound(format!(
                "no grants for {}/{}",
                key.0, key.1
            ))),
            (Some(_), None) => Err(StorageError::Conflict(format!(
                "grants for {}/{} already exist",
                key.0, key.1
            ))),
            (Some(stored), Some(expected)) => {
                if stored.version != expected {
                    return Err(StorageError::Conflict(format!(
                        "grants for {}/{} are at version {}, expected {}",
                        key.0, key.1, stored.version, expected
                    )));
                }
                guard.insert(key, grants);
                Ok(())
            }
        }
    }
}

/// In-memory at-least-once queue. Tests drain it to observe what a
/// lifecycle implementation dispatched.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued job, leaving the queue empty.
    pub fn drain(&self) -> Vec<Job> {
        match self.jobs.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> StorageResult<()> {
        let mut guard = self
            .jobs
            .lock()
            .map_err(|_| StorageError::Backend("queue lock poisoned".to_string()))?;
        guard.push(job);
        Ok(())
    }
}
