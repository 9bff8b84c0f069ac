//! Approval instance storage
//!
//! Commits are optimistic: the caller states the version it planned
//! against and the store refuses the write if another writer got there
//! first. The instance and the entity status land in the same write.

use async_trait::async_trait;
use review_types::{ApprovalInstance, ReviewError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("An open instance already exists")]
    AlreadyOpen,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn into_review(self, entity_type: &str, entity_id: &str) -> ReviewError {
        match self {
            Self::VersionConflict { .. } => ReviewError::PersistenceConflict {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            },
            Self::AlreadyOpen => ReviewError::InstanceAlreadyOpen {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            },
            Self::Backend(msg) => ReviewError::Storage(msg),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One atomic write: the instance plus the entity's new status
#[derive(Clone, Debug)]
pub struct TransitionCommit {
    pub instance: ApprovalInstance,
    /// Version the change was planned against; 0 for a new instance
    pub expected_version: u64,
    pub entity_status: String,
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Most recent instance for the entity
    async fn latest(&self, entity_type: &str, entity_id: &str)
        -> StorageResult<Option<ApprovalInstance>>;

    /// Every instance for the entity, oldest first
    async fn history(&self, entity_type: &str, entity_id: &str)
        -> StorageResult<Vec<ApprovalInstance>>;

    /// Write the commit, returning the stored instance with its new version
    async fn commit(&self, commit: TransitionCommit) -> StorageResult<ApprovalInstance>;

    async fn entity_status(&self, entity_type: &str, entity_id: &str)
        -> StorageResult<Option<String>>;

    /// Instances that have not reached a terminal status
    async fn open_instances(&self) -> StorageResult<Vec<ApprovalInstance>>;
}

#[derive(Debug, Default)]
struct EntityRecord {
    instances: Vec<ApprovalInstance>,
    status: Option<String>,
}

type EntityKey = (String, String);

/// In-memory store for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstanceStore {
    entities: Arc<RwLock<HashMap<EntityKey, EntityRecord>>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(entity_type: &str, entity_id: &str) -> EntityKey {
    (entity_type.to_string(), entity_id.to_string())
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn latest(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<Option<ApprovalInstance>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&key(entity_type, entity_id))
            .and_then(|r| r.instances.last().cloned()))
    }

    async fn history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<Vec<ApprovalInstance>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&key(entity_type, entity_id))
            .map(|r| r.instances.clone())
            .unwrap_or_default())
    }

    async fn commit(&self, commit: TransitionCommit) -> StorageResult<ApprovalInstance> {
        let mut entities = self.entities.write().await;
        let record = entities
            .entry(key(&commit.instance.entity_type, &commit.instance.entity_id))
            .or_default();

        let mut stored = commit.instance;
        match record.instances.last_mut() {
            Some(latest) if latest.id == stored.id => {
                if latest.version != commit.expected_version {
                    return Err(StorageError::VersionConflict {
                        expected: commit.expected_version,
                        found: latest.version,
                    });
                }
                stored.version = commit.expected_version + 1;
                *latest = stored.clone();
            }
            Some(latest) if latest.is_open() => return Err(StorageError::AlreadyOpen),
            _ => {
                if commit.expected_version != 0 {
                    return Err(StorageError::VersionConflict {
                        expected: commit.expected_version,
                        found: 0,
                    });
                }
                stored.version = 1;
                record.instances.push(stored.clone());
            }
        }
        record.status = Some(commit.entity_status);
        Ok(stored)
    }

    async fn entity_status(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<Option<String>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&key(entity_type, entity_id))
            .and_then(|r| r.status.clone()))
    }

    async fn open_instances(&self) -> StorageResult<Vec<ApprovalInstance>> {
        let entities = self.entities.read().await;
        Ok(entities
            .values()
            .filter_map(|r| r.instances.last())
            .filter(|i| i.is_open())
            .cloned()
            .collect())
    }
}
