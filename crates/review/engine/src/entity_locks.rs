//! Per-entity locks
//!
//! Writes for one entity serialize behind an async mutex; writes for
//! different entities never contend. Waiting is bounded, and a caller that
//! cannot get the lock in time gets `PersistenceConflict`.

use review_types::{ReviewError, ReviewResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle lock entries are pruned once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

type EntityKey = (String, String);

#[derive(Debug)]
pub struct EntityLocks {
    locks: Mutex<HashMap<EntityKey, Arc<Mutex<()>>>>,
    wait: Duration,
}

impl EntityLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    /// Hold the entity's lock until the guard drops
    pub async fn acquire(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> ReviewResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks
                .entry((entity_type.to_string(), entity_id.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        tokio::time::timeout(self.wait, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(entity_type, entity_id, "Entity lock wait timed out");
                ReviewError::PersistenceConflict {
                    entity_type: entity_type.to_string(),
                    entity_id: entity_id.to_string(),
                }
            })
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_entity_serializes() {
        let locks = EntityLocks::new(Duration::from_millis(50));
        let guard = locks.acquire("agent", "a-1").await.unwrap();
        let err = locks.acquire("agent", "a-1").await.unwrap_err();
        assert!(matches!(err, ReviewError::PersistenceConflict { .. }));
        drop(guard);
        assert!(locks.acquire("agent", "a-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_different_entities_independent() {
        let locks = EntityLocks::new(Duration::from_millis(50));
        let _a = locks.acquire("agent", "a-1").await.unwrap();
        let _b = locks.acquire("agent", "a-2").await.unwrap();
        let _c = locks.acquire("vendor", "a-1").await.unwrap();
        assert_eq!(locks.tracked().await, 3);
    }
}
