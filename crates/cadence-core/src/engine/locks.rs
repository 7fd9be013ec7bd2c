use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of per-series write locks, keyed by `recurrence_group_id`.
///
/// Mutations of one series run one at a time; different series never
/// contend. Locks are created on first use and kept for the engine's lifetime.
#[derive(Debug, Default)]
pub struct SeriesLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Held while a series is being mutated. Dropping it releases the series.
pub type SeriesGuard = OwnedMutexGuard<()>;

impl SeriesLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, group_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(group_id).or_default().clone()
    }

    /// Waits until the series is free and takes it.
    pub async fn lock(&self, group_id: Uuid) -> SeriesGuard {
        self.handle(group_id).lock_owned().await
    }

    /// Takes several series at once, in ascending id order so that two
    /// callers locking overlapping sets cannot deadlock.
    pub async fn lock_many<I>(&self, group_ids: I) -> Vec<SeriesGuard>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let ordered: BTreeSet<Uuid> = group_ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for group_id in ordered {
            guards.push(self.lock(group_id).await);
        }
        guards
    }

    /// Number of series that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
