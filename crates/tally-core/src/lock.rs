//! Per-cluster mutual exclusion.
//!
//! Requests that touch the same cluster must not link concurrently: two merges
//! could elect different survivors, and two identical submissions could both
//! create a secondary. [`ClusterLocks`] hands out async mutexes keyed by the
//! submitted values and by root id. Keys are always acquired in sorted order.

use std::{
  collections::{BTreeSet, HashMap},
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// What a lock protects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
  Email(String),
  Phone(String),
  Root(Uuid),
}

/// A table of async mutexes, created on demand and pruned once unused.
#[derive(Debug, Default)]
pub struct ClusterLocks {
  slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

/// Holds every lock taken by one [`ClusterLocks::acquire`] call until dropped.
#[derive(Debug)]
pub struct ClusterGuard {
  _guards: Vec<OwnedMutexGuard<()>>,
}

impl ClusterLocks {
  pub fn new() -> Self { Self::default() }

  /// Lock every key in `keys`, waiting for holders to release them.
  pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> ClusterGuard {
    let keys: BTreeSet<LockKey> = keys.into_iter().collect();

    let mutexes: Vec<Arc<AsyncMutex<()>>> = {
      let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
      // Only the table itself holds a reference to an idle slot.
      slots.retain(|_, slot| Arc::strong_count(slot) > 1);
      keys
        .into_iter()
        .map(|key| Arc::clone(slots.entry(key).or_default()))
        .collect()
    };

    let mut guards = Vec::with_capacity(mutexes.len());
    for mutex in mutexes {
      guards.push(mutex.lock_owned().await);
    }
    ClusterGuard { _guards: guards }
  }

  /// Number of slots currently in the table, idle ones included.
  pub fn len(&self) -> usize {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
