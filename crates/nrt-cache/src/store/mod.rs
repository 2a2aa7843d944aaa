//! In-memory stores backing the topology cache
//!
//! Each store is its own critical section guarded by a single mutex. No store
//! operation performs I/O, so locks are only ever held for map operations and
//! never across caller code. Operations spanning two stores are not atomic.

mod counter;
mod nrt;
mod resource;

pub use counter::Counter;
pub use nrt::NrtStore;
pub use resource::{NegativeAvailable, ResourceStore};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquire a store lock, recovering from poisoning
///
/// Every critical section leaves its map in a consistent state before it can
/// panic, so the data behind a poisoned lock is still valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
