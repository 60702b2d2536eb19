// src/sync.rs

use std::sync::{Mutex, MutexGuard};

/// Acquire a mutex guard, ignoring poisoning.
///
/// Every lock in this crate guards a short, non-panicking critical section
/// (a map or `Option` operation), so a poisoned guard still holds consistent
/// state.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
