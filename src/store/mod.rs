//! In-memory stores for monitored endpoints and their check history.

mod history;
mod models;
mod services;

pub use history::*;
pub use models::*;
pub use services::*;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Store error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("endpoint not found: {0}")]
    NotFound(String),
    #[error("endpoint already exists: {0}")]
    AlreadyExists(String),
}

// A panic while holding a store lock cannot leave a map half-written, so a
// poisoned lock is still safe to use.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
