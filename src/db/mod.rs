//! Database module for upwatch.
//!
//! Persists snapshots of the in-memory state to SQLite.

mod models;
mod saver;
mod store;

pub use models::*;
pub use saver::*;
pub use store::*;
