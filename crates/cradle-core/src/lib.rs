//! cradle-core - Core library for Cradle
//!
//! This crate contains the durable outbox used by collection devices that
//! are frequently offline: the `SQLite` record store, the sync queue state
//! machine, the sync driver, and the status observer consumed by the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{QueueCounts, SyncItem, SyncItemId, SyncKind, SyncStatus};
pub use services::OutboxService;
pub use state::SyncState;
