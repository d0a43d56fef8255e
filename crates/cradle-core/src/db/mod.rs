//! Database layer for Cradle

mod connection;
mod migrations;
mod queue_repository;
mod record_repository;

pub use connection::Database;
pub use queue_repository::{SqliteSyncQueueRepository, SyncQueueRepository, INTERRUPTED_ERROR};
pub use record_repository::{RecordRepository, SqliteRecordRepository};
