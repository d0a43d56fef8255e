//! Error types for cradle-core

use thiserror::Error;

use crate::models::{SyncItemId, SyncStatus};

/// Result type alias using cradle-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cradle-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sync item or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested state change is not allowed from the item's current status
    #[error("Cannot {action} sync item {id} while it is {from}")]
    InvalidTransition {
        id: SyncItemId,
        from: SyncStatus,
        action: &'static str,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another process holds the delivery lock for this store
    #[error("Outbox is locked: {0}")]
    Locked(String),
}

impl Error {
    /// Build a `NotFound` error for a sync item id.
    pub fn item_not_found(id: SyncItemId) -> Self {
        Self::NotFound(format!("sync item {id}"))
    }

    /// Whether this error reports a missing row.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
