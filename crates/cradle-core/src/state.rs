//! Shared cross-platform state types.

use serde::Serialize;

use crate::models::QueueCounts;

/// Unified sync state shown by status surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Offline,
    Syncing,
    Error,
    Pending,
    Synced,
}

impl SyncState {
    /// Derive the state from queue counts and reachability.
    ///
    /// Precedence: offline, in-flight, failures, backlog, clean.
    pub const fn derive(counts: &QueueCounts, online: bool) -> Self {
        if !online {
            Self::Offline
        } else if counts.sending > 0 {
            Self::Syncing
        } else if counts.error_count() > 0 {
            Self::Error
        } else if counts.pending > 0 {
            Self::Pending
        } else {
            Self::Synced
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }
}
