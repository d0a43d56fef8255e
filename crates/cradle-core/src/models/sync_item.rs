//! Sync queue (outbox) item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Store-assigned, monotonic identifier of an outbox entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncItemId(i64);

impl SyncItemId {
    /// Wrap a raw row id
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw row id
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SyncItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("invalid sync item id: {s}")))
    }
}

/// Domain entity type carried by a sync item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncKind {
    Session,
    Finger,
    Form,
    Image,
    Audit,
    LoginEvent,
}

impl SyncKind {
    /// All kinds, in declaration order
    pub const ALL: [Self; 6] = [
        Self::Session,
        Self::Finger,
        Self::Form,
        Self::Image,
        Self::Audit,
        Self::LoginEvent,
    ];

    /// Stable storage tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "SESSION",
            Self::Finger => "FINGER",
            Self::Form => "FORM",
            Self::Image => "IMAGE",
            Self::Audit => "AUDIT",
            Self::LoginEvent => "LOGIN_EVENT",
        }
    }

    /// Domain table whose `sync_status` mirrors delivery of this kind.
    ///
    /// `None` for kinds that have no local record table.
    #[must_use]
    pub const fn record_table(self) -> Option<&'static str> {
        match self {
            Self::Session => Some("sessions"),
            Self::Finger => Some("finger_captures"),
            Self::Form => Some("forms"),
            Self::Audit => Some("audit_entries"),
            Self::LoginEvent => Some("login_events"),
            Self::Image => None,
        }
    }

    /// Default priority when the caller does not provide one (1 = most urgent)
    #[must_use]
    pub const fn default_priority(self) -> i32 {
        match self {
            Self::Session => 1,
            Self::Finger | Self::Form => 2,
            Self::Image | Self::Audit | Self::LoginEvent => 3,
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SyncKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown sync kind: {s}")))
    }
}

/// Delivery state of a sync item
///
/// `PENDING -> SENDING -> {DONE | ERROR | CONFLICT}`; `ERROR`/`CONFLICT`
/// return to `PENDING` through a manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Sending,
    Error,
    Conflict,
    Done,
}

impl SyncStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Sending,
        Self::Error,
        Self::Conflict,
        Self::Done,
    ];

    /// Stable storage tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sending => "SENDING",
            Self::Error => "ERROR",
            Self::Conflict => "CONFLICT",
            Self::Done => "DONE",
        }
    }

    /// Statuses the driver may pick up on its own
    #[must_use]
    pub const fn is_eligible_for_sync(self) -> bool {
        matches!(self, Self::Pending | Self::Error)
    }

    /// Statuses a manual retry may move back to `PENDING`
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Error | Self::Conflict)
    }

    /// Everything except an in-flight attempt can be discarded
    #[must_use]
    pub const fn is_discardable(self) -> bool {
        !matches!(self, Self::Sending)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown sync status: {s}")))
    }
}

/// One outbox entry wrapping one domain change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Store-assigned identifier
    pub id: SyncItemId,
    /// Domain entity type
    pub kind: SyncKind,
    /// Identifier of the domain record this change belongs to, if any
    pub entity_ref: Option<String>,
    /// Serialized snapshot taken at enqueue time; never rewritten
    pub payload: String,
    /// Lower value = more urgent
    pub priority: i32,
    /// Delivery attempts so far, regardless of outcome
    pub attempts: u32,
    /// Most recent failure description, shown verbatim
    pub last_error: Option<String>,
    /// Delivery state
    pub status: SyncStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last transition timestamp (Unix ms)
    pub updated_at: i64,
}

/// Fields required to append a new outbox entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncItem {
    pub kind: SyncKind,
    pub priority: i32,
    pub entity_ref: Option<String>,
    pub payload: String,
}

impl NewSyncItem {
    /// New item with the kind's default priority
    pub fn new(kind: SyncKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            priority: kind.default_priority(),
            entity_ref: None,
            payload: payload.into(),
        }
    }

    /// Override the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attach the domain record identifier
    #[must_use]
    pub fn with_entity_ref(mut self, entity_ref: impl Into<String>) -> Self {
        self.entity_ref = Some(entity_ref.into());
        self
    }
}

/// Partial update merged into an existing item.
///
/// The payload is deliberately absent: it is immutable after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncItemPatch {
    pub status: Option<SyncStatus>,
    pub attempts: Option<u32>,
    /// `Some(None)` clears the stored error
    pub last_error: Option<Option<String>>,
}

impl SyncItemPatch {
    #[must_use]
    pub const fn status(status: SyncStatus) -> Self {
        Self {
            status: Some(status),
            attempts: None,
            last_error: None,
        }
    }

    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn with_last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = Some(last_error);
        self
    }
}

/// Aggregate queue health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub sending: usize,
    pub error: usize,
    pub conflict: usize,
    pub done: usize,
}

impl QueueCounts {
    /// Items waiting for their first or next automatic attempt
    #[must_use]
    pub const fn pending_count(&self) -> usize {
        self.pending
    }

    /// Items that failed, including conflicts awaiting review
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.error + self.conflict
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.sending + self.error + self.conflict + self.done
    }

    pub(crate) fn set(&mut self, status: SyncStatus, count: usize) {
        match status {
            SyncStatus::Pending => self.pending = count,
            SyncStatus::Sending => self.sending = count,
            SyncStatus::Error => self.error = count,
            SyncStatus::Conflict => self.conflict = count,
            SyncStatus::Done => self.done = count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_accepts_dashes_and_case() {
        assert_eq!("login-event".parse::<SyncKind>().unwrap(), SyncKind::LoginEvent);
        assert_eq!("session".parse::<SyncKind>().unwrap(), SyncKind::Session);
        assert!("fingerprint".parse::<SyncKind>().is_err());
    }

    #[test]
    fn test_status_parse_roundtrips_storage_tag() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_rules() {
        assert!(SyncStatus::Pending.is_eligible_for_sync());
        assert!(SyncStatus::Error.is_eligible_for_sync());
        assert!(!SyncStatus::Conflict.is_eligible_for_sync());
        assert!(SyncStatus::Conflict.is_retryable());
        assert!(!SyncStatus::Done.is_retryable());
        assert!(!SyncStatus::Sending.is_discardable());
        assert!(SyncStatus::Done.is_discardable());
    }

    #[test]
    fn test_kind_serializes_as_screaming_tag() {
        let json = serde_json::to_string(&SyncKind::LoginEvent).unwrap();
        assert_eq!(json, "\"LOGIN_EVENT\"");
    }

    #[test]
    fn test_counts_error_includes_conflicts() {
        let counts = QueueCounts {
            pending: 2,
            sending: 0,
            error: 1,
            conflict: 3,
            done: 4,
        };
        assert_eq!(counts.error_count(), 4);
        assert_eq!(counts.total(), 10);
    }
}
