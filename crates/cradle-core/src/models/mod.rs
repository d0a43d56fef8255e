//! Data models for Cradle

mod records;
mod sync_item;

pub use records::{
    AuditEntry, CaptureOutcome, CollectionForm, CollectionSession, Finger, FingerCapture,
    LoginEvent, RecordId, RecordSyncStatus, SessionState, SessionType,
};
pub use sync_item::{
    NewSyncItem, QueueCounts, SyncItem, SyncItemId, SyncItemPatch, SyncKind, SyncStatus,
};
