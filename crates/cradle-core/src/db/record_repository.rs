//! Domain record repository implementation

use crate::error::Result;
use crate::models::{
    AuditEntry, CollectionForm, CollectionSession, FingerCapture, LoginEvent, RecordSyncStatus,
    SyncKind,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for domain record storage operations
pub trait RecordRepository {
    fn insert_session(&self, session: &CollectionSession) -> Result<()>;

    fn insert_finger_capture(&self, capture: &FingerCapture) -> Result<()>;

    fn insert_form(&self, form: &CollectionForm) -> Result<()>;

    fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<()>;

    fn insert_login_event(&self, event: &LoginEvent) -> Result<()>;

    /// Current sync flag of a record, `None` when the kind has no table or the row is gone
    fn sync_status(&self, kind: SyncKind, id: &str) -> Result<Option<RecordSyncStatus>>;

    /// Update a record's sync flag; returns whether a row was touched
    fn set_sync_status(&self, kind: SyncKind, id: &str, status: RecordSyncStatus) -> Result<bool>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert_session(&self, session: &CollectionSession) -> Result<()> {
        session.validate()?;
        self.conn.execute(
            "INSERT INTO sessions (id, operator_id, baby_ref, state, sync_status, created_at, data)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                session.id.as_str(),
                session.operator_id,
                session.baby_ref,
                session.state.as_str(),
                RecordSyncStatus::Pending.as_str(),
                session.created_at,
                serde_json::to_string(session)?
            ],
        )?;
        Ok(())
    }

    fn insert_finger_capture(&self, capture: &FingerCapture) -> Result<()> {
        capture.validate()?;
        self.conn.execute(
            "INSERT INTO finger_captures (id, session_id, sync_status, created_at, data)
             VALUES (?, ?, ?, ?, ?)",
            params![
                capture.id.as_str(),
                capture.session_id.as_str(),
                RecordSyncStatus::Pending.as_str(),
                capture.created_at,
                serde_json::to_string(capture)?
            ],
        )?;
        Ok(())
    }

    fn insert_form(&self, form: &CollectionForm) -> Result<()> {
        form.validate()?;
        self.conn.execute(
            "INSERT INTO forms (id, session_id, sync_status, created_at, data)
             VALUES (?, ?, ?, ?, ?)",
            params![
                form.id.as_str(),
                form.session_id.as_str(),
                RecordSyncStatus::Pending.as_str(),
                form.created_at,
                serde_json::to_string(form)?
            ],
        )?;
        Ok(())
    }

    fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        entry.validate()?;
        self.conn.execute(
            "INSERT INTO audit_entries (id, user_id, entity, sync_status, created_at, data)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entry.id.as_str(),
                entry.user_id,
                entry.entity,
                RecordSyncStatus::Pending.as_str(),
                entry.created_at,
                serde_json::to_string(entry)?
            ],
        )?;
        Ok(())
    }

    fn insert_login_event(&self, event: &LoginEvent) -> Result<()> {
        event.validate()?;
        self.conn.execute(
            "INSERT INTO login_events (id, email, success, sync_status, created_at, data)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                event.id.as_str(),
                event.email,
                event.success,
                RecordSyncStatus::Pending.as_str(),
                event.created_at,
                serde_json::to_string(event)?
            ],
        )?;
        Ok(())
    }

    fn sync_status(&self, kind: SyncKind, id: &str) -> Result<Option<RecordSyncStatus>> {
        let Some(table) = kind.record_table() else {
            return Ok(None);
        };

        let status: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT sync_status FROM {table} WHERE id = ?"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        status.map(|status| status.parse()).transpose()
    }

    fn set_sync_status(&self, kind: SyncKind, id: &str, status: RecordSyncStatus) -> Result<bool> {
        let Some(table) = kind.record_table() else {
            return Ok(false);
        };

        let rows = self.conn.execute(
            &format!("UPDATE {table} SET sync_status = ? WHERE id = ?"),
            params![status.as_str(), id],
        )?;

        Ok(rows > 0)
    }
}
