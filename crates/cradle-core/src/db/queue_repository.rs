//! Sync queue (outbox) repository implementation

use crate::error::{Error, Result};
use crate::models::{
    NewSyncItem, QueueCounts, SyncItem, SyncItemId, SyncItemPatch, SyncStatus,
};
use crate::util::unix_millis_now;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const ITEM_COLUMNS: &str =
    "id, kind, entity_ref, payload, priority, attempts, last_error, status, created_at, updated_at";

/// Error recorded for attempts that were cut short by a shutdown
pub const INTERRUPTED_ERROR: &str = "delivery interrupted before completion";

/// Trait for outbox storage operations
pub trait SyncQueueRepository {
    /// Insert a new `PENDING` item with zero attempts
    fn append(&self, item: &NewSyncItem) -> Result<SyncItem>;

    /// Get an item by ID
    fn get(&self, id: SyncItemId) -> Result<Option<SyncItem>>;

    /// Merge fields into an existing item, always refreshing `updated_at`
    fn update(&self, id: SyncItemId, patch: &SyncItemPatch) -> Result<SyncItem>;

    /// Delete an item permanently
    fn remove(&self, id: SyncItemId) -> Result<()>;

    /// Items whose status is in `statuses`, most urgent first
    fn query_by_status(&self, statuses: &[SyncStatus]) -> Result<Vec<SyncItem>>;

    /// Every item, ascending priority value (1 = most urgent), then insertion order
    fn query_all_ordered_by_priority(&self) -> Result<Vec<SyncItem>>;

    /// Number of items per status
    fn counts(&self) -> Result<QueueCounts>;

    /// Move an eligible item (`PENDING` or `ERROR`) to `SENDING`
    ///
    /// This is a compare-and-set: at most one caller wins for a given item.
    fn begin_attempt(&self, id: SyncItemId) -> Result<SyncItem>;

    /// Record the outcome of an in-flight attempt: `SENDING` -> `outcome`,
    /// `attempts + 1`, `last_error` replaced
    ///
    /// Compare-and-set on `SENDING`; an item recovered or resolved elsewhere
    /// is reported as `InvalidTransition` and left untouched.
    fn complete_attempt(
        &self,
        id: SyncItemId,
        outcome: SyncStatus,
        last_error: Option<&str>,
    ) -> Result<SyncItem>;

    /// Move an `ERROR`/`CONFLICT` item back to `PENDING`
    fn requeue(&self, id: SyncItemId) -> Result<SyncItem>;

    /// Remove an item unless an attempt is in flight
    fn discard(&self, id: SyncItemId) -> Result<SyncItem>;

    /// Turn items stranded in `SENDING` into `ERROR`; returns how many
    fn recover_interrupted(&self) -> Result<usize>;

    /// Remove `DONE` items last touched before `cutoff` (Unix ms)
    fn purge_done(&self, cutoff: i64) -> Result<usize>;
}

/// `SQLite` implementation of `SyncQueueRepository`
pub struct SqliteSyncQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a sync item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncItem> {
        let kind: String = row.get(1)?;
        let status: String = row.get(7)?;
        Ok(SyncItem {
            id: SyncItemId::new(row.get(0)?),
            kind: kind
                .parse()
                .map_err(|error| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(error)))?,
            entity_ref: row.get(2)?,
            payload: row.get(3)?,
            priority: row.get(4)?,
            attempts: row.get(5)?,
            last_error: row.get(6)?,
            status: status
                .parse()
                .map_err(|error| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(error)))?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn require(&self, id: SyncItemId) -> Result<SyncItem> {
        self.get(id)?.ok_or_else(|| Error::item_not_found(id))
    }

    fn statuses_where(predicate: fn(SyncStatus) -> bool) -> Vec<SyncStatus> {
        SyncStatus::ALL.into_iter().filter(|status| predicate(*status)).collect()
    }

    fn rejected(&self, id: SyncItemId, action: &'static str) -> Error {
        match self.require(id) {
            Ok(current) => Error::InvalidTransition {
                id,
                from: current.status,
                action,
            },
            Err(error) => error,
        }
    }

    /// Conditional status change; explains the failure when the guard rejects it
    fn transition(
        &self,
        id: SyncItemId,
        allowed_from: &[SyncStatus],
        to: SyncStatus,
        action: &'static str,
    ) -> Result<SyncItem> {
        let placeholders = vec!["?"; allowed_from.len()].join(", ");
        let sql = format!(
            "UPDATE sync_queue SET status = ?, updated_at = ? WHERE id = ? AND status IN ({placeholders})"
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            to.as_str().to_string().into(),
            unix_millis_now().into(),
            id.get().into(),
        ];
        values.extend(
            allowed_from
                .iter()
                .map(|status| rusqlite::types::Value::from(status.as_str().to_string())),
        );

        let rows = self.conn.execute(&sql, params_from_iter(values))?;
        if rows == 0 {
            return Err(self.rejected(id, action));
        }

        self.require(id)
    }
}

impl SyncQueueRepository for SqliteSyncQueueRepository<'_> {
    fn append(&self, item: &NewSyncItem) -> Result<SyncItem> {
        let now = unix_millis_now();

        self.conn.execute(
            "INSERT INTO sync_queue (kind, entity_ref, payload, priority, attempts, last_error, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, NULL, ?, ?, ?)",
            params![
                item.kind.as_str(),
                item.entity_ref,
                item.payload,
                item.priority,
                SyncStatus::Pending.as_str(),
                now,
                now
            ],
        )?;

        let id = SyncItemId::new(self.conn.last_insert_rowid());
        tracing::debug!("Enqueued {} item {id} (priority {})", item.kind, item.priority);
        self.require(id)
    }

    fn get(&self, id: SyncItemId) -> Result<Option<SyncItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM sync_queue WHERE id = ?"),
                params![id.get()],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    fn update(&self, id: SyncItemId, patch: &SyncItemPatch) -> Result<SyncItem> {
        let now = unix_millis_now();
        let (set_error, last_error) = match &patch.last_error {
            Some(value) => (true, value.as_deref()),
            None => (false, None),
        };

        let rows = self.conn.execute(
            "UPDATE sync_queue
             SET status = COALESCE(?, status),
                 attempts = COALESCE(?, attempts),
                 last_error = CASE WHEN ? THEN ? ELSE last_error END,
                 updated_at = ?
             WHERE id = ?",
            params![
                patch.status.map(SyncStatus::as_str),
                patch.attempts,
                set_error,
                last_error,
                now,
                id.get()
            ],
        )?;

        if rows == 0 {
            return Err(Error::item_not_found(id));
        }

        self.require(id)
    }

    fn remove(&self, id: SyncItemId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", params![id.get()])?;

        if rows == 0 {
            return Err(Error::item_not_found(id));
        }

        Ok(())
    }

    fn query_by_status(&self, statuses: &[SyncStatus]) -> Result<Vec<SyncItem>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM sync_queue
             WHERE status IN ({placeholders})
             ORDER BY priority ASC, id ASC"
        ))?;

        let items = stmt
            .query_map(
                params_from_iter(statuses.iter().map(|status| status.as_str())),
                Self::parse_item,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn query_all_ordered_by_priority(&self) -> Result<Vec<SyncItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM sync_queue
             ORDER BY priority ASC, id ASC"
        ))?;

        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn counts(&self) -> Result<QueueCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            counts.set(status.parse()?, count);
        }

        Ok(counts)
    }

    fn begin_attempt(&self, id: SyncItemId) -> Result<SyncItem> {
        self.transition(
            id,
            &Self::statuses_where(SyncStatus::is_eligible_for_sync),
            SyncStatus::Sending,
            "send",
        )
    }

    fn complete_attempt(
        &self,
        id: SyncItemId,
        outcome: SyncStatus,
        last_error: Option<&str>,
    ) -> Result<SyncItem> {
        if !matches!(
            outcome,
            SyncStatus::Done | SyncStatus::Error | SyncStatus::Conflict
        ) {
            return Err(Error::InvalidInput(format!(
                "{outcome} is not a delivery outcome"
            )));
        }

        let rows = self.conn.execute(
            "UPDATE sync_queue
             SET status = ?, attempts = attempts + 1, last_error = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![
                outcome.as_str(),
                last_error,
                unix_millis_now(),
                id.get(),
                SyncStatus::Sending.as_str()
            ],
        )?;

        if rows == 0 {
            return Err(self.rejected(id, "complete"));
        }

        self.require(id)
    }

    fn requeue(&self, id: SyncItemId) -> Result<SyncItem> {
        self.transition(
            id,
            &Self::statuses_where(SyncStatus::is_retryable),
            SyncStatus::Pending,
            "retry",
        )
    }

    fn discard(&self, id: SyncItemId) -> Result<SyncItem> {
        let item = self.require(id)?;
        if !item.status.is_discardable() {
            return Err(Error::InvalidTransition {
                id,
                from: item.status,
                action: "discard",
            });
        }

        let rows = self.conn.execute(
            "DELETE FROM sync_queue WHERE id = ? AND status != ?",
            params![id.get(), SyncStatus::Sending.as_str()],
        )?;

        if rows == 0 {
            // An attempt started between the read and the delete
            return Err(Error::InvalidTransition {
                id,
                from: SyncStatus::Sending,
                action: "discard",
            });
        }

        Ok(item)
    }

    fn recover_interrupted(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE sync_queue
             SET status = ?, attempts = attempts + 1, last_error = ?, updated_at = ?
             WHERE status = ?",
            params![
                SyncStatus::Error.as_str(),
                INTERRUPTED_ERROR,
                unix_millis_now(),
                SyncStatus::Sending.as_str()
            ],
        )?;

        Ok(rows)
    }

    fn purge_done(&self, cutoff: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sync_queue WHERE status = ? AND updated_at < ?",
            params![SyncStatus::Done.as_str(), cutoff],
        )?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SyncKind;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn enqueue(repo: &SqliteSyncQueueRepository<'_>, kind: SyncKind, priority: i32) -> SyncItem {
        repo.append(&NewSyncItem::new(kind, r#"{"ref":"x"}"#).with_priority(priority))
            .unwrap()
    }

    #[test]
    fn test_append_then_query_pending() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());

        let item = enqueue(&repo, SyncKind::Session, 1);
        assert_eq!(item.status, SyncStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.last_error, None);
        assert_eq!(item.created_at, item.updated_at);

        let pending = repo.query_by_status(&[SyncStatus::Pending]).unwrap();
        assert_eq!(pending, vec![item]);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());

        let first = enqueue(&repo, SyncKind::Session, 1);
        let second = enqueue(&repo, SyncKind::Finger, 1);
        assert!(second.id > first.id);
    }

    #[test]
    fn test_priority_order_is_ascending_then_fifo() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());

        let p1 = enqueue(&repo, SyncKind::Session, 1);
        let p3 = enqueue(&repo, SyncKind::Audit, 3);
        let p2 = enqueue(&repo, SyncKind::Form, 2);
        let p1_later = enqueue(&repo, SyncKind::Finger, 1);

        let ordered: Vec<SyncItemId> = repo
            .query_all_ordered_by_priority()
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ordered, vec![p1.id, p1_later.id, p2.id, p3.id]);
    }

    #[test]
    fn test_complete_attempt_requires_sending() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Image, 3);

        assert!(matches!(
            repo.complete_attempt(item.id, SyncStatus::Done, None),
            Err(Error::InvalidTransition {
                from: SyncStatus::Pending,
                ..
            })
        ));

        repo.begin_attempt(item.id).unwrap();
        let failed = repo
            .complete_attempt(item.id, SyncStatus::Error, Some("timeout"))
            .unwrap();
        assert_eq!(failed.status, SyncStatus::Error);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.last_error.as_deref(), Some("timeout"));

        repo.begin_attempt(item.id).unwrap();
        let done = repo.complete_attempt(item.id, SyncStatus::Done, None).unwrap();
        assert_eq!(done.attempts, 2);
        assert_eq!(done.last_error, None);

        assert!(matches!(
            repo.complete_attempt(SyncItemId::new(999), SyncStatus::Done, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_late_completion_does_not_overwrite_recovery() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Session, 1);
        repo.begin_attempt(item.id).unwrap();

        assert_eq!(repo.recover_interrupted().unwrap(), 1);
        assert!(matches!(
            repo.complete_attempt(item.id, SyncStatus::Done, None),
            Err(Error::InvalidTransition {
                from: SyncStatus::Error,
                ..
            })
        ));

        let current = repo.get(item.id).unwrap().unwrap();
        assert_eq!(current.status, SyncStatus::Error);
        assert_eq!(current.attempts, 1);
        assert_eq!(current.last_error.as_deref(), Some(INTERRUPTED_ERROR));
    }

    #[test]
    fn test_complete_attempt_rejects_non_outcomes() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Form, 2);
        repo.begin_attempt(item.id).unwrap();

        assert!(matches!(
            repo.complete_attempt(item.id, SyncStatus::Pending, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_update_merges_fields_and_refreshes_timestamp() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Form, 2);

        let updated = repo
            .update(
                item.id,
                &SyncItemPatch::status(SyncStatus::Error)
                    .with_attempts(1)
                    .with_last_error(Some("timeout".to_string())),
            )
            .unwrap();
        assert_eq!(updated.status, SyncStatus::Error);
        assert_eq!(updated.attempts, 1);
        assert_eq!(updated.last_error.as_deref(), Some("timeout"));
        assert_eq!(updated.payload, item.payload);
        assert!(updated.updated_at >= item.updated_at);

        // Leaving last_error untouched keeps it
        let requeued = repo
            .update(item.id, &SyncItemPatch::status(SyncStatus::Pending))
            .unwrap();
        assert_eq!(requeued.last_error.as_deref(), Some("timeout"));

        let cleared = repo
            .update(item.id, &SyncItemPatch::default().with_last_error(None))
            .unwrap();
        assert_eq!(cleared.last_error, None);
    }

    #[test]
    fn test_update_and_remove_missing_item_fail_with_not_found() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let missing = SyncItemId::new(42);

        let update = repo.update(missing, &SyncItemPatch::status(SyncStatus::Done));
        assert!(matches!(update, Err(Error::NotFound(_))));
        assert!(matches!(repo.remove(missing), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_begin_attempt_is_single_flight() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Session, 1);

        let sending = repo.begin_attempt(item.id).unwrap();
        assert_eq!(sending.status, SyncStatus::Sending);
        assert_eq!(sending.attempts, 0);

        let second = repo.begin_attempt(item.id);
        assert!(matches!(
            second,
            Err(Error::InvalidTransition {
                from: SyncStatus::Sending,
                ..
            })
        ));
    }

    #[test]
    fn test_begin_attempt_rejects_conflict() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Audit, 3);
        repo.update(item.id, &SyncItemPatch::status(SyncStatus::Conflict))
            .unwrap();

        assert!(repo.begin_attempt(item.id).is_err());
    }

    #[test]
    fn test_requeue_only_from_error_or_conflict() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Audit, 3);

        assert!(repo.requeue(item.id).is_err());

        repo.update(
            item.id,
            &SyncItemPatch::status(SyncStatus::Conflict)
                .with_attempts(2)
                .with_last_error(Some("version conflict".to_string())),
        )
        .unwrap();

        let requeued = repo.requeue(item.id).unwrap();
        assert_eq!(requeued.status, SyncStatus::Pending);
        assert_eq!(requeued.attempts, 2);
        assert_eq!(requeued.last_error.as_deref(), Some("version conflict"));
    }

    #[test]
    fn test_discard_removes_any_non_sending_item() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());

        for status in [
            SyncStatus::Pending,
            SyncStatus::Error,
            SyncStatus::Conflict,
            SyncStatus::Done,
        ] {
            let item = enqueue(&repo, SyncKind::Image, 3);
            repo.update(item.id, &SyncItemPatch::status(status)).unwrap();

            repo.discard(item.id).unwrap();
            assert!(repo.get(item.id).unwrap().is_none());
            assert!(repo
                .query_by_status(&SyncStatus::ALL)
                .unwrap()
                .iter()
                .all(|other| other.id != item.id));
        }
    }

    #[test]
    fn test_discard_rejects_sending_item() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let item = enqueue(&repo, SyncKind::Session, 1);
        repo.begin_attempt(item.id).unwrap();

        assert!(matches!(
            repo.discard(item.id),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(repo.get(item.id).unwrap().is_some());
    }

    #[test]
    fn test_recover_interrupted_marks_sending_as_error() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let stranded = enqueue(&repo, SyncKind::Session, 1);
        let untouched = enqueue(&repo, SyncKind::Form, 2);
        repo.begin_attempt(stranded.id).unwrap();

        assert_eq!(repo.recover_interrupted().unwrap(), 1);

        let recovered = repo.get(stranded.id).unwrap().unwrap();
        assert_eq!(recovered.status, SyncStatus::Error);
        assert_eq!(recovered.attempts, 1);
        assert_eq!(recovered.last_error.as_deref(), Some(INTERRUPTED_ERROR));

        let other = repo.get(untouched.id).unwrap().unwrap();
        assert_eq!(other.status, SyncStatus::Pending);
    }

    #[test]
    fn test_counts_group_by_status() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        enqueue(&repo, SyncKind::Session, 1);
        enqueue(&repo, SyncKind::Session, 1);
        let errored = enqueue(&repo, SyncKind::Form, 2);
        let conflicted = enqueue(&repo, SyncKind::Audit, 3);
        repo.update(errored.id, &SyncItemPatch::status(SyncStatus::Error))
            .unwrap();
        repo.update(conflicted.id, &SyncItemPatch::status(SyncStatus::Conflict))
            .unwrap();

        let counts = repo.counts().unwrap();
        assert_eq!(
            counts,
            QueueCounts {
                pending: 2,
                sending: 0,
                error: 1,
                conflict: 1,
                done: 0,
            }
        );
        assert_eq!(counts.error_count(), 2);
    }

    #[test]
    fn test_purge_done_only_removes_old_done_items() {
        let db = setup();
        let repo = SqliteSyncQueueRepository::new(db.connection());
        let done = enqueue(&repo, SyncKind::Session, 1);
        let errored = enqueue(&repo, SyncKind::Form, 2);
        repo.update(done.id, &SyncItemPatch::status(SyncStatus::Done))
            .unwrap();
        repo.update(errored.id, &SyncItemPatch::status(SyncStatus::Error))
            .unwrap();

        assert_eq!(repo.purge_done(0).unwrap(), 0);
        assert_eq!(repo.purge_done(i64::MAX).unwrap(), 1);
        assert!(repo.get(done.id).unwrap().is_none());
        assert!(repo.get(errored.id).unwrap().is_some());
    }
}
