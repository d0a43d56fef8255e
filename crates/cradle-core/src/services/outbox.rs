//! Shared outbox service wrapper used by the driver, the observer and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use super::owner::OwnerLock;
use crate::db::{
    Database, RecordRepository, SqliteRecordRepository, SqliteSyncQueueRepository,
    SyncQueueRepository,
};
use crate::models::{
    AuditEntry, CollectionForm, CollectionSession, FingerCapture, LoginEvent, NewSyncItem,
    QueueCounts, RecordSyncStatus, SyncItem, SyncItemId, SyncItemPatch, SyncKind, SyncStatus,
};
use crate::util::unix_millis_now;
use crate::{Error, Result};

/// Who may drive deliveries through a handle.
#[derive(Clone)]
enum Ownership {
    /// Private in-memory store, nobody else can see it
    Exclusive,
    /// On-disk store with the owner lock held until the last clone drops
    Locked { _lock: Arc<OwnerLock> },
    /// On-disk store opened for reading and manual edits only
    Shared,
}

/// Thread-safe handle over the local store.
///
/// Clones share one connection. Every mutation republishes the aggregate
/// [`QueueCounts`] to subscribers.
#[derive(Clone)]
pub struct OutboxService {
    db: Arc<Mutex<Database>>,
    counts: Arc<watch::Sender<QueueCounts>>,
    ownership: Ownership,
}

impl OutboxService {
    /// Open the outbox at the given path without claiming delivery.
    ///
    /// Suitable for inspection, recording and manual retry/discard. Rows in
    /// `SENDING` are left alone since another process may be mid-delivery.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        Self::create_parent(&db_path).await?;
        let db = Database::open(&db_path)?;
        Self::from_database(db, Ownership::Shared)
    }

    /// Open the outbox as its single delivering process.
    ///
    /// Takes the owner lock, then moves items a crashed owner left in
    /// `SENDING` to `ERROR`. Fails with [`Error::Locked`] while another
    /// owner is alive.
    pub async fn open_owned(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        Self::create_parent(&db_path).await?;
        let lock = OwnerLock::acquire(&db_path)?;
        let db = Database::open(&db_path)?;
        let service = Self::from_database(db, Ownership::Locked {
            _lock: Arc::new(lock),
        })?;
        service.recover_interrupted().await?;
        Ok(service)
    }

    /// Open an in-memory outbox (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Self::from_database(db, Ownership::Exclusive)
    }

    async fn create_parent(db_path: &Path) -> Result<()> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    fn from_database(db: Database, ownership: Ownership) -> Result<Self> {
        let initial = SqliteSyncQueueRepository::new(db.connection()).counts()?;
        let (counts, _) = watch::channel(initial);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            counts: Arc::new(counts),
            ownership,
        })
    }

    /// Whether this handle may claim and complete deliveries.
    pub const fn is_owner(&self) -> bool {
        !matches!(self.ownership, Ownership::Shared)
    }

    fn require_owner(&self, action: &str) -> Result<()> {
        if self.is_owner() {
            Ok(())
        } else {
            Err(Error::Locked(format!(
                "cannot {action} from a read-only outbox handle"
            )))
        }
    }

    /// Subscribe to aggregate count changes.
    pub fn subscribe(&self) -> watch::Receiver<QueueCounts> {
        self.counts.subscribe()
    }

    /// Refresh subscribers after a committed write. A failed read only
    /// delays the update until the next mutation.
    fn publish(&self, db: &Database) {
        let latest = match SqliteSyncQueueRepository::new(db.connection()).counts() {
            Ok(latest) => latest,
            Err(error) => {
                tracing::warn!("Failed to refresh outbox counts: {error}");
                return;
            }
        };
        self.counts.send_if_modified(|current| {
            if *current == latest {
                false
            } else {
                *current = latest;
                true
            }
        });
    }

    /// Move items stranded in `SENDING` to `ERROR`, counting the lost
    /// attempt. Returns how many were reset.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        self.require_owner("recover interrupted items")?;
        let db = self.db.lock().await;
        let recovered = SqliteSyncQueueRepository::new(db.connection()).recover_interrupted()?;
        if recovered > 0 {
            tracing::warn!("Recovered {recovered} sync item(s) interrupted mid-delivery; marked as ERROR");
            self.publish(&db);
        }
        Ok(recovered)
    }

    /// Append an item for a change that has no local record table.
    pub async fn enqueue(&self, item: NewSyncItem) -> Result<SyncItem> {
        let db = self.db.lock().await;
        let created = SqliteSyncQueueRepository::new(db.connection()).append(&item)?;
        self.publish(&db);
        Ok(created)
    }

    /// Persist a domain record and its outbox entry atomically.
    fn record_with<F>(&self, db: &Database, item: &NewSyncItem, insert: F) -> Result<SyncItem>
    where
        F: FnOnce(&SqliteRecordRepository<'_>) -> Result<()>,
    {
        let tx = db.connection().unchecked_transaction()?;
        insert(&SqliteRecordRepository::new(&tx))?;
        let created = SqliteSyncQueueRepository::new(&tx).append(item)?;
        tx.commit()?;

        tracing::info!(
            "Recorded {} {} (sync item {})",
            item.kind,
            item.entity_ref.as_deref().unwrap_or("-"),
            created.id
        );
        Ok(created)
    }

    fn snapshot_item<T: serde::Serialize>(
        kind: SyncKind,
        entity_ref: String,
        record: &T,
        priority: Option<i32>,
    ) -> Result<NewSyncItem> {
        Ok(NewSyncItem::new(kind, serde_json::to_string(record)?)
            .with_priority(priority.unwrap_or_else(|| kind.default_priority()))
            .with_entity_ref(entity_ref))
    }

    pub async fn record_session(
        &self,
        session: &CollectionSession,
        priority: Option<i32>,
    ) -> Result<SyncItem> {
        let item = Self::snapshot_item(SyncKind::Session, session.id.as_str(), session, priority)?;
        let db = self.db.lock().await;
        let created = self.record_with(&db, &item, |records| records.insert_session(session))?;
        self.publish(&db);
        Ok(created)
    }

    pub async fn record_finger_capture(
        &self,
        capture: &FingerCapture,
        priority: Option<i32>,
    ) -> Result<SyncItem> {
        let item = Self::snapshot_item(SyncKind::Finger, capture.id.as_str(), capture, priority)?;
        let db = self.db.lock().await;
        let created =
            self.record_with(&db, &item, |records| records.insert_finger_capture(capture))?;
        self.publish(&db);
        Ok(created)
    }

    pub async fn record_form(
        &self,
        form: &CollectionForm,
        priority: Option<i32>,
    ) -> Result<SyncItem> {
        let item = Self::snapshot_item(SyncKind::Form, form.id.as_str(), form, priority)?;
        let db = self.db.lock().await;
        let created = self.record_with(&db, &item, |records| records.insert_form(form))?;
        self.publish(&db);
        Ok(created)
    }

    pub async fn record_audit_entry(
        &self,
        entry: &AuditEntry,
        priority: Option<i32>,
    ) -> Result<SyncItem> {
        let item = Self::snapshot_item(SyncKind::Audit, entry.id.as_str(), entry, priority)?;
        let db = self.db.lock().await;
        let created = self.record_with(&db, &item, |records| records.insert_audit_entry(entry))?;
        self.publish(&db);
        Ok(created)
    }

    pub async fn record_login_event(
        &self,
        event: &LoginEvent,
        priority: Option<i32>,
    ) -> Result<SyncItem> {
        let item = Self::snapshot_item(SyncKind::LoginEvent, event.id.as_str(), event, priority)?;
        let db = self.db.lock().await;
        let created = self.record_with(&db, &item, |records| records.insert_login_event(event))?;
        self.publish(&db);
        Ok(created)
    }

    /// Fetch an item by id.
    pub async fn get(&self, id: SyncItemId) -> Result<Option<SyncItem>> {
        let db = self.db.lock().await;
        SqliteSyncQueueRepository::new(db.connection()).get(id)
    }

    /// Every item, most urgent first.
    pub async fn list_items(&self) -> Result<Vec<SyncItem>> {
        let db = self.db.lock().await;
        SqliteSyncQueueRepository::new(db.connection()).query_all_ordered_by_priority()
    }

    /// Items in any of the given statuses, most urgent first.
    pub async fn list_by_status(&self, statuses: &[SyncStatus]) -> Result<Vec<SyncItem>> {
        let db = self.db.lock().await;
        SqliteSyncQueueRepository::new(db.connection()).query_by_status(statuses)
    }

    /// Merge fields into an item.
    pub async fn update(&self, id: SyncItemId, patch: &SyncItemPatch) -> Result<SyncItem> {
        let db = self.db.lock().await;
        let updated = SqliteSyncQueueRepository::new(db.connection()).update(id, patch)?;
        self.publish(&db);
        Ok(updated)
    }

    /// Delete an item without status checks.
    pub async fn remove(&self, id: SyncItemId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSyncQueueRepository::new(db.connection()).remove(id)?;
        self.publish(&db);
        Ok(())
    }

    /// Current aggregate counts, read from the store.
    pub async fn counts(&self) -> Result<QueueCounts> {
        let db = self.db.lock().await;
        SqliteSyncQueueRepository::new(db.connection()).counts()
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.counts().await?.pending_count())
    }

    pub async fn error_count(&self) -> Result<usize> {
        Ok(self.counts().await?.error_count())
    }

    /// Claim an item for delivery (`PENDING`/`ERROR` -> `SENDING`).
    pub async fn begin_attempt(&self, id: SyncItemId) -> Result<SyncItem> {
        self.require_owner("send")?;
        let db = self.db.lock().await;
        let item = SqliteSyncQueueRepository::new(db.connection()).begin_attempt(id)?;
        self.publish(&db);
        Ok(item)
    }

    /// Record the outcome of an attempt and mirror it onto the domain record.
    ///
    /// Only applies while the item is still `SENDING`; an attempt that was
    /// recovered meanwhile is rejected with `InvalidTransition`.
    pub async fn finish_attempt(
        &self,
        item: &SyncItem,
        status: SyncStatus,
        last_error: Option<String>,
    ) -> Result<SyncItem> {
        self.require_owner("complete")?;
        let record_status = match status {
            SyncStatus::Done => RecordSyncStatus::Synced,
            _ => RecordSyncStatus::Error,
        };

        let db = self.db.lock().await;
        let tx = db.connection().unchecked_transaction()?;
        let updated = SqliteSyncQueueRepository::new(&tx).complete_attempt(
            item.id,
            status,
            last_error.as_deref(),
        )?;
        if let Some(entity_ref) = item.entity_ref.as_deref() {
            SqliteRecordRepository::new(&tx).set_sync_status(item.kind, entity_ref, record_status)?;
        }
        tx.commit()?;
        self.publish(&db);
        Ok(updated)
    }

    /// Release a claimed item as `ERROR` when its outcome could not be
    /// stored. Touches the queue row only.
    pub async fn abandon_attempt(&self, id: SyncItemId, reason: &str) -> Result<SyncItem> {
        self.require_owner("complete")?;
        let db = self.db.lock().await;
        let item = SqliteSyncQueueRepository::new(db.connection()).complete_attempt(
            id,
            SyncStatus::Error,
            Some(reason),
        )?;
        self.publish(&db);
        Ok(item)
    }

    /// Manual retry: `ERROR`/`CONFLICT` -> `PENDING`.
    pub async fn requeue(&self, id: SyncItemId) -> Result<SyncItem> {
        let db = self.db.lock().await;
        let item = SqliteSyncQueueRepository::new(db.connection()).requeue(id)?;
        self.publish(&db);
        Ok(item)
    }

    /// Manual discard of any item that is not mid-delivery.
    pub async fn discard(&self, id: SyncItemId) -> Result<SyncItem> {
        let db = self.db.lock().await;
        let item = SqliteSyncQueueRepository::new(db.connection()).discard(id)?;
        self.publish(&db);
        tracing::info!("Discarded {} sync item {id} ({})", item.kind, item.status);
        Ok(item)
    }

    /// Delete acknowledged items older than `older_than`.
    pub async fn purge_done(&self, older_than: Duration) -> Result<usize> {
        let age_ms = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = unix_millis_now().saturating_sub(age_ms);

        let db = self.db.lock().await;
        let purged = SqliteSyncQueueRepository::new(db.connection()).purge_done(cutoff)?;
        self.publish(&db);
        if purged > 0 {
            tracing::info!("Purged {purged} delivered sync item(s)");
        }
        Ok(purged)
    }

    /// Sync flag of a domain record.
    pub async fn record_sync_status(
        &self,
        kind: SyncKind,
        entity_ref: &str,
    ) -> Result<Option<RecordSyncStatus>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).sync_status(kind, entity_ref)
    }

    /// Run raw SQL against the store, for fault injection in tests.
    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute_batch(sql)?;
        Ok(())
    }
}
