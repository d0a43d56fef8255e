//! Sync driver: moves outbox items through delivery.
//!
//! The driver keeps no state of its own. Everything it knows lives in the
//! store, so it can be dropped and rebuilt at any time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;

use super::connectivity::Connectivity;
use super::delivery::{DeliveryError, RemoteDelivery};
use crate::models::{SyncItemId, SyncStatus};
use crate::services::OutboxService;
use crate::{Error, Result};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Delivered,
    Failed(String),
    Conflict(String),
}

/// Aggregate result of a [`SyncDriver::sync_all`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub succeeded: usize,
    /// Transient failures plus conflicts
    pub failed: usize,
    /// Subset of `failed` that needs review
    pub conflicts: usize,
    /// Items that were discarded or claimed elsewhere after selection
    pub skipped: usize,
}

impl SyncSummary {
    pub const fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

pub struct SyncDriver {
    outbox: OutboxService,
    delivery: Arc<dyn RemoteDelivery>,
}

impl SyncDriver {
    pub fn new(outbox: OutboxService, delivery: Arc<dyn RemoteDelivery>) -> Self {
        Self { outbox, delivery }
    }

    /// Deliver a single item.
    ///
    /// Delivery failures are recorded on the item and returned as an
    /// outcome; only store faults and invalid states come back as `Err`.
    pub async fn sync_one(&self, id: SyncItemId) -> Result<SyncOutcome> {
        let item = self.outbox.begin_attempt(id).await?;
        tracing::debug!(
            "Delivering {} item {id} (attempt {})",
            item.kind,
            item.attempts + 1
        );

        // The store lock is not held here; other readers proceed while we wait
        let result = self
            .delivery
            .deliver(item.kind, item.entity_ref.as_deref(), &item.payload)
            .await;

        let (status, last_error, outcome) = match result {
            Ok(_) => (SyncStatus::Done, None, SyncOutcome::Delivered),
            Err(DeliveryError::Transient(message)) => (
                SyncStatus::Error,
                Some(message.clone()),
                SyncOutcome::Failed(message),
            ),
            Err(DeliveryError::Conflict(message)) => (
                SyncStatus::Conflict,
                Some(message.clone()),
                SyncOutcome::Conflict(message),
            ),
        };

        if let Err(error) = self.outbox.finish_attempt(&item, status, last_error).await {
            if !error.is_not_found() && !matches!(error, Error::InvalidTransition { .. }) {
                self.release_claim(id, &error).await;
            }
            return Err(error);
        }
        match &outcome {
            SyncOutcome::Delivered => tracing::info!("Synced {} item {id}", item.kind),
            SyncOutcome::Failed(message) => {
                tracing::warn!("Sync of {} item {id} failed: {message}", item.kind);
            }
            SyncOutcome::Conflict(message) => {
                tracing::warn!("Sync of {} item {id} conflicted: {message}", item.kind);
            }
        }
        Ok(outcome)
    }

    /// Put a claimed item back in `ERROR` after its outcome failed to commit,
    /// so the next run picks it up again.
    async fn release_claim(&self, id: SyncItemId, cause: &Error) {
        let reason = format!("outcome not recorded: {cause}");
        match self.outbox.abandon_attempt(id, &reason).await {
            Ok(_) => tracing::warn!("Sync item {id} returned to ERROR: {cause}"),
            Err(error) => {
                tracing::error!("Sync item {id} left in SENDING ({cause}); release failed: {error}");
            }
        }
    }

    /// Deliver every `PENDING`/`ERROR` item, one at a time, most urgent first.
    ///
    /// A failed item never stops the run. Items that disappear or get
    /// claimed between selection and delivery are skipped.
    pub async fn sync_all(&self) -> Result<SyncSummary> {
        let eligible: Vec<SyncStatus> = SyncStatus::ALL
            .into_iter()
            .filter(|status| status.is_eligible_for_sync())
            .collect();
        let candidates = self.outbox.list_by_status(&eligible).await?;

        let mut summary = SyncSummary::default();
        for item in candidates {
            match self.sync_one(item.id).await {
                Ok(SyncOutcome::Delivered) => summary.succeeded += 1,
                Ok(SyncOutcome::Failed(_)) => summary.failed += 1,
                Ok(SyncOutcome::Conflict(_)) => {
                    summary.failed += 1;
                    summary.conflicts += 1;
                }
                Err(error)
                    if error.is_not_found()
                        || matches!(error, Error::InvalidTransition { .. }) =>
                {
                    tracing::debug!("Skipping sync item {}: {error}", item.id);
                    summary.skipped += 1;
                }
                Err(error) => return Err(error),
            }
        }

        if summary.attempted() > 0 {
            tracing::info!(
                "Sync run finished: {} succeeded, {} failed ({} conflicts)",
                summary.succeeded,
                summary.failed,
                summary.conflicts
            );
        }
        Ok(summary)
    }

    /// Manual retry: move an `ERROR`/`CONFLICT` item back to `PENDING` and
    /// attempt it immediately.
    pub async fn retry(&self, id: SyncItemId) -> Result<SyncOutcome> {
        self.outbox.requeue(id).await?;
        tracing::info!("Retrying sync item {id}");
        self.sync_one(id).await
    }

    /// Remove an item regardless of its history (never while in flight).
    pub async fn discard(&self, id: SyncItemId) -> Result<()> {
        self.outbox.discard(id).await.map(|_| ())
    }

    /// Run `sync_all` on every tick while online, until `shutdown` resolves.
    ///
    /// Runs never overlap; a slow run delays the next tick. On an owning
    /// handle each run first resets items stranded in `SENDING`.
    pub async fn run_periodic<F>(
        &self,
        interval: Duration,
        connectivity: &dyn Connectivity,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("Periodic sync started (every {interval:?})");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Periodic sync stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if !connectivity.is_online().await {
                        tracing::debug!("Offline; skipping sync tick");
                        continue;
                    }
                    if self.outbox.is_owner() {
                        if let Err(error) = self.outbox.recover_interrupted().await {
                            tracing::warn!("Recovery of interrupted items failed: {error}");
                        }
                    }
                    if let Err(error) = self.sync_all().await {
                        tracing::warn!("Sync run aborted by store error: {error}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CaptureOutcome, CollectionSession, Finger, FingerCapture, NewSyncItem, RecordSyncStatus,
        SessionType, SyncItem, SyncKind,
    };
    use crate::sync::{Ack, ManualConnectivity, ScriptedDelivery};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    async fn enqueue(outbox: &OutboxService, entity_ref: &str, priority: i32) -> SyncItem {
        outbox
            .enqueue(
                NewSyncItem::new(SyncKind::Image, format!(r#"{{"ref":"{entity_ref}"}}"#))
                    .with_priority(priority)
                    .with_entity_ref(entity_ref),
            )
            .await
            .unwrap()
    }

    async fn setup() -> (OutboxService, Arc<ScriptedDelivery>, SyncDriver) {
        let outbox = OutboxService::open_in_memory().await.unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());
        let driver = SyncDriver::new(outbox.clone(), delivery.clone());
        (outbox, delivery, driver)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_all_reports_partial_failure_without_contamination() {
        let (outbox, delivery, driver) = setup().await;
        let a = enqueue(&outbox, "a", 1).await;
        let b = enqueue(&outbox, "b", 1).await;
        delivery.fail_next("a", "connection reset");

        let summary = driver.sync_all().await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                succeeded: 1,
                failed: 1,
                conflicts: 0,
                skipped: 0,
            }
        );

        let a = outbox.get(a.id).await.unwrap().unwrap();
        assert_eq!(a.status, SyncStatus::Error);
        assert_eq!(a.attempts, 1);
        assert_eq!(a.last_error.as_deref(), Some("connection reset"));

        let b = outbox.get(b.id).await.unwrap().unwrap();
        assert_eq!(b.status, SyncStatus::Done);
        assert_eq!(b.attempts, 1);
        assert_eq!(b.last_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_all_counts_over_many_items() {
        let (outbox, delivery, driver) = setup().await;
        for index in 0..10 {
            let entity_ref = format!("item-{index}");
            enqueue(&outbox, &entity_ref, 2).await;
            if index % 3 == 0 {
                delivery.fail_next(&entity_ref, "timeout");
            }
        }

        let summary = driver.sync_all().await.unwrap();
        assert_eq!(summary.succeeded, 6);
        assert_eq!(summary.failed, 4);
        assert_eq!(outbox.counts().await.unwrap().done, 6);
        assert_eq!(outbox.error_count().await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_all_processes_in_priority_order() {
        let (outbox, delivery, driver) = setup().await;
        enqueue(&outbox, "low", 3).await;
        enqueue(&outbox, "urgent", 1).await;
        enqueue(&outbox, "middle", 2).await;

        driver.sync_all().await.unwrap();

        let order: Vec<String> = delivery
            .calls()
            .into_iter()
            .filter_map(|call| call.entity_ref)
            .collect();
        assert_eq!(order, vec!["urgent", "middle", "low"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn errored_items_are_retried_by_next_run_and_attempts_accumulate() {
        let (outbox, delivery, driver) = setup().await;
        let item = enqueue(&outbox, "flaky", 1).await;
        delivery.fail_next("flaky", "timeout");
        delivery.fail_next("flaky", "timeout");

        driver.sync_all().await.unwrap();
        driver.sync_all().await.unwrap();
        let summary = driver.sync_all().await.unwrap();
        assert_eq!(summary.succeeded, 1);

        let item = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(item.status, SyncStatus::Done);
        assert_eq!(item.attempts, 3);
        assert_eq!(item.last_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicts_are_not_retried_automatically() {
        let (outbox, delivery, driver) = setup().await;
        let item = enqueue(&outbox, "dup", 1).await;
        delivery.conflict_next("dup", "record already exists");

        let first = driver.sync_all().await.unwrap();
        assert_eq!(first.conflicts, 1);
        assert_eq!(first.failed, 1);

        let second = driver.sync_all().await.unwrap();
        assert_eq!(second.attempted(), 0);

        let item = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(item.status, SyncStatus::Conflict);
        assert_eq!(item.attempts, 1);
        assert_eq!(delivery.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_on_conflict_delivers_and_completes() {
        let (outbox, delivery, driver) = setup().await;
        let item = enqueue(&outbox, "dup", 1).await;
        delivery.conflict_next("dup", "version conflict");
        driver.sync_one(item.id).await.unwrap();

        let outcome = driver.retry(item.id).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered);

        let item = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(item.status, SyncStatus::Done);
        assert_eq!(item.attempts, 2);
        assert_eq!(item.last_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_rejects_items_that_have_not_failed() {
        let (outbox, _delivery, driver) = setup().await;
        let item = enqueue(&outbox, "fresh", 1).await;

        assert!(matches!(
            driver.retry(item.id).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            driver.retry(SyncItemId::new(999)).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn discard_removes_item_from_every_query() {
        let (outbox, delivery, driver) = setup().await;
        let item = enqueue(&outbox, "gone", 1).await;
        delivery.fail_next("gone", "timeout");
        driver.sync_all().await.unwrap();

        driver.discard(item.id).await.unwrap();
        assert!(outbox
            .list_by_status(&SyncStatus::ALL)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            driver.discard(item.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivery_outcome_updates_record_sync_flag() {
        let (outbox, delivery, driver) = setup().await;
        let session = CollectionSession::start(1, "m", "b", "s", SessionType::FirstCollection);
        outbox.record_session(&session, None).await.unwrap();
        let capture = FingerCapture::new(
            session.id,
            Finger::ThumbRight,
            90,
            9,
            10,
            CaptureOutcome::Success,
        );
        outbox.record_finger_capture(&capture, None).await.unwrap();
        delivery.fail_next(&capture.id.as_str(), "timeout");

        let summary = driver.sync_all().await.unwrap();
        assert_eq!(summary.succeeded, 1);

        assert_eq!(
            outbox
                .record_sync_status(SyncKind::Session, &session.id.as_str())
                .await
                .unwrap(),
            Some(RecordSyncStatus::Synced)
        );
        assert_eq!(
            outbox
                .record_sync_status(SyncKind::Finger, &capture.id.as_str())
                .await
                .unwrap(),
            Some(RecordSyncStatus::Error)
        );

        // Session is more urgent than its captures
        let kinds: Vec<SyncKind> = delivery.calls().into_iter().map(|call| call.kind).collect();
        assert_eq!(kinds, vec![SyncKind::Session, SyncKind::Finger]);
    }

    /// Holds every delivery until released
    struct GatedDelivery {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteDelivery for GatedDelivery {
        async fn deliver(
            &self,
            _kind: SyncKind,
            _entity_ref: Option<&str>,
            _payload: &str,
        ) -> std::result::Result<Ack, DeliveryError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Ack::default())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_flight_item_cannot_be_claimed_or_discarded() {
        let outbox = OutboxService::open_in_memory().await.unwrap();
        let gate = Arc::new(GatedDelivery {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let driver = Arc::new(SyncDriver::new(outbox.clone(), gate.clone()));
        let item = enqueue(&outbox, "slow", 1).await;

        let background = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.sync_one(item.id).await })
        };
        gate.entered.notified().await;

        let in_flight = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(in_flight.status, SyncStatus::Sending);
        assert_eq!(in_flight.attempts, 0);
        assert!(matches!(
            driver.sync_one(item.id).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            driver.discard(item.id).await,
            Err(Error::InvalidTransition { .. })
        ));

        gate.release.notify_one();
        let outcome = background.await.unwrap().unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered);
        assert_eq!(
            outbox.get(item.id).await.unwrap().unwrap().status,
            SyncStatus::Done
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rebuilt_driver_continues_from_store_state() {
        let (outbox, delivery, driver) = setup().await;
        let item = enqueue(&outbox, "x", 1).await;
        delivery.fail_next("x", "timeout");
        driver.sync_all().await.unwrap();
        drop(driver);

        let rebuilt = SyncDriver::new(outbox.clone(), delivery.clone());
        let summary = rebuilt.sync_all().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(outbox.get(item.id).await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_outcome_write_releases_item_for_next_run() {
        let (outbox, delivery, driver) = setup().await;
        let session = CollectionSession::start(2, "m", "b", "s", SessionType::FirstCollection);
        let item = outbox.record_session(&session, None).await.unwrap();
        outbox
            .execute_batch(
                "CREATE TRIGGER reject_flag BEFORE UPDATE OF sync_status ON sessions
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            )
            .await
            .unwrap();

        assert!(matches!(
            driver.sync_one(item.id).await,
            Err(Error::Database(_))
        ));
        assert_eq!(delivery.calls().len(), 1);

        let released = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(released.status, SyncStatus::Error);
        assert_eq!(released.attempts, 1);
        assert!(released
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("disk I/O error")));
        assert_eq!(
            outbox
                .record_sync_status(SyncKind::Session, &session.id.as_str())
                .await
                .unwrap(),
            Some(RecordSyncStatus::Pending)
        );

        outbox
            .execute_batch("DROP TRIGGER reject_flag")
            .await
            .unwrap();
        let summary = driver.sync_all().await.unwrap();
        assert_eq!(summary.succeeded, 1);

        let done = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(done.status, SyncStatus::Done);
        assert_eq!(done.attempts, 2);
        assert_eq!(
            outbox
                .record_sync_status(SyncKind::Session, &session.id.as_str())
                .await
                .unwrap(),
            Some(RecordSyncStatus::Synced)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn periodic_run_recovers_stranded_items() {
        let (outbox, delivery, driver) = setup().await;
        let item = enqueue(&outbox, "stranded", 1).await;
        outbox.begin_attempt(item.id).await.unwrap();

        driver
            .run_periodic(
                Duration::from_millis(10),
                &ManualConnectivity::new(true),
                tokio::time::sleep(Duration::from_millis(60)),
            )
            .await;

        let item = outbox.get(item.id).await.unwrap().unwrap();
        assert_eq!(item.status, SyncStatus::Done);
        assert_eq!(item.attempts, 2);
        assert_eq!(delivery.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn periodic_run_skips_while_offline_and_stops_on_shutdown() {
        let (outbox, delivery, driver) = setup().await;
        enqueue(&outbox, "p", 1).await;
        let connectivity = ManualConnectivity::new(false);

        driver
            .run_periodic(
                Duration::from_millis(10),
                &connectivity,
                tokio::time::sleep(Duration::from_millis(60)),
            )
            .await;
        assert!(delivery.calls().is_empty());

        connectivity.set_online(true);
        driver
            .run_periodic(
                Duration::from_millis(10),
                &connectivity,
                tokio::time::sleep(Duration::from_millis(60)),
            )
            .await;
        assert_eq!(delivery.calls().len(), 1);
        assert_eq!(outbox.counts().await.unwrap().done, 1);
    }
}
