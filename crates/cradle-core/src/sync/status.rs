//! Push-based status observer over the outbox.

use std::sync::Arc;

use tokio::sync::watch;

use super::connectivity::Connectivity;
use crate::models::QueueCounts;
use crate::services::OutboxService;
use crate::state::SyncState;

/// Read-only view of queue health and reachability.
///
/// Counts are pushed by the outbox on every mutation; the observer never
/// touches the store.
#[derive(Clone)]
pub struct StatusObserver {
    counts: watch::Receiver<QueueCounts>,
    connectivity: Arc<dyn Connectivity>,
}

impl StatusObserver {
    pub fn new(outbox: &OutboxService, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            counts: outbox.subscribe(),
            connectivity,
        }
    }

    pub fn counts(&self) -> QueueCounts {
        *self.counts.borrow()
    }

    pub fn pending_count(&self) -> usize {
        self.counts.borrow().pending_count()
    }

    pub fn error_count(&self) -> usize {
        self.counts.borrow().error_count()
    }

    pub async fn is_online(&self) -> bool {
        self.connectivity.is_online().await
    }

    pub async fn state(&self) -> SyncState {
        let online = self.is_online().await;
        SyncState::derive(&self.counts(), online)
    }

    /// Wait for the next count change; `None` once every outbox handle is gone.
    pub async fn changed(&mut self) -> Option<QueueCounts> {
        self.counts.changed().await.ok()?;
        Some(*self.counts.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSyncItem, SyncItemPatch, SyncKind, SyncStatus};
    use crate::sync::ManualConnectivity;

    #[tokio::test(flavor = "multi_thread")]
    async fn observer_tracks_pending_and_error_counts() {
        let outbox = OutboxService::open_in_memory().await.unwrap();
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let mut observer = StatusObserver::new(&outbox, connectivity.clone());
        assert_eq!(observer.state().await, SyncState::Synced);

        let item = outbox
            .enqueue(NewSyncItem::new(SyncKind::Form, "{}"))
            .await
            .unwrap();
        let counts = observer.changed().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(observer.pending_count(), 1);
        assert_eq!(observer.state().await, SyncState::Pending);

        outbox
            .update(item.id, &SyncItemPatch::status(SyncStatus::Conflict))
            .await
            .unwrap();
        observer.changed().await.unwrap();
        assert_eq!(observer.pending_count(), 0);
        assert_eq!(observer.error_count(), 1);
        assert_eq!(observer.state().await, SyncState::Error);

        connectivity.set_online(false);
        assert!(!observer.is_online().await);
        assert_eq!(observer.state().await, SyncState::Offline);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changed_returns_none_after_outbox_dropped() {
        let outbox = OutboxService::open_in_memory().await.unwrap();
        let mut observer = StatusObserver::new(&outbox, Arc::new(ManualConnectivity::new(true)));
        drop(outbox);

        assert_eq!(observer.changed().await, None);
    }
}
