//! Deterministic delivery double for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::delivery::{Ack, DeliveryError, RemoteDelivery};
use crate::models::SyncKind;

/// Recorded call to [`ScriptedDelivery::deliver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCall {
    pub kind: SyncKind,
    pub entity_ref: Option<String>,
    pub payload: String,
}

/// Returns pre-scripted outcomes keyed by entity reference.
///
/// Unscripted calls succeed. Each scripted outcome is consumed once, in
/// the order it was pushed.
#[derive(Debug, Default)]
pub struct ScriptedDelivery {
    outcomes: Mutex<HashMap<String, VecDeque<Result<Ack, DeliveryError>>>>,
    calls: Mutex<Vec<DeliveryCall>>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome for `entity_ref`
    pub fn push_outcome(&self, entity_ref: &str, outcome: Result<Ack, DeliveryError>) {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(entity_ref.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queue a transient failure for `entity_ref`
    pub fn fail_next(&self, entity_ref: &str, message: &str) {
        self.push_outcome(entity_ref, Err(DeliveryError::Transient(message.to_string())));
    }

    /// Queue a conflict for `entity_ref`
    pub fn conflict_next(&self, entity_ref: &str, message: &str) {
        self.push_outcome(entity_ref, Err(DeliveryError::Conflict(message.to_string())));
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RemoteDelivery for ScriptedDelivery {
    async fn deliver(
        &self,
        kind: SyncKind,
        entity_ref: Option<&str>,
        payload: &str,
    ) -> Result<Ack, DeliveryError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(DeliveryCall {
                kind,
                entity_ref: entity_ref.map(str::to_string),
                payload: payload.to_string(),
            });

        let scripted = entity_ref.and_then(|entity_ref| {
            self.outcomes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get_mut(entity_ref)
                .and_then(VecDeque::pop_front)
        });

        scripted.unwrap_or_else(|| Ok(Ack::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn scripted_outcomes_are_consumed_in_order() {
        let delivery = ScriptedDelivery::new();
        delivery.fail_next("a", "timeout");
        delivery.conflict_next("a", "stale");

        let first = delivery.deliver(SyncKind::Session, Some("a"), "{}").await;
        let second = delivery.deliver(SyncKind::Session, Some("a"), "{}").await;
        let third = delivery.deliver(SyncKind::Session, Some("a"), "{}").await;

        assert_eq!(first, Err(DeliveryError::Transient("timeout".to_string())));
        assert_eq!(second, Err(DeliveryError::Conflict("stale".to_string())));
        assert_eq!(third, Ok(Ack::default()));
        assert_eq!(delivery.calls().len(), 3);
    }
}
