//! Remote delivery capability consumed by the sync driver.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SyncKind;

/// Acknowledgement returned by the remote side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Identifier assigned by the remote authority, when it returns one
    pub remote_ref: Option<String>,
}

/// Why a delivery attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Timeouts, unreachable endpoint, server-side faults; retry later
    #[error("{0}")]
    Transient(String),
    /// The remote already holds an incompatible version; needs review
    #[error("{0}")]
    Conflict(String),
}

/// Opaque transport that carries one payload to the remote authority.
///
/// Implementations own their timeout policy. The driver never interprets
/// the payload and never retries inside a single call.
#[async_trait]
pub trait RemoteDelivery: Send + Sync {
    async fn deliver(
        &self,
        kind: SyncKind,
        entity_ref: Option<&str>,
        payload: &str,
    ) -> Result<Ack, DeliveryError>;
}
