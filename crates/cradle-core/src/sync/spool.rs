//! Outbound spool directory delivery.
//!
//! Each delivered change becomes one JSON envelope file that an uplink
//! process (or a removable-media transfer) forwards to the remote system.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::delivery::{Ack, DeliveryError, RemoteDelivery};
use crate::models::SyncKind;
use crate::util::unix_millis_now;

#[derive(Debug, Serialize, Deserialize)]
struct SpoolEnvelope {
    kind: SyncKind,
    entity_ref: Option<String>,
    payload: String,
    spooled_at: i64,
}

/// Publishes payloads as envelope files into a spool directory
#[derive(Debug, Clone)]
pub struct SpoolDelivery {
    dir: PathBuf,
}

impl SpoolDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stable file name for a change: re-delivery lands on the same file.
    /// Unreferenced payloads are keyed by a BLAKE3 content digest.
    fn file_name(kind: SyncKind, entity_ref: Option<&str>, payload: &str) -> String {
        let key = entity_ref.map_or_else(
            || blake3::hash(payload.as_bytes()).to_hex()[..32].to_string(),
            sanitize_ref,
        );
        format!("{}-{key}.json", kind.as_str().to_ascii_lowercase())
    }
}

#[async_trait]
impl RemoteDelivery for SpoolDelivery {
    async fn deliver(
        &self,
        kind: SyncKind,
        entity_ref: Option<&str>,
        payload: &str,
    ) -> Result<Ack, DeliveryError> {
        let name = Self::file_name(kind, entity_ref, payload);
        let path = self.dir.join(&name);

        match tokio::fs::read_to_string(&path).await {
            Ok(existing) => {
                let envelope: SpoolEnvelope = serde_json::from_str(&existing).map_err(|error| {
                    DeliveryError::Conflict(format!("spooled file {name} is unreadable: {error}"))
                })?;
                if envelope.payload == payload {
                    tracing::debug!("Spool already holds identical {name}");
                    return Ok(Ack {
                        remote_ref: Some(name),
                    });
                }
                return Err(DeliveryError::Conflict(format!(
                    "spool already holds a different version of {name}"
                )));
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(DeliveryError::Transient(format!(
                    "failed to read {}: {error}",
                    path.display()
                )));
            }
        }

        let envelope = SpoolEnvelope {
            kind,
            entity_ref: entity_ref.map(str::to_string),
            payload: payload.to_string(),
            spooled_at: unix_millis_now(),
        };
        let body = serde_json::to_vec_pretty(&envelope)
            .map_err(|error| DeliveryError::Transient(format!("failed to encode envelope: {error}")))?;

        // Write then rename so a reader never sees a partial envelope
        let tmp_path = self.dir.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp_path, body).await.map_err(|error| {
            DeliveryError::Transient(format!(
                "spool directory {} unavailable: {error}",
                self.dir.display()
            ))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|error| {
            DeliveryError::Transient(format!("failed to publish {name}: {error}"))
        })?;

        tracing::debug!("Spooled {kind} change to {}", path.display());
        Ok(Ack {
            remote_ref: Some(name),
        })
    }
}

fn sanitize_ref(entity_ref: &str) -> String {
    entity_ref
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
