use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use cradle_core::models::RecordId;
use cradle_core::sync::{Connectivity, ManualConnectivity, SpoolDelivery, SyncDriver, TcpProbe};
use cradle_core::{OutboxService, SyncItem, SyncStatus};

use crate::config::RuntimeSettings;
use crate::error::CliError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn open_outbox(settings: &RuntimeSettings) -> Result<OutboxService, CliError> {
    Ok(OutboxService::open_path(&settings.db_path).await?)
}

/// Handle for commands that deliver; fails while another process delivers.
pub async fn open_owned_outbox(settings: &RuntimeSettings) -> Result<OutboxService, CliError> {
    Ok(OutboxService::open_owned(&settings.db_path).await?)
}

/// Reachability check for the configured probe; always online without one.
pub fn connectivity(settings: &RuntimeSettings) -> Arc<dyn Connectivity> {
    match settings.config.probe_addr.clone() {
        Some(addr) => Arc::new(TcpProbe::new(addr, PROBE_TIMEOUT)),
        None => Arc::new(ManualConnectivity::new(true)),
    }
}

/// Driver publishing into the spool directory.
///
/// The default spool next to the database is created on demand; an
/// explicitly configured one must already exist (it may be removable media).
pub async fn build_driver(
    outbox: OutboxService,
    settings: &RuntimeSettings,
) -> Result<SyncDriver, CliError> {
    if settings.config.spool_dir.is_none() {
        tokio::fs::create_dir_all(&settings.spool_dir).await?;
    }
    let delivery = Arc::new(SpoolDelivery::new(settings.spool_dir.clone()));
    Ok(SyncDriver::new(outbox, delivery))
}

pub fn parse_statuses(raw: &[String]) -> Result<Vec<SyncStatus>, CliError> {
    if raw.is_empty() {
        return Ok(SyncStatus::ALL.to_vec());
    }

    let mut statuses = Vec::with_capacity(raw.len());
    for value in raw {
        let status = value.parse::<SyncStatus>()?;
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    Ok(statuses)
}

/// Trim and check that the payload is a JSON document.
pub fn normalize_payload(raw: &str) -> Result<String, CliError> {
    let payload = raw.trim();
    if payload.is_empty() {
        return Err(CliError::EmptyPayload);
    }
    serde_json::from_str::<serde_json::Value>(payload)
        .map_err(|error| CliError::InvalidPayload(error.to_string()))?;
    Ok(payload.to_string())
}

pub fn parse_record_id(raw: &str) -> Result<RecordId, CliError> {
    raw.trim().parse::<RecordId>().map_err(|error| {
        CliError::Core(cradle_core::Error::InvalidInput(format!(
            "invalid record id {raw}: {error}"
        )))
    })
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(
            || timestamp_ms.to_string(),
            |time| time.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
}

pub fn format_item_lines(items: &[SyncItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "{:>6}  {:<8}  {:<11}  p{}  attempts={}  {}",
                item.id,
                item.status,
                item.kind,
                item.priority,
                item.attempts,
                format_timestamp(item.updated_at),
            );
            if let Some(entity_ref) = item.entity_ref.as_deref() {
                line.push_str("  ref=");
                line.push_str(entity_ref);
            }
            if let Some(error) = item.last_error.as_deref() {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}
