use cradle_core::storage::StorageUsage;
use cradle_core::sync::StatusObserver;
use cradle_core::{QueueCounts, SyncState, SyncStatus};
use serde::Serialize;

use crate::commands::common::{connectivity, open_outbox};
use crate::config::RuntimeSettings;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: SyncState,
    pub online: bool,
    pub pending: usize,
    pub errors: usize,
    pub counts: QueueCounts,
    pub storage: StorageUsage,
}

pub async fn collect_status(settings: &RuntimeSettings) -> Result<StatusReport, CliError> {
    let outbox = open_outbox(settings).await?;
    let observer = StatusObserver::new(&outbox, connectivity(settings));

    let online = observer.is_online().await;
    let counts = observer.counts();
    let storage = StorageUsage::measure(
        &settings.db_path,
        settings.config.storage_quota_bytes.unwrap_or(0),
    )?;

    Ok(StatusReport {
        state: SyncState::derive(&counts, online),
        online,
        pending: counts.pending_count(),
        errors: counts.error_count(),
        counts,
        storage,
    })
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let counts = &report.counts;
    let mut lines = vec![
        format!("State:    {}", report.state.as_str()),
        format!(
            "Network:  {}",
            if report.online { "online" } else { "offline" }
        ),
        format!("Pending:  {}", report.pending),
        format!("Errors:   {}", report.errors),
    ];

    let breakdown = [
        (SyncStatus::Pending, counts.pending),
        (SyncStatus::Sending, counts.sending),
        (SyncStatus::Error, counts.error),
        (SyncStatus::Conflict, counts.conflict),
        (SyncStatus::Done, counts.done),
    ]
    .iter()
    .map(|(status, count)| format!("{status}={count}"))
    .collect::<Vec<_>>()
    .join(" ");
    lines.push(format!("Queue:    {breakdown}"));

    let storage = &report.storage;
    if storage.quota_bytes == 0 {
        lines.push(format!("Storage:  {} bytes", storage.used_bytes));
    } else {
        lines.push(format!(
            "Storage:  {} / {} bytes ({:.1}%, {})",
            storage.used_bytes,
            storage.quota_bytes,
            storage.percentage,
            storage.level.as_str()
        ));
    }
    lines
}

pub async fn run_status(as_json: bool, settings: &RuntimeSettings) -> Result<(), CliError> {
    let report = collect_status(settings).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
