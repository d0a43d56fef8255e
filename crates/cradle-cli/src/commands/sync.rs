use cradle_core::sync::{SyncOutcome, SyncSummary};
use cradle_core::SyncItemId;

use crate::commands::common::{build_driver, connectivity, open_owned_outbox};
use crate::config::RuntimeSettings;
use crate::error::CliError;

/// One delivery pass over the outbox. Skipped while offline.
pub async fn sync_once(settings: &RuntimeSettings) -> Result<Option<SyncSummary>, CliError> {
    if !connectivity(settings).is_online().await {
        return Ok(None);
    }

    let outbox = open_owned_outbox(settings).await?;
    let driver = build_driver(outbox, settings).await?;
    Ok(Some(driver.sync_all().await?))
}

pub async fn run_sync(as_json: bool, settings: &RuntimeSettings) -> Result<(), CliError> {
    let summary = sync_once(settings).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match summary {
        None => println!("Offline; nothing was sent."),
        Some(summary) => println!(
            "Sync completed: {} succeeded, {} failed ({} conflicts)",
            summary.succeeded, summary.failed, summary.conflicts
        ),
    }
    Ok(())
}

pub async fn retry_item(id: i64, settings: &RuntimeSettings) -> Result<SyncOutcome, CliError> {
    let outbox = open_owned_outbox(settings).await?;
    let driver = build_driver(outbox, settings).await?;
    Ok(driver.retry(SyncItemId::new(id)).await?)
}

pub async fn run_retry(id: i64, settings: &RuntimeSettings) -> Result<(), CliError> {
    match retry_item(id, settings).await? {
        SyncOutcome::Delivered => println!("Sync item {id} delivered"),
        SyncOutcome::Failed(message) => println!("Sync item {id} failed again: {message}"),
        SyncOutcome::Conflict(message) => println!("Sync item {id} conflicted: {message}"),
    }
    Ok(())
}
