use cradle_core::models::NewSyncItem;
use cradle_core::util::normalize_text_option;
use cradle_core::{SyncItem, SyncKind};

use crate::commands::common::{normalize_payload, open_outbox};
use crate::config::RuntimeSettings;
use crate::error::CliError;

pub async fn enqueue_payload(
    kind: &str,
    priority: Option<i32>,
    entity_ref: Option<String>,
    payload: &str,
    settings: &RuntimeSettings,
) -> Result<SyncItem, CliError> {
    let kind = kind.parse::<SyncKind>()?;
    let payload = normalize_payload(payload)?;

    let mut item = NewSyncItem::new(kind, payload)
        .with_priority(priority.unwrap_or_else(|| settings.config.priority_for(kind)));
    if let Some(entity_ref) = normalize_text_option(entity_ref) {
        item = item.with_entity_ref(entity_ref);
    }

    let outbox = open_outbox(settings).await?;
    Ok(outbox.enqueue(item).await?)
}

pub async fn run_enqueue(
    kind: &str,
    priority: Option<i32>,
    entity_ref: Option<String>,
    payload: &str,
    settings: &RuntimeSettings,
) -> Result<(), CliError> {
    let item = enqueue_payload(kind, priority, entity_ref, payload, settings).await?;
    println!("{}", item.id);
    Ok(())
}
