use cradle_core::SyncItemId;

use crate::commands::common::open_outbox;
use crate::config::RuntimeSettings;
use crate::error::CliError;

pub async fn run_discard(
    id: i64,
    confirmed: bool,
    settings: &RuntimeSettings,
) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired(id));
    }

    let outbox = open_outbox(settings).await?;
    let item = outbox.discard(SyncItemId::new(id)).await?;
    println!("Discarded sync item {} ({} {})", item.id, item.kind, item.status);
    Ok(())
}
