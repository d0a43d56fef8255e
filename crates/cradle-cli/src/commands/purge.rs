use std::time::Duration;

use crate::commands::common::open_outbox;
use crate::config::RuntimeSettings;
use crate::error::CliError;

const SECS_PER_HOUR: u64 = 60 * 60;

pub async fn run_purge(older_than_hours: u64, settings: &RuntimeSettings) -> Result<(), CliError> {
    let older_than = Duration::from_secs(older_than_hours.saturating_mul(SECS_PER_HOUR));
    let outbox = open_outbox(settings).await?;
    let purged = outbox.purge_done(older_than).await?;
    println!("Purged {purged} delivered item(s)");
    Ok(())
}
