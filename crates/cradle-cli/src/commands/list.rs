use crate::commands::common::{format_item_lines, open_outbox, parse_statuses};
use crate::config::RuntimeSettings;
use crate::error::CliError;

pub async fn run_list(
    statuses: &[String],
    as_json: bool,
    settings: &RuntimeSettings,
) -> Result<(), CliError> {
    let statuses = parse_statuses(statuses)?;
    let outbox = open_outbox(settings).await?;
    let items = outbox.list_by_status(&statuses).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("Outbox is empty.");
    } else {
        for line in format_item_lines(&items) {
            println!("{line}");
        }
    }
    Ok(())
}
