use crate::commands::common::{build_driver, connectivity, open_owned_outbox};
use crate::config::RuntimeSettings;
use crate::error::CliError;

pub async fn run_watch(settings: &RuntimeSettings) -> Result<(), CliError> {
    let outbox = open_owned_outbox(settings).await?;
    let driver = build_driver(outbox, settings).await?;
    let connectivity = connectivity(settings);
    let interval = settings.config.sync_interval();

    println!(
        "Watching outbox at {} every {}s (Ctrl-C to stop)",
        settings.db_path.display(),
        interval.as_secs()
    );

    driver
        .run_periodic(interval, connectivity.as_ref(), async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {error}");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
