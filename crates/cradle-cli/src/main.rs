//! Cradle CLI - operate the collection device outbox from the terminal
//!
//! Inspect the queue, record entities, and drive delivery by hand or on a
//! timer.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use tracing_subscriber::filter::Directive;

use crate::cli::{Cli, Commands};
use crate::commands::discard::run_discard;
use crate::commands::enqueue::run_enqueue;
use crate::commands::list::run_list;
use crate::commands::purge::run_purge;
use crate::commands::record::run_record;
use crate::commands::status::run_status;
use crate::commands::sync::{run_retry, run_sync};
use crate::commands::watch::run_watch;
use crate::config::resolve_settings;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "cradle=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let settings = resolve_settings(cli.db_path, cli.config)?;

    match cli.command {
        Commands::Status { json } => run_status(json, &settings).await?,
        Commands::List { statuses, json } => run_list(&statuses, json, &settings).await?,
        Commands::Enqueue {
            kind,
            priority,
            entity_ref,
            payload,
        } => {
            run_enqueue(&kind, priority, entity_ref, &payload, &settings).await?;
        }
        Commands::Record { command } => run_record(command, &settings).await?,
        Commands::Sync { json } => run_sync(json, &settings).await?,
        Commands::Retry { id } => run_retry(id, &settings).await?,
        Commands::Discard { id, yes } => run_discard(id, yes, &settings).await?,
        Commands::Purge { older_than_hours } => run_purge(older_than_hours, &settings).await?,
        Commands::Watch => run_watch(&settings).await?,
    }

    Ok(())
}
