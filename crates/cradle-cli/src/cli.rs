use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cradle_core::models::{CaptureOutcome, Finger};

#[derive(Parser)]
#[command(name = "cradle")]
#[command(about = "Local-first outbox for biometric collection devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the CLI config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue counts, connectivity and storage usage
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued items, most urgent first
    List {
        /// Only show items in this status (repeatable)
        #[arg(long = "status", value_name = "STATUS")]
        statuses: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue an arbitrary payload for delivery
    Enqueue {
        /// Entity kind (session, finger, form, image, audit, login-event)
        #[arg(long)]
        kind: String,
        /// Priority override (1 is most urgent)
        #[arg(long)]
        priority: Option<i32>,
        /// Reference to the local entity
        #[arg(long = "ref", value_name = "REF")]
        entity_ref: Option<String>,
        /// JSON payload
        #[arg(long)]
        payload: String,
    },
    /// Record a domain entity and queue it for delivery
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Deliver every pending and failed item once
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue a failed or conflicted item and deliver it now
    Retry {
        /// Sync item ID
        id: i64,
    },
    /// Permanently remove an item from the queue
    Discard {
        /// Sync item ID
        id: i64,
        /// Confirm the discard
        #[arg(long)]
        yes: bool,
    },
    /// Remove delivered items
    Purge {
        /// Only remove items delivered at least this many hours ago
        #[arg(long, default_value = "24")]
        older_than_hours: u64,
    },
    /// Sync periodically until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Start a collection session
    Session {
        #[arg(long)]
        operator_id: i64,
        #[arg(long)]
        mother_ref: String,
        #[arg(long)]
        baby_ref: String,
        #[arg(long)]
        scanner_ref: String,
        /// Origin session ID when this is a recollection
        #[arg(long, value_name = "SESSION_ID")]
        recollection_of: Option<String>,
    },
    /// Record a finger capture for a session
    Finger {
        #[arg(long, value_name = "SESSION_ID")]
        session: String,
        #[arg(long, value_enum)]
        finger: FingerArg,
        /// Capture quality (0-100)
        #[arg(long)]
        quality: u8,
        #[arg(long)]
        frames_ok: u32,
        #[arg(long)]
        frames_total: u32,
        #[arg(long, value_enum, default_value_t = OutcomeArg::Success)]
        outcome: OutcomeArg,
        #[arg(long)]
        image_path: Option<String>,
    },
    /// Record the collection form for a session
    Form {
        #[arg(long, value_name = "SESSION_ID")]
        session: String,
        #[arg(long)]
        questionnaire_version: String,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        humidity: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        quick: bool,
    },
    /// Record an audit entry
    Audit {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        action: String,
        #[arg(long)]
        entity: String,
        #[arg(long = "ref", value_name = "REF")]
        entity_ref: Option<String>,
    },
    /// Record a login attempt
    LoginEvent {
        #[arg(long)]
        email: String,
        /// Mark the attempt as failed
        #[arg(long)]
        failed: bool,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FingerArg {
    ThumbRight,
    ThumbLeft,
    IndexRight,
    IndexLeft,
    MiddleRight,
    MiddleLeft,
    RingRight,
    RingLeft,
    LittleRight,
    LittleLeft,
}

impl From<FingerArg> for Finger {
    fn from(value: FingerArg) -> Self {
        match value {
            FingerArg::ThumbRight => Self::ThumbRight,
            FingerArg::ThumbLeft => Self::ThumbLeft,
            FingerArg::IndexRight => Self::IndexRight,
            FingerArg::IndexLeft => Self::IndexLeft,
            FingerArg::MiddleRight => Self::MiddleRight,
            FingerArg::MiddleLeft => Self::MiddleLeft,
            FingerArg::RingRight => Self::RingRight,
            FingerArg::RingLeft => Self::RingLeft,
            FingerArg::LittleRight => Self::LittleRight,
            FingerArg::LittleLeft => Self::LittleLeft,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutcomeArg {
    Success,
    Failure,
    Partial,
}

impl From<OutcomeArg> for CaptureOutcome {
    fn from(value: OutcomeArg) -> Self {
        match value {
            OutcomeArg::Success => Self::Success,
            OutcomeArg::Failure => Self::Failure,
            OutcomeArg::Partial => Self::Partial,
        }
    }
}
