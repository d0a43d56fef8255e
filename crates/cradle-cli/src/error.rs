use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cradle_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Payload cannot be empty")]
    EmptyPayload,
    #[error("Payload is not valid JSON: {0}")]
    InvalidPayload(String),
    #[error("Refusing to discard sync item {0} without --yes")]
    ConfirmationRequired(i64),
    #[error("Configuration error: {0}")]
    Config(String),
}
