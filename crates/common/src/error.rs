//! Error types for the dragnet pipeline.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DragnetError {
    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("generation budget exhausted: produced {produced} of {requested}")]
    Exhausted { produced: usize, requested: usize },

    #[error("address space overflow")]
    AddressOverflow,

    #[error("probe pool backpressure")]
    Backpressure,

    #[error("probe pool shut down")]
    Shutdown,

    #[error("engine already running")]
    AlreadyRunning,

    #[error("operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for DragnetError {
    fn from(err: serde_json::Error) -> Self {
        DragnetError::Parse(err.to_string())
    }
}

/// Result type alias for dragnet operations.
pub type DragnetResult<T> = Result<T, DragnetError>;
