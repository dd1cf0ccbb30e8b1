//! Error types for the webwii loader

use thiserror::Error;

/// Main error type for the loader
#[derive(Error, Debug)]
pub enum WebWiiError {
    #[error("Read failed: {0}")]
    Read(#[from] ReadFailure),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Operation error: {0}")]
    Gate(#[from] GateError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkFailure),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Unrecognized file type: {0}")]
    UnknownType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Byte source read failures
///
/// Reported once, as the terminal event of a read. No partial buffer is
/// ever surfaced alongside one of these.
#[derive(Error, Debug)]
pub enum ReadFailure {
    #[error("{name} is empty")]
    Empty { name: String },

    #[error("{name} could not be read: {source}")]
    Unreadable {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} ended after {actual} of {expected} bytes")]
    Truncated {
        name: String,
        expected: u64,
        actual: u64,
    },
}

/// A rejected validation verdict
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Staging namespace errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StagingError {
    #[error("Invalid staging path: {0}")]
    InvalidPath(String),

    #[error("Nothing staged at {0}")]
    NotFound(String),

    #[error("Staging area is full ({0} entries)")]
    Full(usize),
}

/// Destructive-operation gate errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("An operation is already running on {0}")]
    OperationInProgress(String),

    #[error("Operation {id} is {state}, expected {expected}")]
    WrongState {
        id: u64,
        state: String,
        expected: String,
    },
}

/// Failure reported by an external sink while an operation is running
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} (at {progress}%)")]
pub struct SinkFailure {
    pub reason: String,
    pub progress: u8,
}

impl SinkFailure {
    pub fn new(reason: impl Into<String>, progress: u8) -> Self {
        Self {
            reason: reason.into(),
            progress,
        }
    }
}

/// External emulator engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0} backend is not available")]
    Unavailable(String),

    #[error("No backend could boot {0}")]
    BootFailed(String),

    #[error("No image has been booted")]
    NotBooted,

    #[error("Disclaimer has not been accepted")]
    ConsentRequired,

    #[error("Invalid save state slot: {0}")]
    InvalidSlot(u32),

    #[error("{0}")]
    Backend(String),
}

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, WebWiiError>;
