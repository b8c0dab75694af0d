//! Error types for the LightRAG orchestration shell

use thiserror::Error;

use crate::lightrag::RetrievalMode;

/// Exit code for successful runs.
pub const EXIT_SUCCESS: u8 = 0;
/// Unclassified failure.
pub const EXIT_ERROR: u8 = 1;
/// Missing or invalid configuration.
pub const EXIT_CONFIG_ERROR: u8 = 2;
/// Storage endpoint or server unreachable.
pub const EXIT_CONNECTION_ERROR: u8 = 3;
/// Storage or pipeline-status setup failed.
pub const EXIT_INITIALIZATION_ERROR: u8 = 4;
/// Sample download failed.
pub const EXIT_FETCH_ERROR: u8 = 5;
/// Backend rejected the payload.
pub const EXIT_INGESTION_ERROR: u8 = 6;
/// Backend rejected a retrieval request.
pub const EXIT_QUERY_ERROR: u8 = 7;
/// Another run holds the working directory.
pub const EXIT_LOCKED: u8 = 8;
/// Interrupted by a signal (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("Ingestion error: {0}")]
    IngestionError(String),

    #[error("Query error ({mode} mode): {message}")]
    QueryError {
        mode: RetrievalMode,
        message: String,
    },

    #[error("Finalization error: {0}")]
    FinalizationError(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("Working directory is locked by another run: {0}")]
    WorkingDirLocked(String),

    #[error("Interrupted before the run completed")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ConfigurationError(_) => EXIT_CONFIG_ERROR,
            Error::ConnectionError(_) => EXIT_CONNECTION_ERROR,
            Error::InitializationError(_) => EXIT_INITIALIZATION_ERROR,
            Error::FetchError(_) => EXIT_FETCH_ERROR,
            Error::IngestionError(_) => EXIT_INGESTION_ERROR,
            Error::QueryError { .. } => EXIT_QUERY_ERROR,
            Error::WorkingDirLocked(_) => EXIT_LOCKED,
            Error::Interrupted => EXIT_INTERRUPTED,
            Error::FinalizationError(_) | Error::LifecycleError(_) | Error::IoError(_) => {
                EXIT_ERROR
            }
        }
    }

    /// Build a query error tagged with the mode that failed.
    pub fn query(mode: RetrievalMode, message: impl Into<String>) -> Self {
        Error::QueryError {
            mode,
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ConfigurationError(err.to_string())
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::ConnectionError(err.to_string())
    }
}
