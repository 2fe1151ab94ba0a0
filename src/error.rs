//! Error types for the logging engine

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or rotating the logging engine
///
/// Construction errors (`InvalidConfig`, `CreateDir`, `Open`, `SpawnFlusher`)
/// mean logging cannot work at all; hosts are expected to abort startup on them.
#[derive(Debug, Error)]
pub enum LogError {
    /// A configuration value failed validation
    #[error("invalid log configuration: {0}")]
    InvalidConfig(String),

    /// The log directory could not be created
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A log file could not be opened
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Renaming or reopening during rotation failed
    #[error("failed to rotate {path}: {source}")]
    Rotate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The background flusher thread could not be started
    #[error("failed to spawn flusher thread: {0}")]
    SpawnFlusher(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias for engine construction
pub type LogResult<T> = std::result::Result<T, LogError>;
