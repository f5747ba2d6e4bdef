//! Fatal error types for the audit core.
//!
//! Anything that aborts the whole audit is an [`AuditError`]. Degraded outcomes
//! (unresolved dependencies, unavailable registry metadata, ambiguous license
//! files) are never errors: they are recorded as warnings or buckets on the
//! result instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::process::CommandError;

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Unsupported package manager: {0}")]
    UnsupportedPackageManager(String),

    #[error(
        "Detected both Node and Python project signals. \
         Set ecosystem in config (ecosystem: \"node\" | \"python\" | \"both\") or pass --ecosystem."
    )]
    AmbiguousEcosystem,

    #[error("Python interpreter was not found. Provide --python <path> or install python3/python.")]
    PythonInterpreterNotFound,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid filter regex {pattern:?}: {source}")]
    InvalidFilterRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Failed to parse manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuditError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn manifest(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
