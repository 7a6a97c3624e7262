//! Error taxonomy for graphit.
//!
//! Resolution failures never show up here: a module specifier that cannot be
//! mapped to a local file is `None`, not an error. What does show up is
//! surfaced per file during a crawl and caught at the crawl boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the graph engine.
#[derive(Error, Debug)]
pub enum GraphError {
    /// File or module missing on disk.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File exceeds the configured size guard.
    #[error("{} is too large ({size} bytes, limit {limit})", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Read exceeded its time budget.
    #[error("reading {} timed out after {millis}ms", path.display())]
    Timeout { path: PathBuf, millis: u64 },

    /// A syntax engine could not be initialized or loaded.
    #[error("engine initialization failed for {language}: {reason}")]
    EngineInit { language: String, reason: String },

    /// No parser is registered for this file's extension.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Coarse classification, suitable for shipping to a UI.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::NotFound(_) => ErrorKind::NotFound,
            GraphError::TooLarge { .. } => ErrorKind::TooLarge,
            GraphError::Timeout { .. } => ErrorKind::Timeout,
            GraphError::EngineInit { .. } => ErrorKind::EngineInitFailure,
            GraphError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            GraphError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            GraphError::Io(_) => ErrorKind::Io,
            GraphError::Config(_) => ErrorKind::Config,
            GraphError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

impl From<bincode::Error> for GraphError {
    fn from(e: bincode::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

/// Serializable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    TooLarge,
    Timeout,
    EngineInitFailure,
    UnsupportedLanguage,
    Io,
    Config,
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::TooLarge => write!(f, "too_large"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::EngineInitFailure => write!(f, "engine_init_failure"),
            ErrorKind::UnsupportedLanguage => write!(f, "unsupported_language"),
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Serialization => write!(f, "serialization"),
        }
    }
}

/// A failure recorded against one crawled file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&GraphError> for NodeError {
    fn from(err: &GraphError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
