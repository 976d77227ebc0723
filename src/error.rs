//! Error types for chapter detection, validation and split orchestration.
//!
//! Collaborators (splitter, evidence provider) report `anyhow::Error`; everything the
//! crate itself returns goes through [`SplitError`].

use std::path::PathBuf;

/// Top-level error type for all chaptersplit operations.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// The document reports zero pages.
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },

    /// One or more chapter-set invariants are violated. Nothing was applied.
    #[error("validation failed: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    /// A repair cascade could not restore a well-formed chapter set.
    #[error("irreparable boundary state: {message}")]
    IrreparableBoundaryState { message: String },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The external splitter failed on a specific chapter.
    #[error("split failed on chapter {chapter} ({title}): {source}")]
    SplitFailure {
        chapter: usize,
        title: String,
        #[source]
        source: anyhow::Error,
    },

    /// Shared task state is inconsistent. Unreachable under correct locking.
    #[error("internal registry error: {0}")]
    InternalRegistry(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SplitError>;

impl SplitError {
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: msg.into(),
        }
    }

    /// Single-issue validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            issues: vec![msg.into()],
        }
    }

    pub fn irreparable(msg: impl Into<String>) -> Self {
        Self::IrreparableBoundaryState {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Issues carried by a validation error, empty for every other variant.
    pub fn issues(&self) -> &[String] {
        match self {
            Self::Validation { issues } => issues,
            _ => &[],
        }
    }
}
