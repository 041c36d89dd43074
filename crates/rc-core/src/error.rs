//! # CommentError
//!
//! Centralized error handling for the rusty-comments crates.
//! Maps policy and registry failures to actionable error types.

use thiserror::Error;

use crate::forms::FieldErrors;

/// The primary error type for all rc-core operations.
#[derive(Error, Debug)]
pub enum CommentError {
    /// A configuration key was registered twice.
    #[error("comment configuration {0:?} is already registered")]
    AlreadyRegistered(String),

    /// A configuration key was looked up or removed without being registered.
    #[error("comment configuration {0:?} is not registered")]
    NotRegistered(String),

    /// Comments closed, authentication required, or deletion not permitted.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Content or spam-check rejection, with field-level messages.
    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),

    /// Unknown target, comment, or page.
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// A policy was assembled with settings it cannot honor.
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    /// Failure reported by an external store or service (not retried).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl CommentError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }
}

/// A specialized Result type for rusty-comments logic.
pub type Result<T> = std::result::Result<T, CommentError>;
