//! Error types for issue-tracker calls.

use thiserror::Error;

/// Errors reported by an [`IssueTracker`](crate::IssueTracker).
///
/// Callers distinguish the not-found class (see [`TrackerError::is_not_found`])
/// from everything else.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("issue tracker API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("issue tracker is unavailable")]
    Unavailable,
}

impl TrackerError {
    /// Returns true if the tracker reported that the addressed resource does not exist.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
