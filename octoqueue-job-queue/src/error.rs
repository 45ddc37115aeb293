//! Error types for the job queue.

use octoqueue_tracker::TrackerError;
use thiserror::Error;

use crate::status::{JobStatus, Transition};
use crate::types::JobId;

/// Errors that may occur while operating the job queue.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("issue tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("cannot {transition} job {id} while it is {from}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        transition: Transition,
    },

    #[error("failed to encode job payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl JobQueueError {
    /// Returns true if the tracker reported the job (or a label on it) as missing.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Tracker(e) if e.is_not_found())
    }
}
