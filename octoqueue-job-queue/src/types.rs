//! Core types for the job queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use octoqueue_tracker::{IssueNumber, Label};
use serde::{Deserialize, Serialize};

/// Job identifier: the number of the issue that carries the job.
pub type JobId = IssueNumber;

/// Opaque job data. Always a JSON object.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A job to be enqueued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJob {
    pub payload: Payload,
    pub title: Option<String>,
    pub extra_labels: Vec<String>,
}

impl NewJob {
    #[inline]
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            title: None,
            extra_labels: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Extra tags kept on the job across every transition (routing tags and the like).
    #[inline]
    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_labels.extend(labels.into_iter().map(Into::into));
        self
    }
}

/// A job returned by a successful claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub id: JobId,
    /// `None` when the issue body no longer contains a readable payload.
    pub payload: Option<Payload>,
}

/// A job returned by a label listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub id: JobId,
    /// When one of the requested labels was most recently applied.
    pub label_applied_at: Option<DateTime<Utc>>,
    pub payload: Payload,
}

/// Construction options for [`JobQueue`](crate::JobQueue).
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Wait before listing in `count_open` and `dequeue`, to let the tracker's
    /// search index catch up with recent writes.
    pub read_delay: Duration,
    /// Extra labels provisioned next to the status vocabulary.
    pub reserved_labels: Vec<Label>,
}

impl QueueOptions {
    #[must_use]
    pub fn with_read_delay(mut self, read_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self
    }

    #[must_use]
    pub fn with_reserved_label(mut self, name: impl Into<String>, color: impl Into<String>) -> Self {
        self.reserved_labels.push(Label::new(name, color));
        self
    }
}
