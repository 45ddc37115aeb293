//! Job lifecycle: status vocabulary, status derivation and legal transitions.
//!
//! A job's status is never stored on its own. It is derived from the issue's
//! labels together with its open/closed state:
//!
//! | Status       | Label        | Issue state |
//! |--------------|--------------|-------------|
//! | `Pending`    | `pending`    | open        |
//! | `Processing` | `processing` | open        |
//! | `Completed`  | `completed`  | closed      |
//! | `Failed`     | `failed`     | closed      |
//!
//! Anything else is `Unknown`: the issue exists but sits outside the queue's
//! vocabulary.

use octoqueue_tracker::{Issue, IssueState, Label};
use serde::{Deserialize, Serialize};

/// The primary status labels. Every managed job carries exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StatusLabel {
    pub const ALL: [StatusLabel; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Display color used when the label is provisioned.
    #[inline]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Pending => "0dbf66",
            Self::Processing => "0052cc",
            Self::Completed => "2cbe4e",
            Self::Failed => "d93f0b",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == name)
    }

    /// Whether `name` belongs to the status vocabulary.
    #[inline]
    pub fn is_status_label(name: &str) -> bool {
        Self::from_name(name).is_some()
    }

    pub fn to_label(self) -> Label {
        Label::new(self.as_str(), self.color())
    }
}

impl std::fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a job, derived from its issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Unknown,
}

impl JobStatus {
    /// Derive the status from labels and open/closed state.
    ///
    /// If a race left two open status labels on an issue, `processing` wins:
    /// the claim is the later write.
    pub fn derive<S: AsRef<str>>(labels: &[S], state: IssueState) -> Self {
        let has = |label: StatusLabel| labels.iter().any(|l| l.as_ref() == label.as_str());
        match state {
            IssueState::Open if has(StatusLabel::Processing) => Self::Processing,
            IssueState::Open if has(StatusLabel::Pending) => Self::Pending,
            IssueState::Closed if has(StatusLabel::Completed) => Self::Completed,
            IssueState::Closed if has(StatusLabel::Failed) => Self::Failed,
            _ => Self::Unknown,
        }
    }

    #[inline]
    pub fn of(issue: &Issue) -> Self {
        Self::derive(&issue.labels, issue.state)
    }

    /// The status label carried by a job in this status.
    #[inline]
    pub const fn label(self) -> Option<StatusLabel> {
        match self {
            Self::Pending => Some(StatusLabel::Pending),
            Self::Processing => Some(StatusLabel::Processing),
            Self::Completed => Some(StatusLabel::Completed),
            Self::Failed => Some(StatusLabel::Failed),
            Self::Unknown => None,
        }
    }

    /// Pending and processing jobs are the ones still in flight.
    #[inline]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub const fn as_str(self) -> &'static str {
        match self.label() {
            Some(label) => label.as_str(),
            None => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle operations that move an existing job between statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Claim,
    Complete,
    Fail,
    Requeue,
}

impl Transition {
    /// Whether the transition is an edge of the lifecycle graph from `from`.
    pub const fn allowed_from(self, from: JobStatus) -> bool {
        match self {
            Self::Claim => matches!(from, JobStatus::Pending),
            Self::Complete | Self::Fail => matches!(from, JobStatus::Processing),
            Self::Requeue => matches!(
                from,
                JobStatus::Processing | JobStatus::Completed | JobStatus::Failed
            ),
        }
    }

    /// Status labels taken off the issue. Absent ones are skipped.
    pub const fn removes(self) -> &'static [StatusLabel] {
        match self {
            Self::Claim => &[StatusLabel::Pending],
            Self::Complete | Self::Fail => &[StatusLabel::Processing],
            Self::Requeue => &[
                StatusLabel::Processing,
                StatusLabel::Completed,
                StatusLabel::Failed,
            ],
        }
    }

    pub const fn adds(self) -> StatusLabel {
        match self {
            Self::Claim => StatusLabel::Processing,
            Self::Complete => StatusLabel::Completed,
            Self::Fail => StatusLabel::Failed,
            Self::Requeue => StatusLabel::Pending,
        }
    }

    pub const fn target_state(self) -> IssueState {
        match self {
            Self::Claim | Self::Requeue => IssueState::Open,
            Self::Complete | Self::Fail => IssueState::Closed,
        }
    }

    pub const fn target(self) -> JobStatus {
        match self {
            Self::Claim => JobStatus::Processing,
            Self::Complete => JobStatus::Completed,
            Self::Fail => JobStatus::Failed,
            Self::Requeue => JobStatus::Pending,
        }
    }

    /// Comment posted on the issue when the caller does not supply one.
    pub const fn default_comment(self) -> Option<&'static str> {
        match self {
            Self::Claim => None,
            Self::Complete => Some("This has been completed, thank you"),
            Self::Fail => Some("This job has failed"),
            Self::Requeue => Some("Job has been requeued for processing"),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Requeue => "requeue",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
