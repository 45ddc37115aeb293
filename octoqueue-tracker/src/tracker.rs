//! The collaborator trait.

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::types::{Issue, IssueNumber, IssueQuery, IssueState, Label, LabelEvent, NewIssue};

/// Operations the queue needs from an issue tracker.
///
/// Implementations are expected to be reliable per their own contract
/// (pagination, transport); they do not retry. None of the calls are
/// transactional with respect to each other.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create an issue carrying the given labels. The tracker assigns the number.
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue, TrackerError>;

    /// List issues carrying all of `query.labels` in the requested state,
    /// ordered by creation time.
    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError>;

    async fn get_issue(&self, number: IssueNumber) -> Result<Issue, TrackerError>;

    async fn add_labels(&self, number: IssueNumber, labels: &[String]) -> Result<(), TrackerError>;

    /// Remove a label. Reports [`TrackerError::NotFound`] when the label is not on the issue.
    async fn remove_label(&self, number: IssueNumber, label: &str) -> Result<(), TrackerError>;

    async fn set_state(&self, number: IssueNumber, state: IssueState) -> Result<(), TrackerError>;

    async fn create_comment(&self, number: IssueNumber, body: &str) -> Result<(), TrackerError>;

    async fn list_labels(&self) -> Result<Vec<Label>, TrackerError>;

    async fn create_label(&self, label: &Label) -> Result<(), TrackerError>;

    /// Label add/remove history of an issue, oldest first.
    async fn list_label_events(&self, number: IssueNumber)
        -> Result<Vec<LabelEvent>, TrackerError>;
}
