//! Core types shared by tracker implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracker-assigned issue identifier. Stable and never reused.
pub type IssueNumber = u64;

/// Open/closed state of an issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State filter for listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Open,
    Closed,
    All,
}

impl StateFilter {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }

    #[inline]
    pub fn matches(self, state: IssueState) -> bool {
        match self {
            Self::Open => state == IssueState::Open,
            Self::Closed => state == IssueState::Closed,
            Self::All => true,
        }
    }
}

impl From<IssueState> for StateFilter {
    fn from(state: IssueState) -> Self {
        match state {
            IssueState::Open => Self::Open,
            IssueState::Closed => Self::Closed,
        }
    }
}

/// An issue as seen by the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub number: IssueNumber,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    #[inline]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Body text, empty when the issue has no body.
    #[inline]
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Request to create an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// A repository label. `color` is six hex digits without `#`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub color: String,
}

impl Label {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabelEventKind {
    Labeled,
    Unlabeled,
}

/// One entry of an issue's label history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelEvent {
    pub kind: LabelEventKind,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Listing filter: issues carrying every label in `labels`, in `state`,
/// oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    pub labels: Vec<String>,
    pub state: StateFilter,
}

impl IssueQuery {
    pub fn new(state: StateFilter) -> Self {
        Self {
            labels: Vec::new(),
            state,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Whether an issue satisfies the label and state filter.
    pub fn matches(&self, issue: &Issue) -> bool {
        self.state.matches(issue.state) && self.labels.iter().all(|l| issue.has_label(l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(labels: &[&str], state: IssueState) -> Issue {
        Issue {
            number: 1,
            title: "t".into(),
            body: None,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            state,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn query_requires_every_label() {
        let q = IssueQuery::new(StateFilter::Open)
            .with_label("pending")
            .with_label("mastodon");
        assert!(q.matches(&issue(&["pending", "mastodon"], IssueState::Open)));
        assert!(!q.matches(&issue(&["pending"], IssueState::Open)));
        assert!(!q.matches(&issue(&["pending", "mastodon"], IssueState::Closed)));
    }

    #[test]
    fn all_filter_matches_both_states() {
        let q = IssueQuery::new(StateFilter::All);
        assert!(q.matches(&issue(&[], IssueState::Open)));
        assert!(q.matches(&issue(&[], IssueState::Closed)));
    }

    #[test]
    fn missing_body_reads_as_empty() {
        assert_eq!(issue(&[], IssueState::Open).body_text(), "");
    }
}
