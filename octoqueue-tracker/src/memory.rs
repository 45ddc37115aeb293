//! In-process issue tracker.
//!
//! Behaves like the GitHub implementation where the queue can observe it:
//! numbers and creation times increase strictly, unknown labels are created
//! on first use, removing a label that is not on the issue reports not-found,
//! and every label change is recorded as an event.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::TrackerError;
use crate::tracker::IssueTracker;
use crate::types::{
    Issue, IssueNumber, IssueQuery, IssueState, Label, LabelEvent, LabelEventKind, NewIssue,
};

/// Color given to labels created implicitly by labelling an issue.
const DEFAULT_LABEL_COLOR: &str = "ededed";

#[derive(Debug)]
struct StoredIssue {
    issue: Issue,
    events: Vec<LabelEvent>,
    comments: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    issues: BTreeMap<IssueNumber, StoredIssue>,
    labels: Vec<Label>,
    last_number: IssueNumber,
    last_tick: Option<DateTime<Utc>>,
    offline: bool,
}

impl MemoryState {
    /// Strictly increasing timestamp, so creation order is always observable.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_tick {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }

    fn ensure_online(&self) -> Result<(), TrackerError> {
        if self.offline {
            Err(TrackerError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn ensure_label(&mut self, name: &str) {
        if !self.labels.iter().any(|l| l.name == name) {
            self.labels.push(Label::new(name, DEFAULT_LABEL_COLOR));
        }
    }

    fn stored_mut(&mut self, number: IssueNumber) -> Result<&mut StoredIssue, TrackerError> {
        self.issues
            .get_mut(&number)
            .ok_or_else(|| TrackerError::NotFound(format!("issue {number}")))
    }

    fn insert(&mut self, title: String, body: Option<String>, labels: Vec<String>, state: IssueState) -> Issue {
        let mut unique: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !unique.contains(&label) {
                unique.push(label);
            }
        }
        for label in &unique {
            self.ensure_label(label);
        }

        self.last_number += 1;
        let created_at = self.tick();
        let issue = Issue {
            number: self.last_number,
            title,
            body,
            labels: unique.clone(),
            state,
            created_at,
        };
        let events = unique
            .into_iter()
            .map(|label| LabelEvent {
                kind: LabelEventKind::Labeled,
                label,
                created_at,
            })
            .collect();
        self.issues.insert(
            issue.number,
            StoredIssue {
                issue: issue.clone(),
                events,
                comments: Vec::new(),
            },
        );
        issue
    }
}

/// Issue tracker kept entirely in memory. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an issue directly, bypassing any queue conventions. Useful for
    /// modelling hand-edited issues or issues created by other tools.
    pub async fn seed_issue(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        labels: &[&str],
        state: IssueState,
    ) -> IssueNumber {
        let mut guard = self.state.lock().await;
        guard
            .insert(
                title.into(),
                Some(body.into()),
                labels.iter().map(|l| l.to_string()).collect(),
                state,
            )
            .number
    }

    /// Comments posted on an issue, oldest first.
    pub async fn comments(&self, number: IssueNumber) -> Vec<String> {
        let guard = self.state.lock().await;
        guard
            .issues
            .get(&number)
            .map(|s| s.comments.clone())
            .unwrap_or_default()
    }

    /// Simulate an outage: every call fails with [`TrackerError::Unavailable`] until reset.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue, TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        Ok(guard.insert(issue.title, Some(issue.body), issue.labels, IssueState::Open))
    }

    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError> {
        let guard = self.state.lock().await;
        guard.ensure_online()?;
        let mut issues: Vec<Issue> = guard
            .issues
            .values()
            .map(|s| &s.issue)
            .filter(|i| query.matches(i))
            .cloned()
            .collect();
        issues.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        Ok(issues)
    }

    async fn get_issue(&self, number: IssueNumber) -> Result<Issue, TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        Ok(guard.stored_mut(number)?.issue.clone())
    }

    async fn add_labels(&self, number: IssueNumber, labels: &[String]) -> Result<(), TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        guard.stored_mut(number)?;
        for label in labels {
            guard.ensure_label(label);
        }
        let at = guard.tick();
        let stored = guard.stored_mut(number)?;
        for label in labels {
            if stored.issue.has_label(label) {
                continue;
            }
            stored.issue.labels.push(label.clone());
            stored.events.push(LabelEvent {
                kind: LabelEventKind::Labeled,
                label: label.clone(),
                created_at: at,
            });
        }
        Ok(())
    }

    async fn remove_label(&self, number: IssueNumber, label: &str) -> Result<(), TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        let at = guard.tick();
        let stored = guard.stored_mut(number)?;
        let Some(pos) = stored.issue.labels.iter().position(|l| l == label) else {
            return Err(TrackerError::NotFound(format!(
                "label {label} on issue {number}"
            )));
        };
        stored.issue.labels.remove(pos);
        stored.events.push(LabelEvent {
            kind: LabelEventKind::Unlabeled,
            label: label.to_string(),
            created_at: at,
        });
        Ok(())
    }

    async fn set_state(&self, number: IssueNumber, state: IssueState) -> Result<(), TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        guard.stored_mut(number)?.issue.state = state;
        Ok(())
    }

    async fn create_comment(&self, number: IssueNumber, body: &str) -> Result<(), TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        guard.stored_mut(number)?.comments.push(body.to_string());
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, TrackerError> {
        let guard = self.state.lock().await;
        guard.ensure_online()?;
        Ok(guard.labels.clone())
    }

    async fn create_label(&self, label: &Label) -> Result<(), TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        if guard.labels.iter().any(|l| l.name == label.name) {
            return Err(TrackerError::Api {
                status: 422,
                message: format!("label {} already exists", label.name),
            });
        }
        guard.labels.push(label.clone());
        Ok(())
    }

    async fn list_label_events(
        &self,
        number: IssueNumber,
    ) -> Result<Vec<LabelEvent>, TrackerError> {
        let mut guard = self.state.lock().await;
        guard.ensure_online()?;
        Ok(guard.stored_mut(number)?.events.clone())
    }
}
