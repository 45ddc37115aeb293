//! Queue façade over an issue tracker.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use octoqueue_tracker::{
    Issue, IssueQuery, IssueState, IssueTracker, Label, LabelEventKind, NewIssue, StateFilter,
    TrackerError,
};
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::error::JobQueueError;
use crate::status::{JobStatus, StatusLabel, Transition};
use crate::types::{ClaimedJob, JobEntry, JobId, NewJob, QueueOptions};

/// Job queue whose jobs are issues and whose statuses are labels.
///
/// Every operation is a short sequence of tracker calls with no transaction
/// around them. In particular [`dequeue`](Self::dequeue) lists and then
/// relabels, so two consumers polling at the same moment can claim the same
/// job. Run a single consumer, or serialize claims externally, when that
/// matters.
#[derive(Clone)]
pub struct JobQueue {
    tracker: Arc<dyn IssueTracker>,
    read_delay: Duration,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("tracker", &"<dyn IssueTracker>")
            .field("read_delay", &self.read_delay)
            .finish()
    }
}

impl JobQueue {
    /// Build a queue and make sure the label vocabulary exists in the tracker.
    pub async fn connect(
        tracker: Arc<dyn IssueTracker>,
        options: QueueOptions,
    ) -> Result<Self, JobQueueError> {
        let queue = Self {
            tracker,
            read_delay: options.read_delay,
        };
        queue
            .ensure_labels(&options.reserved_labels)
            .await
            .inspect_err(|e| error!(error = %e, "failed to provision queue labels"))?;
        Ok(queue)
    }

    /// Create every status label and reserved label that is not there yet.
    async fn ensure_labels(&self, reserved: &[Label]) -> Result<(), JobQueueError> {
        let existing = self.tracker.list_labels().await?;
        let required = StatusLabel::ALL
            .into_iter()
            .map(StatusLabel::to_label)
            .chain(reserved.iter().cloned());

        for label in required {
            if existing.iter().any(|l| l.name == label.name) {
                continue;
            }
            info!(label = %label.name, color = %label.color, "creating queue label");
            self.tracker.create_label(&label).await?;
        }
        Ok(())
    }

    /// Add a job to the queue and return its id.
    pub async fn enqueue(&self, job: NewJob) -> Result<JobId, JobQueueError> {
        let title = job.title.unwrap_or_else(default_title);

        let mut labels = vec![StatusLabel::Pending.as_str().to_string()];
        for label in job.extra_labels {
            if StatusLabel::is_status_label(&label) {
                warn!(%label, "ignoring status label passed as extra label");
                continue;
            }
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        let body = codec::encode(&job.payload)?;
        let issue = self
            .tracker
            .create_issue(NewIssue {
                title,
                body,
                labels,
            })
            .await
            .inspect_err(|e| error!(error = %e, "failed to enqueue job"))?;

        info!(job_id = issue.number, "job enqueued");
        Ok(issue.number)
    }

    /// Number of jobs that are pending or processing.
    pub async fn count_open(&self) -> Result<usize, JobQueueError> {
        self.wait_for_reads().await;
        let issues = self
            .tracker
            .list_issues(&IssueQuery::new(StateFilter::Open))
            .await
            .inspect_err(|e| error!(error = %e, "failed to count open jobs"))?;
        Ok(issues
            .iter()
            .filter(|issue| JobStatus::of(issue).is_open())
            .count())
    }

    /// Claim the oldest pending job.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    pub async fn dequeue(&self) -> Result<Option<ClaimedJob>, JobQueueError> {
        self.wait_for_reads().await;
        let candidates = self
            .tracker
            .list_issues(
                &IssueQuery::new(StateFilter::Open).with_label(StatusLabel::Pending.as_str()),
            )
            .await
            .inspect_err(|e| error!(error = %e, "failed to dequeue job"))?;

        // Oldest first: the listing is sorted by creation time, ascending.
        let Some(issue) = candidates.into_iter().next() else {
            debug!("no pending job available");
            return Ok(None);
        };

        let payload = codec::decode(issue.body_text());
        if payload.is_none() {
            warn!(job_id = issue.number, "claimed job has no readable payload");
        }

        self.apply_labels(&issue, Transition::Claim)
            .await
            .inspect_err(|e| error!(job_id = issue.number, error = %e, "failed to dequeue job"))?;

        info!(job_id = issue.number, "job claimed");
        Ok(Some(ClaimedJob {
            id: issue.number,
            payload,
        }))
    }

    /// Mark a processing job as completed and close it.
    pub async fn complete(&self, id: JobId, comment: Option<&str>) -> Result<(), JobQueueError> {
        self.transition(id, Transition::Complete, comment).await
    }

    /// Mark a processing job as failed and close it.
    pub async fn fail(&self, id: JobId, comment: Option<&str>) -> Result<(), JobQueueError> {
        self.transition(id, Transition::Fail, comment).await
    }

    /// Put a processing or finished job back to pending, reopening it if needed.
    pub async fn requeue(&self, id: JobId, comment: Option<&str>) -> Result<(), JobQueueError> {
        self.transition(id, Transition::Requeue, comment).await
    }

    /// Jobs carrying any of `labels` in `state`, oldest first.
    ///
    /// Each entry carries the time one of the labels was last applied. Jobs
    /// whose body holds no readable payload are skipped.
    pub async fn get_jobs(
        &self,
        labels: &[&str],
        state: IssueState,
    ) -> Result<Vec<JobEntry>, JobQueueError> {
        self.collect_jobs(labels, state)
            .await
            .inspect_err(|e| error!(?labels, error = %e, "failed to get jobs"))
    }

    async fn collect_jobs(
        &self,
        labels: &[&str],
        state: IssueState,
    ) -> Result<Vec<JobEntry>, JobQueueError> {
        // The tracker ANDs label filters, so ask once per label and merge.
        let mut matching: BTreeMap<JobId, Issue> = BTreeMap::new();
        for label in labels {
            let query = IssueQuery::new(state.into()).with_label(*label);
            for issue in self.tracker.list_issues(&query).await? {
                matching.entry(issue.number).or_insert(issue);
            }
        }

        let mut issues: Vec<Issue> = matching.into_values().collect();
        issues.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.number.cmp(&b.number))
        });

        let mut jobs = Vec::with_capacity(issues.len());
        for issue in issues {
            let Some(payload) = codec::decode(issue.body_text()) else {
                debug!(job_id = issue.number, "skipping job without readable payload");
                continue;
            };

            let label_applied_at = self
                .tracker
                .list_label_events(issue.number)
                .await?
                .into_iter()
                .filter(|e| e.kind == LabelEventKind::Labeled && labels.contains(&e.label.as_str()))
                .map(|e| e.created_at)
                .max();

            jobs.push(JobEntry {
                id: issue.number,
                label_applied_at,
                payload,
            });
        }
        Ok(jobs)
    }

    /// Current status of a job, or `None` if the tracker has no such issue.
    pub async fn get_job_status(&self, id: JobId) -> Result<Option<JobStatus>, JobQueueError> {
        match self.tracker.get_issue(id).await {
            Ok(issue) => Ok(Some(JobStatus::of(&issue))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => {
                error!(job_id = id, error = %e, "failed to get job status");
                Err(e.into())
            }
        }
    }

    /// Remove a label, treating "not there" as success.
    pub async fn safe_remove_label(&self, issue: &Issue, label: &str) -> Result<(), JobQueueError> {
        if !issue.has_label(label) {
            return Ok(());
        }
        match self.tracker.remove_label(issue.number, label).await {
            Ok(()) => Ok(()),
            Err(TrackerError::NotFound(what)) => {
                debug!(job_id = issue.number, %label, %what, "label already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn transition(
        &self,
        id: JobId,
        transition: Transition,
        comment: Option<&str>,
    ) -> Result<(), JobQueueError> {
        self.run_transition(id, transition, comment)
            .await
            .inspect_err(|e| error!(job_id = id, %transition, error = %e, "job transition failed"))
    }

    async fn run_transition(
        &self,
        id: JobId,
        transition: Transition,
        comment: Option<&str>,
    ) -> Result<(), JobQueueError> {
        let issue = self.tracker.get_issue(id).await?;
        let from = JobStatus::of(&issue);
        if !transition.allowed_from(from) {
            return Err(JobQueueError::InvalidTransition {
                id,
                from,
                transition,
            });
        }

        self.apply_labels(&issue, transition).await?;

        if let Some(comment) = comment.or(transition.default_comment()) {
            self.tracker.create_comment(id, comment).await?;
        }

        let target_state = transition.target_state();
        if issue.state != target_state {
            self.tracker.set_state(id, target_state).await?;
        }

        info!(job_id = id, %from, to = %transition.target(), "job transitioned");
        Ok(())
    }

    /// Swap status labels: drop the old ones first, then add the new one.
    async fn apply_labels(&self, issue: &Issue, transition: Transition) -> Result<(), JobQueueError> {
        for label in transition.removes() {
            self.safe_remove_label(issue, label.as_str()).await?;
        }
        self.tracker
            .add_labels(issue.number, &[transition.adds().as_str().to_string()])
            .await?;
        Ok(())
    }

    async fn wait_for_reads(&self) {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
    }
}

fn default_title() -> String {
    format!("Job {}", chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"))
}
