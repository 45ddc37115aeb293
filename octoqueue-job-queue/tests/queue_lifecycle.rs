use std::sync::Arc;
use std::time::Duration;

use octoqueue_job_queue::{JobQueue, JobQueueError, JobStatus, NewJob, Payload, QueueOptions};
use octoqueue_tracker::{IssueState, IssueTracker, MemoryTracker, TrackerError};
use serde_json::{json, Value};

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

async fn queue_with(tracker: &MemoryTracker) -> JobQueue {
    JobQueue::connect(Arc::new(tracker.clone()), QueueOptions::default())
        .await
        .expect("connect queue")
}

#[tokio::test]
async fn full_lifecycle_enqueue_claim_complete() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;

    let data = payload(json!({ "title": "Test Issue 😃", "body": "äöü 世界 🌎" }));
    let id = queue.enqueue(NewJob::new(data.clone())).await.expect("enqueue");
    assert_eq!(queue.get_job_status(id).await.unwrap(), Some(JobStatus::Pending));

    let claimed = queue.dequeue().await.expect("dequeue").expect("job available");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.payload, Some(data));
    assert_eq!(queue.get_job_status(id).await.unwrap(), Some(JobStatus::Processing));

    queue.complete(id, None).await.expect("complete");
    assert_eq!(queue.get_job_status(id).await.unwrap(), Some(JobStatus::Completed));

    let issue = tracker.get_issue(id).await.unwrap();
    assert_eq!(issue.state, IssueState::Closed);
    assert_eq!(issue.labels, vec!["completed".to_string()]);
    assert_eq!(
        tracker.comments(id).await,
        vec!["This has been completed, thank you".to_string()]
    );
}

#[tokio::test]
async fn count_tracks_open_jobs_through_the_lifecycle() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    assert_eq!(queue.count_open().await.unwrap(), 0);

    let first = queue.enqueue(NewJob::new(payload(json!({ "n": 1 })))).await.unwrap();
    queue.enqueue(NewJob::new(payload(json!({ "n": 2 })))).await.unwrap();
    assert_eq!(queue.count_open().await.unwrap(), 2);

    // Claiming keeps the job open.
    queue.dequeue().await.unwrap();
    assert_eq!(queue.count_open().await.unwrap(), 2);

    queue.fail(first, Some("worker crashed")).await.unwrap();
    assert_eq!(queue.count_open().await.unwrap(), 1);
    assert_eq!(tracker.comments(first).await, vec!["worker crashed".to_string()]);
}

#[tokio::test]
async fn count_ignores_issues_outside_the_queue() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    tracker
        .seed_issue("bug report", "not a job", &["bug"], IssueState::Open)
        .await;
    queue.enqueue(NewJob::new(Payload::new())).await.unwrap();
    assert_eq!(queue.count_open().await.unwrap(), 1);
}

// Oldest first is deliberate. GitHub lists newest first unless asked otherwise.
#[tokio::test]
async fn dequeue_claims_oldest_pending_job_first() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;

    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(queue.enqueue(NewJob::new(payload(json!({ "n": n })))).await.unwrap());
    }

    for expected in ids {
        let job = queue.dequeue().await.unwrap().expect("job available");
        assert_eq!(job.id, expected);
    }
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn dequeue_on_empty_queue_returns_none() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn dequeue_with_unreadable_body_still_claims() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = tracker
        .seed_issue("hand written", "no data here", &["pending"], IssueState::Open)
        .await;

    let job = queue.dequeue().await.unwrap().expect("job available");
    assert_eq!(job.id, id);
    assert_eq!(job.payload, None);
    assert_eq!(queue.get_job_status(id).await.unwrap(), Some(JobStatus::Processing));
}

#[tokio::test]
async fn requeue_of_finished_job_reopens_it_with_original_payload() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let data = payload(json!({ "url": "https://example.com" }));
    let id = queue.enqueue(NewJob::new(data.clone())).await.unwrap();

    queue.dequeue().await.unwrap();
    queue.complete(id, None).await.unwrap();
    queue.requeue(id, None).await.unwrap();

    let issue = tracker.get_issue(id).await.unwrap();
    assert_eq!(issue.state, IssueState::Open);
    assert_eq!(issue.labels, vec!["pending".to_string()]);

    let again = queue.dequeue().await.unwrap().expect("requeued job available");
    assert_eq!(again.id, id);
    assert_eq!(again.payload, Some(data));
    assert_eq!(
        tracker.comments(id).await.last().map(String::as_str),
        Some("Job has been requeued for processing")
    );
}

#[tokio::test]
async fn requeue_from_processing_and_failed() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = queue.enqueue(NewJob::new(Payload::new())).await.unwrap();

    queue.dequeue().await.unwrap();
    queue.requeue(id, Some("lease expired")).await.unwrap();
    assert_eq!(queue.get_job_status(id).await.unwrap(), Some(JobStatus::Pending));

    queue.dequeue().await.unwrap();
    queue.fail(id, None).await.unwrap();
    assert_eq!(tracker.comments(id).await.last().map(String::as_str), Some("This job has failed"));
    queue.requeue(id, None).await.unwrap();
    assert_eq!(queue.get_job_status(id).await.unwrap(), Some(JobStatus::Pending));
}

#[tokio::test]
async fn illegal_transitions_leave_the_job_untouched() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = queue.enqueue(NewJob::new(Payload::new())).await.unwrap();

    // Pending jobs cannot be finished or requeued.
    for result in [
        queue.complete(id, None).await,
        queue.fail(id, None).await,
        queue.requeue(id, None).await,
    ] {
        assert!(matches!(
            result,
            Err(JobQueueError::InvalidTransition { from: JobStatus::Pending, .. })
        ));
    }
    let issue = tracker.get_issue(id).await.unwrap();
    assert_eq!(issue.labels, vec!["pending".to_string()]);
    assert_eq!(issue.state, IssueState::Open);
    assert!(tracker.comments(id).await.is_empty());

    queue.dequeue().await.unwrap();
    queue.complete(id, None).await.unwrap();
    let err = queue.fail(id, None).await.unwrap_err();
    assert!(matches!(
        err,
        JobQueueError::InvalidTransition { from: JobStatus::Completed, .. }
    ));
}

#[tokio::test]
async fn extra_labels_survive_transitions_and_status_labels_are_dropped() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = queue
        .enqueue(
            NewJob::new(Payload::new())
                .with_title("toot")
                .with_labels(["mastodon", "completed", "mastodon"]),
        )
        .await
        .unwrap();

    let issue = tracker.get_issue(id).await.unwrap();
    assert_eq!(issue.title, "toot");
    assert_eq!(issue.labels, vec!["pending".to_string(), "mastodon".to_string()]);

    queue.dequeue().await.unwrap();
    queue.complete(id, None).await.unwrap();
    let issue = tracker.get_issue(id).await.unwrap();
    assert!(issue.has_label("mastodon"));
    assert!(issue.has_label("completed"));
}

#[tokio::test]
async fn default_title_carries_a_timestamp() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = queue.enqueue(NewJob::new(Payload::new())).await.unwrap();
    let title = tracker.get_issue(id).await.unwrap().title;
    assert!(title.starts_with("Job "), "unexpected title {title}");
    assert!(title.contains('T'));
}

#[tokio::test]
async fn get_jobs_filters_by_custom_tag() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let tagged = queue
        .enqueue(NewJob::new(payload(json!({ "status": "hello" }))).with_labels(["mastodon"]))
        .await
        .unwrap();
    queue.enqueue(NewJob::new(payload(json!({ "other": true })))).await.unwrap();

    let jobs = queue.get_jobs(&["mastodon"], IssueState::Open).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, tagged);
    assert_eq!(jobs[0].payload, payload(json!({ "status": "hello" })));
    assert!(jobs[0].label_applied_at.is_some());

    assert!(queue.get_jobs(&["mastodon"], IssueState::Closed).await.unwrap().is_empty());
    assert!(queue.get_jobs(&[], IssueState::Open).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_jobs_matches_any_label_and_reports_latest_application() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let a = queue.enqueue(NewJob::new(payload(json!({ "a": 1 })))).await.unwrap();
    let b = queue.enqueue(NewJob::new(payload(json!({ "b": 1 })))).await.unwrap();

    queue.dequeue().await.unwrap();
    let jobs = queue
        .get_jobs(&["pending", "processing"], IssueState::Open)
        .await
        .unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![a, b]);

    // `a` was relabelled after `b` was created.
    let a_at = jobs[0].label_applied_at.expect("a labelled");
    let b_at = jobs[1].label_applied_at.expect("b labelled");
    assert!(a_at > b_at);
}

#[tokio::test]
async fn get_jobs_skips_unreadable_bodies() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    tracker
        .seed_issue("broken", "```json\n{ nope\n```", &["pending"], IssueState::Open)
        .await;
    let good = queue.enqueue(NewJob::new(payload(json!({ "ok": 1 })))).await.unwrap();

    let jobs = queue.get_jobs(&["pending"], IssueState::Open).await.unwrap();
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![good]);
}

#[tokio::test]
async fn safe_remove_label_tolerates_absent_labels() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = queue.enqueue(NewJob::new(Payload::new())).await.unwrap();
    let issue = tracker.get_issue(id).await.unwrap();

    queue.safe_remove_label(&issue, "processing").await.expect("absent label");
    queue.safe_remove_label(&issue, "pending").await.expect("present label");
    // The snapshot still lists `pending`, but the tracker no longer has it.
    queue.safe_remove_label(&issue, "pending").await.expect("already removed");
    assert!(tracker.get_issue(id).await.unwrap().labels.is_empty());
}

#[tokio::test]
async fn status_of_missing_and_foreign_issues() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    assert_eq!(queue.get_job_status(999).await.unwrap(), None);

    let foreign = tracker
        .seed_issue("question", "hi", &["question"], IssueState::Open)
        .await;
    assert_eq!(queue.get_job_status(foreign).await.unwrap(), Some(JobStatus::Unknown));

    let err = queue.complete(999, None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn connect_provisions_status_and_reserved_labels_once() {
    let tracker = MemoryTracker::new();
    let options = QueueOptions::default().with_reserved_label("mastodon", "800080");
    JobQueue::connect(Arc::new(tracker.clone()), options.clone())
        .await
        .expect("first connect");
    // A second connect sees the labels and creates nothing, so no 422.
    JobQueue::connect(Arc::new(tracker.clone()), options)
        .await
        .expect("second connect");

    let labels = tracker.list_labels().await.unwrap();
    for (name, color) in [
        ("pending", "0dbf66"),
        ("processing", "0052cc"),
        ("completed", "2cbe4e"),
        ("failed", "d93f0b"),
        ("mastodon", "800080"),
    ] {
        let label = labels.iter().find(|l| l.name == name).expect(name);
        assert_eq!(label.color, color);
    }
    assert_eq!(labels.len(), 5);
}

#[tokio::test]
async fn tracker_failures_propagate() {
    let tracker = MemoryTracker::new();
    let queue = queue_with(&tracker).await;
    let id = queue.enqueue(NewJob::new(Payload::new())).await.unwrap();
    tracker.set_offline(true).await;

    assert!(matches!(
        queue.enqueue(NewJob::new(Payload::new())).await,
        Err(JobQueueError::Tracker(TrackerError::Unavailable))
    ));
    assert!(queue.dequeue().await.is_err());
    assert!(queue.count_open().await.is_err());
    assert!(queue.get_job_status(id).await.is_err());
    assert!(queue.get_jobs(&["pending"], IssueState::Open).await.is_err());

    let err = JobQueue::connect(Arc::new(tracker.clone()), QueueOptions::default())
        .await
        .unwrap_err();
    assert!(!err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn read_delay_is_applied_before_listing() {
    let tracker = MemoryTracker::new();
    let queue = JobQueue::connect(
        Arc::new(tracker.clone()),
        QueueOptions::default().with_read_delay(Duration::from_secs(1)),
    )
    .await
    .unwrap();

    let started = tokio::time::Instant::now();
    queue.count_open().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
}
