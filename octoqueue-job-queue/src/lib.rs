//! Label-driven job queue backed by an issue tracker.
//!
//! Each job is an issue whose body holds a JSON payload. Its status is derived
//! from one of four status labels plus the issue's open/closed state, so the
//! tracker's UI doubles as a view of the queue.
//!
//! # Architecture
//!
//! - [`JobQueue`] - Enqueue, claim and finish jobs
//! - [`JobStatus`] / [`Transition`] - The lifecycle and its legal moves
//! - [`codec`] - Payload encoding inside issue bodies
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use octoqueue_job_queue::{JobQueue, NewJob, QueueOptions};
//! use octoqueue_tracker::MemoryTracker;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), octoqueue_job_queue::JobQueueError> {
//!     let queue = JobQueue::connect(Arc::new(MemoryTracker::new()), QueueOptions::default()).await?;
//!
//!     let payload = json!({ "url": "https://example.com" });
//!     let id = queue
//!         .enqueue(NewJob::new(payload.as_object().cloned().unwrap_or_default()))
//!         .await?;
//!
//!     if let Some(job) = queue.dequeue().await? {
//!         assert_eq!(job.id, id);
//!         queue.complete(job.id, None).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
mod error;
mod queue;
mod status;
mod types;

pub use error::JobQueueError;
pub use queue::JobQueue;
pub use status::{JobStatus, StatusLabel, Transition};
pub use types::{ClaimedJob, JobEntry, JobId, NewJob, Payload, QueueOptions};
