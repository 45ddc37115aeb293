//! Issue-tracker collaborator for the OctoQueue job queue.
//!
//! The queue keeps all of its state in an issue tracker: every job is an
//! issue, its lifecycle stage is a label and its open/closed state. This crate
//! defines the narrow surface the queue needs from the tracker and ships two
//! implementations of it.
//!
//! # Architecture
//!
//! - [`IssueTracker`] - The collaborator trait the queue is written against
//! - [`GitHubTracker`] - GitHub REST API implementation
//! - [`MemoryTracker`] - In-process implementation for tests and local runs
//!
//! # Example
//!
//! ```rust,no_run
//! use octoqueue_tracker::{GitHubTracker, IssueQuery, IssueTracker, StateFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), octoqueue_tracker::TrackerError> {
//!     let tracker = GitHubTracker::new("owner/jobs", std::env::var("GH_TOKEN").ok())?;
//!     let pending = tracker
//!         .list_issues(&IssueQuery::new(StateFilter::Open).with_label("pending"))
//!         .await?;
//!     println!("{} pending jobs", pending.len());
//!     Ok(())
//! }
//! ```

mod error;
mod github;
mod memory;
mod tracker;
mod types;

pub use error::TrackerError;
pub use github::GitHubTracker;
pub use memory::MemoryTracker;
pub use tracker::IssueTracker;
pub use types::{
    Issue, IssueNumber, IssueQuery, IssueState, Label, LabelEvent, LabelEventKind, NewIssue,
    StateFilter,
};

// Re-export async_trait for convenience when implementing IssueTracker
pub use async_trait::async_trait;
