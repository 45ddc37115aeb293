use std::sync::Arc;

use octoqueue_job_queue::{JobQueue, QueueOptions};
use octoqueue_tracker::IssueTracker;
use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info};

use crate::error::ApiError;
use crate::processor::ProcessorClient;
use crate::schema::JobSchema;

/// Shared application state passed to every route handler.
pub struct AppState {
    tracker: Option<Arc<dyn IssueTracker>>,
    queue_options: QueueOptions,
    // Built on first use; a failed label reconciliation leaves it empty so the
    // next request tries again.
    queue: OnceCell<JobQueue>,
    schema: RwLock<Option<Arc<JobSchema>>>,
    pub processor: Option<ProcessorClient>,
    api_key: Option<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tracker", &self.tracker.as_ref().map(|_| "<dyn IssueTracker>"))
            .field("queue_options", &self.queue_options)
            .field("queue_ready", &self.queue.initialized())
            .field("processor", &self.processor)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AppState {
    /// Build a state container from its constituent parts.
    ///
    /// `tracker` is `None` when no repository is configured; job submissions
    /// then fail with a configuration error while the rest of the API works.
    pub fn new(
        tracker: Option<Arc<dyn IssueTracker>>,
        queue_options: QueueOptions,
        processor: Option<ProcessorClient>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            tracker,
            queue_options,
            queue: OnceCell::new(),
            schema: RwLock::new(None),
            processor,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// The queue façade, constructing it (and provisioning labels) on first use.
    pub async fn queue(&self) -> Result<&JobQueue, ApiError> {
        let Some(tracker) = &self.tracker else {
            error!("job submitted but no repository is configured");
            return Err(ApiError::not_configured(
                "GitHub repository is not configured (github.repo)",
            ));
        };
        self.queue
            .get_or_try_init(|| async {
                info!("initializing job queue");
                JobQueue::connect(Arc::clone(tracker), self.queue_options.clone()).await
            })
            .await
            .map_err(|e| {
                error!(error = %e, "failed to initialize job queue");
                ApiError::not_configured(format!("Queue initialization error: {e}"))
            })
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// The schema submissions are validated against, if one is installed.
    pub async fn schema(&self) -> Option<Arc<JobSchema>> {
        self.schema.read().await.clone()
    }

    /// Replace the active schema. Requests already holding the old one finish with it.
    pub async fn install_schema(&self, schema: JobSchema) {
        *self.schema.write().await = Some(Arc::new(schema));
    }
}
