use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use octoqueue_config::Config;
use octoqueue_job_queue::QueueOptions;
use octoqueue_tracker::{GitHubTracker, IssueTracker};

use octoqueue_backend::processor::ProcessorClient;

/// Build the issue tracker for the configured repository, if there is one.
pub fn tracker_from_config(cfg: &Config) -> anyhow::Result<Option<Arc<dyn IssueTracker>>> {
    let Some(repo) = cfg.github.repo.as_deref() else {
        return Ok(None);
    };
    if cfg.github.token.is_none() {
        tracing::warn!(%repo, "no GitHub token configured; writes to the repository will fail");
    }
    let tracker: Arc<dyn IssueTracker> = Arc::new(GitHubTracker::with_api_url(
        repo,
        cfg.github.token.clone(),
        &cfg.github.api_url,
    )?);
    Ok(Some(tracker))
}

pub fn queue_options_from_config(cfg: &Config) -> QueueOptions {
    cfg.queue.reserved_labels.iter().fold(
        QueueOptions::default().with_read_delay(Duration::from_millis(cfg.queue.read_delay_ms)),
        |options, label| options.with_reserved_label(label.name.clone(), label.color.clone()),
    )
}

pub fn processor_from_config(cfg: &Config) -> anyhow::Result<Option<ProcessorClient>> {
    let Some(host) = cfg.processor.host.as_deref() else {
        return Ok(None);
    };
    let client = ProcessorClient::new(
        host,
        Duration::from_secs(cfg.processor.probe_timeout_secs),
        Duration::from_secs(cfg.processor.notify_timeout_secs),
    )?;
    Ok(Some(client))
}

/// Parse host:port into a SocketAddr, with fallback to 0.0.0.0.
pub fn parse_bind_address(host: &str, port: u16) -> SocketAddr {
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .or_else(|_| host.parse::<SocketAddr>())
        .or_else(|_| host.parse::<Ipv6Addr>().map(|ip| SocketAddr::new(IpAddr::V6(ip), port)))
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)))
}
