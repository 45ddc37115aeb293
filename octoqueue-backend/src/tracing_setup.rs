use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing from configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// the filter does not parse or a global subscriber is already installed.
pub fn install_tracing_from_config(cfg: &octoqueue_config::LoggingConfig) -> anyhow::Result<()> {
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.level.clone());
    let env_filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("invalid log filter {filter_str:?}: {e}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(ChronoUtc::rfc_3339());

    // The two formatters produce different subscriber types.
    let result = if cfg.json {
        builder.json().try_init()
    } else {
        builder.with_target(true).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
