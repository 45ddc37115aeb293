//! OctoQueue server
//!
//! Entry point for the `octoqueue` binary: configuration loading, collaborator
//! wiring and HTTP server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use octoqueue_backend::rate_limiter::RateLimiterManager;
use octoqueue_backend::state::AppState;

mod cli;
mod config_helpers;
mod tracing_setup;

use cli::{Cli, Command, ServeArgs};
use config_helpers::{
    parse_bind_address, processor_from_config, queue_options_from_config, tracker_from_config,
};
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    eprintln!("[STARTUP] OctoQueue starting...");

    match dotenvy::dotenv() {
        Ok(path) => eprintln!("[STARTUP] Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(anyhow::anyhow!("failed to read .env file: {e}")),
    }

    // Resolve config path: CLI > environment variable
    let config_path = args
        .config_path
        .clone()
        .or_else(|| std::env::var("OCTOQUEUE_CONFIG_PATH").ok());

    eprintln!("[STARTUP] Loading config from: {:?}", config_path);
    let mut config = load_config(config_path.as_deref())?;
    args.apply_to(&mut config);
    octoqueue_config::validate_config(&config)
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    eprintln!("[STARTUP] Config loaded successfully");

    install_tracing_from_config(&config.logging)?;
    tracing::info!(config = ?config, "configuration resolved");

    let tracker = tracker_from_config(&config)?;
    match config.github.repo.as_deref() {
        Some(repo) => tracing::info!(%repo, "queue repository configured"),
        None => tracing::error!("no repository configured; job submissions will fail"),
    }

    let processor = processor_from_config(&config)?;
    match &processor {
        Some(p) => tracing::info!(host = p.host(), "processor configured"),
        None => tracing::warn!("no processor host configured; job submissions will be refused"),
    }

    if config.auth.api_key.is_none() {
        tracing::warn!("no API key configured; admin endpoints will refuse every request");
    }

    let state = Arc::new(AppState::new(
        tracker,
        queue_options_from_config(&config),
        processor,
        config.auth.api_key.clone(),
    ));

    let limiter = RateLimiterManager::from_settings(&config.rate_limit);
    tracing::info!(
        enabled = limiter.is_active(),
        requests = limiter.requests,
        window_secs = config.rate_limit.window_secs,
        trust_forwarded_for = limiter.trust_forwarded_for,
        "rate limiting configured"
    );
    tracing::info!(allowed_origins = ?config.cors.allowed_origins, "CORS configured");

    let app = octoqueue_backend::build_app(state, limiter, &config.cors);

    let addr = parse_bind_address(&config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    eprintln!("[STARTUP] ✓ Server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Load configuration from file or defaults.
fn load_config(path: Option<&str>) -> anyhow::Result<octoqueue_config::Config> {
    octoqueue_config::load_config(path).map_err(|e| {
        eprintln!("failed to load configuration: {e}");
        anyhow::anyhow!(e.to_string())
    })
}
