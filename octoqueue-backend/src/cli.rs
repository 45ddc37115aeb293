use clap::{Parser, Subcommand};

use octoqueue_config::Config;

#[derive(Debug, Parser)]
#[command(name = "octoqueue", version, about = "Job queue backed by GitHub issues")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the OctoQueue API server
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct ServeArgs {
    /// Path to configuration file (overrides OCTOQUEUE_CONFIG_PATH)
    #[arg(short = 'c', long)]
    pub config_path: Option<String>,
    /// Host to bind the server to
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind the server to
    #[arg(long)]
    pub port: Option<u16>,
    /// GitHub repository in the format owner/name
    #[arg(long)]
    pub repo: Option<String>,
    /// API key for the admin endpoints
    #[arg(long)]
    pub api_key: Option<String>,
    /// Allowed CORS origin; repeat or separate with '|' for several
    #[arg(long)]
    pub allowed_origin: Vec<String>,
    /// Logging level or filter directive
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ServeArgs {
    /// Apply flags on top of file and environment values.
    pub fn apply_to(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(repo) = &self.repo {
            cfg.github.repo = Some(repo.clone());
        }
        if let Some(key) = &self.api_key {
            cfg.auth.api_key = Some(key.clone());
        }
        if !self.allowed_origin.is_empty() {
            cfg.cors.allowed_origins = self
                .allowed_origin
                .iter()
                .flat_map(|o| o.split('|'))
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level = level.clone();
        }
    }
}
