use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Pre-compiled regex for hostname validation (compiled once at first use)
static HOSTNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9\.]*[a-zA-Z0-9]$").unwrap());

/// `owner/name` repository slug as accepted by the GitHub API.
static REPO_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][-A-Za-z0-9_.]*/[-A-Za-z0-9_.]+$").unwrap());

static LABEL_COLOR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{6}$").unwrap());

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub cors: Option<CorsSection>,
    #[serde(default)]
    pub github: Option<GithubSection>,
    #[serde(default)]
    pub auth: Option<AuthSection>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSection>,
    #[serde(default)]
    pub processor: Option<ProcessorSection>,
    #[serde(default)]
    pub queue: Option<QueueSection>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CorsSection {
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(default)]
    pub allow_all_origins: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GithubSection {
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitSection {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub requests: Option<u32>,
    #[serde(default)]
    pub window_secs: Option<u64>,
    #[serde(default)]
    pub bypass_key: Option<String>,
    #[serde(default)]
    pub exempt_paths: Option<Vec<String>>,
    #[serde(default)]
    pub trust_forwarded_for: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessorSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
    #[serde(default)]
    pub notify_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueSection {
    #[serde(default)]
    pub read_delay_ms: Option<u64>,
    #[serde(default)]
    pub reserved_labels: Option<Vec<ReservedLabel>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try to parse config by attempting each enabled format
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete application configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub github: GithubConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub processor: ProcessorConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_all_origins: bool,
}

/// Target repository of the queue. `repo` is `owner/name`.
#[derive(Clone, PartialEq, Serialize)]
pub struct GithubConfig {
    pub repo: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub api_url: String,
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Fixed-window request quota per client address. `requests == 0` disables limiting.
///
/// Clients are keyed by peer address. `trust_forwarded_for` switches to the
/// first `X-Forwarded-For` entry and is only safe behind a proxy that sets it.
#[derive(Clone, PartialEq, Serialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: u32,
    pub window_secs: u64,
    #[serde(skip_serializing)]
    pub bypass_key: Option<String>,
    pub exempt_paths: Vec<String>,
    pub trust_forwarded_for: bool,
}

impl std::fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("enabled", &self.enabled)
            .field("requests", &self.requests)
            .field("window_secs", &self.window_secs)
            .field("bypass_key", &self.bypass_key.as_ref().map(|_| "<redacted>"))
            .field("exempt_paths", &self.exempt_paths)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

/// Downstream processor that is probed before and pinged after each submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorConfig {
    pub host: Option<String>,
    pub probe_timeout_secs: u64,
    pub notify_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueConfig {
    pub read_delay_ms: u64,
    pub reserved_labels: Vec<ReservedLabel>,
}

/// Extra label provisioned alongside the status vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedLabel {
    pub name: String,
    pub color: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            cors: CorsConfig {
                allowed_origins: vec!["http://127.0.0.1:5173".to_string()],
                allow_all_origins: false,
            },
            github: GithubConfig {
                repo: None,
                token: None,
                api_url: "https://api.github.com".to_string(),
            },
            auth: AuthConfig { api_key: None },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests: 5,
                window_secs: 60,
                bypass_key: None,
                exempt_paths: vec!["/health".to_string(), "/admin/schema".to_string()],
                trust_forwarded_for: false,
            },
            processor: ProcessorConfig {
                host: None,
                probe_timeout_secs: 10,
                notify_timeout_secs: 60,
            },
            queue: QueueConfig {
                read_delay_ms: 0,
                reserved_labels: Vec::new(),
            },
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    let bytes = s.as_bytes();
    match bytes {
        b"1" | b"true" | b"TRUE" | b"True" | b"yes" | b"YES" | b"Yes" | b"y" | b"Y" => Ok(true),
        b"0" | b"false" | b"FALSE" | b"False" | b"no" | b"NO" | b"No" | b"n" | b"N" => Ok(false),
        _ => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(true),
            "false" | "no" | "n" => Ok(false),
            _ => Err(()),
        },
    }
}

/// Split a list given as `a,b` or `a|b`.
#[inline]
fn split_list(s: &str) -> Vec<String> {
    s.split([',', '|'])
        .filter_map(|p| {
            let trimmed = p.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Parse `name:color,name:color`.
fn parse_reserved_labels(s: &str) -> Result<Vec<ReservedLabel>, ConfigError> {
    split_list(s)
        .into_iter()
        .map(|entry| {
            let (name, color) = entry.split_once(':').ok_or_else(|| {
                ConfigError::Parse(format!("reserved label must be name:color, got {entry}"))
            })?;
            Ok(ReservedLabel {
                name: name.trim().to_string(),
                color: color.trim().trim_start_matches('#').to_string(),
            })
        })
        .collect()
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        apply_raw(&mut cfg, raw);
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw(cfg: &mut Config, raw: RawConfigFile) {
    if let Some(server) = raw.server {
        apply_opt!(cfg.server.host, server.host);
        apply_opt!(cfg.server.port, server.port);
    }
    if let Some(logging) = raw.logging {
        apply_opt!(cfg.logging.level, logging.level);
        apply_opt!(cfg.logging.json, logging.json);
    }
    if let Some(cors) = raw.cors {
        apply_opt!(cfg.cors.allowed_origins, cors.allowed_origins);
        apply_opt!(cfg.cors.allow_all_origins, cors.allow_all_origins);
    }
    if let Some(github) = raw.github {
        apply_opt!(cfg.github.repo, github.repo, wrap);
        apply_opt!(cfg.github.token, github.token, wrap);
        apply_opt!(cfg.github.api_url, github.api_url);
    }
    if let Some(auth) = raw.auth {
        apply_opt!(cfg.auth.api_key, auth.api_key, wrap);
    }
    if let Some(rl) = raw.rate_limit {
        apply_opt!(cfg.rate_limit.enabled, rl.enabled);
        apply_opt!(cfg.rate_limit.requests, rl.requests);
        apply_opt!(cfg.rate_limit.window_secs, rl.window_secs);
        apply_opt!(cfg.rate_limit.bypass_key, rl.bypass_key, wrap);
        apply_opt!(cfg.rate_limit.exempt_paths, rl.exempt_paths);
        apply_opt!(cfg.rate_limit.trust_forwarded_for, rl.trust_forwarded_for);
    }
    if let Some(processor) = raw.processor {
        apply_opt!(cfg.processor.host, processor.host, wrap);
        apply_opt!(cfg.processor.probe_timeout_secs, processor.probe_timeout_secs);
        apply_opt!(cfg.processor.notify_timeout_secs, processor.notify_timeout_secs);
    }
    if let Some(queue) = raw.queue {
        apply_opt!(cfg.queue.read_delay_ms, queue.read_delay_ms);
        apply_opt!(cfg.queue.reserved_labels, queue.reserved_labels);
    }
}

#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Apply all environment variable overrides to config
fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Server. PORT is set by most container platforms; the prefixed var wins.
    if let Some(v) = env_str("OCTOQUEUE_SERVER_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = env_parse::<u16>("PORT")? {
        cfg.server.port = v;
    }
    if let Some(v) = env_parse::<u16>("OCTOQUEUE_SERVER_PORT")? {
        cfg.server.port = v;
    }

    // Logging
    if let Some(v) = env_str("OCTOQUEUE_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("OCTOQUEUE_LOG_JSON")? {
        cfg.logging.json = v;
    }

    // CORS
    if let Some(v) = env_str("OCTOQUEUE_CORS_ALLOWED_ORIGINS") {
        cfg.cors.allowed_origins = split_list(&v);
    }
    if let Some(v) = env_bool("OCTOQUEUE_CORS_ALLOW_ALL_ORIGINS")? {
        cfg.cors.allow_all_origins = v;
    }

    // GitHub
    if let Some(v) = env_str("OCTOQUEUE_GITHUB_REPO") {
        cfg.github.repo = Some(v);
    }
    if let Some(v) = env_str("GH_TOKEN") {
        cfg.github.token = Some(v);
    }
    if let Some(v) = env_str("OCTOQUEUE_GITHUB_TOKEN") {
        cfg.github.token = Some(v);
    }
    if let Some(v) = env_str("OCTOQUEUE_GITHUB_API_URL") {
        cfg.github.api_url = v;
    }

    // Auth
    if let Some(v) = env_str("OCTOQUEUE_API_KEY") {
        cfg.auth.api_key = Some(v);
    }

    // Rate limiting
    if let Some(v) = env_bool("OCTOQUEUE_RATE_LIMIT_ENABLED")? {
        cfg.rate_limit.enabled = v;
    }
    if let Some(v) = env_parse::<u32>("OCTOQUEUE_RATE_LIMIT_REQUESTS")? {
        cfg.rate_limit.requests = v;
    }
    if let Some(v) = env_parse::<u64>("OCTOQUEUE_RATE_LIMIT_WINDOW_SECS")? {
        cfg.rate_limit.window_secs = v;
    }
    if let Some(v) = env_str("OCTOQUEUE_RATE_LIMIT_BYPASS_KEY") {
        cfg.rate_limit.bypass_key = Some(v);
    }
    if let Some(v) = env_str("OCTOQUEUE_RATE_LIMIT_EXEMPT_PATHS") {
        cfg.rate_limit.exempt_paths = split_list(&v);
    }
    if let Some(v) = env_bool("OCTOQUEUE_RATE_LIMIT_TRUST_FORWARDED_FOR")? {
        cfg.rate_limit.trust_forwarded_for = v;
    }

    // Processor
    if let Some(v) = env_str("OCTOQUEUE_PROCESSOR_HOST") {
        cfg.processor.host = Some(v);
    }
    if let Some(v) = env_parse::<u64>("OCTOQUEUE_PROCESSOR_PROBE_TIMEOUT_SECS")? {
        cfg.processor.probe_timeout_secs = v;
    }
    if let Some(v) = env_parse::<u64>("OCTOQUEUE_PROCESSOR_NOTIFY_TIMEOUT_SECS")? {
        cfg.processor.notify_timeout_secs = v;
    }

    // Queue
    if let Some(v) = env_parse::<u64>("OCTOQUEUE_QUEUE_READ_DELAY_MS")? {
        cfg.queue.read_delay_ms = v;
    }
    if let Some(v) = env_str("OCTOQUEUE_QUEUE_RESERVED_LABELS") {
        cfg.queue.reserved_labels = parse_reserved_labels(&v)?;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be > 0".into()));
    }
    let host_ok = cfg.server.host.parse::<std::net::IpAddr>().is_ok()
        || HOSTNAME_REGEX.is_match(&cfg.server.host);
    if !host_ok {
        return Err(ConfigError::Validation(format!(
            "invalid server.host: {}",
            cfg.server.host
        )));
    }

    if let Some(repo) = &cfg.github.repo {
        if !REPO_REGEX.is_match(repo) {
            return Err(ConfigError::Validation(format!(
                "github.repo must look like owner/name: {}",
                repo
            )));
        }
    }
    if url::Url::parse(&cfg.github.api_url).is_err() {
        return Err(ConfigError::Validation(format!(
            "invalid github.api_url: {}",
            cfg.github.api_url
        )));
    }

    if let Some(host) = &cfg.processor.host {
        validate_http_url("processor.host", host)?;
    }

    if cfg.rate_limit.enabled && cfg.rate_limit.requests > 0 && cfg.rate_limit.window_secs == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.window_secs must be > 0 when limiting is enabled".into(),
        ));
    }

    for label in &cfg.queue.reserved_labels {
        if label.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "queue.reserved_labels entries need a name".into(),
            ));
        }
        if !LABEL_COLOR_REGEX.is_match(&label.color) {
            return Err(ConfigError::Validation(format!(
                "label color for {} must be six hex digits: {}",
                label.name, label.color
            )));
        }
    }

    for origin in &cfg.cors.allowed_origins {
        if origin == "*" {
            continue;
        }
        validate_http_url("CORS origin", origin)?;
    }
    Ok(())
}

fn validate_http_url(what: &str, value: &str) -> Result<(), ConfigError> {
    match url::Url::parse(value) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        Ok(_) => Err(ConfigError::Validation(format!(
            "{} must be http or https: {}",
            what, value
        ))),
        Err(_) => Err(ConfigError::Validation(format!(
            "invalid {}: {}",
            what, value
        ))),
    }
}
