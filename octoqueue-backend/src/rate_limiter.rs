use crate::handlers::auth::utils::constant_time_eq;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Request count for one client within its current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-client fixed-window counters and the limiter's configuration.
///
/// A client's window opens with its first request and lasts `window`; once
/// it has elapsed the next request opens a fresh one.
#[derive(Clone)]
pub struct RateLimiterManager {
    windows: Arc<DashMap<String, Window>>,
    pub enabled: bool,
    pub requests: u32,
    pub window: Duration,
    bypass_key: Option<Arc<str>>,
    pub exempt_paths: Arc<Vec<String>>,
    /// Key clients by the first `X-Forwarded-For` entry instead of the peer.
    pub trust_forwarded_for: bool,
}

impl std::fmt::Debug for RateLimiterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterManager")
            .field("enabled", &self.enabled)
            .field("requests", &self.requests)
            .field("window", &self.window)
            .field("bypass_key", &self.bypass_key.as_ref().map(|_| "<redacted>"))
            .field("exempt_paths", &self.exempt_paths)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

impl RateLimiterManager {
    pub fn from_config(
        enabled: bool,
        requests: u32,
        window: Duration,
        bypass_key: Option<String>,
        exempt_paths: Vec<String>,
    ) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            enabled,
            requests,
            window,
            bypass_key: bypass_key.filter(|k| !k.is_empty()).map(Arc::from),
            exempt_paths: Arc::new(exempt_paths),
            trust_forwarded_for: false,
        }
    }

    /// Only for deployments behind a proxy that overwrites `X-Forwarded-For`.
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn from_settings(cfg: &octoqueue_config::RateLimitConfig) -> Self {
        Self::from_config(
            cfg.enabled,
            cfg.requests,
            Duration::from_secs(cfg.window_secs),
            cfg.bypass_key.clone(),
            cfg.exempt_paths.clone(),
        )
        .with_trust_forwarded_for(cfg.trust_forwarded_for)
    }

    /// A limiter that lets everything through.
    pub fn disabled() -> Self {
        Self::from_config(false, 0, Duration::ZERO, None, Vec::new())
    }

    /// Whether limiting applies at all. A zero quota switches it off.
    pub fn is_active(&self) -> bool {
        self.enabled && self.requests > 0
    }

    /// Determine whether a given path is exempt.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }

    /// Whether the value of the bypass header matches the configured key.
    pub fn is_bypass(&self, presented: Option<&str>) -> bool {
        match (&self.bypass_key, presented) {
            (Some(key), Some(value)) => constant_time_eq(key.as_bytes(), value.as_bytes()),
            _ => false,
        }
    }

    /// Count one request for `key` (a client address). Returns false when the
    /// client has used up its quota for the current window.
    pub fn try_acquire_for(&self, key: &str) -> bool {
        if !self.is_active() {
            return true;
        }
        let now = Instant::now();
        self.prune(now);

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) > self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop windows that have run out so idle clients do not accumulate.
    fn prune(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.duration_since(w.started) <= self.window);
    }

    /// Number of clients with an open window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
