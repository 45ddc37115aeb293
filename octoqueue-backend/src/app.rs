use std::sync::Arc;

use crate::rate_limiter::RateLimiterManager;
use axum::extract::ConnectInfo;
use axum::middleware::Next;
use axum::{
    body::Body, extract::DefaultBodyLimit, extract::Extension, http::HeaderValue, http::Method,
    http::Request, middleware, response::IntoResponse, routing::get, routing::post, Router,
};
use octoqueue_config::CorsConfig;
use std::convert::Infallible;
use std::net::SocketAddr;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::handlers;
use crate::state::AppState;

// Job payloads are small JSON documents.
const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Header that lets trusted callers skip rate limiting.
pub const BYPASS_HEADER: &str = "x-bypass-ratelimit";

/// Build the API router without rate limiting.
pub fn build_router(state: Arc<AppState>) -> Router {
    build_router_with_limiter(state, RateLimiterManager::disabled())
}

pub fn build_router_with_limiter(state: Arc<AppState>, limiter: RateLimiterManager) -> Router {
    let router = Router::new()
        .route("/create-job", post(handlers::jobs::create::create_job))
        .route(
            "/admin/schema",
            get(handlers::admin::schema::get_schema).post(handlers::admin::schema::set_schema),
        )
        .route("/health", get(handlers::health::health));

    router
        .layer(middleware::from_fn(
            move |req: Request<Body>, next: Next| {
                let limiter = limiter.clone();
                async move {
                    if limiter.is_exempt(req.uri().path()) {
                        return Ok::<_, Infallible>(next.run(req).await);
                    }

                    let presented = req
                        .headers()
                        .get(BYPASS_HEADER)
                        .and_then(|v| v.to_str().ok());
                    if limiter.is_bypass(presented) {
                        info!(path = %req.uri().path(), "rate limiting bypassed");
                        return Ok::<_, Infallible>(next.run(req).await);
                    }

                    let key = remote_addr_key(&req, limiter.trust_forwarded_for);
                    if limiter.try_acquire_for(&key) {
                        Ok::<_, Infallible>(next.run(req).await)
                    } else {
                        warn!(client = %key, "rate limit exceeded");
                        Ok::<_, Infallible>(ApiError::RateLimited.into_response())
                    }
                }
            },
        ))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .layer(Extension(state))
}

/// Full application: the API router behind CORS and origin logging.
pub fn build_app(state: Arc<AppState>, limiter: RateLimiterManager, cors: &CorsConfig) -> Router {
    let allowed = Arc::new(cors.allowed_origins.clone());
    let allow_all = allows_any_origin(cors);

    build_router_with_limiter(state, limiter)
        .layer(cors_layer(cors))
        .layer(middleware::from_fn(
            move |req: Request<Body>, next: Next| {
                let allowed = Arc::clone(&allowed);
                async move {
                    if let Some(origin) = req.headers().get("origin").and_then(|v| v.to_str().ok()) {
                        if allow_all || allowed.iter().any(|o| o == origin) {
                            info!(%origin, "request from allowed origin");
                        } else {
                            warn!(%origin, allowed = ?allowed, "request from origin not in allowed list");
                        }
                    }
                    Ok::<_, Infallible>(next.run(req).await)
                }
            },
        ))
}

fn allows_any_origin(cors: &CorsConfig) -> bool {
    cors.allow_all_origins || cors.allowed_origins.iter().any(|o| o == "*")
}

/// CORS for browser clients: GET, POST and preflight from the configured origins.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request());

    if allows_any_origin(cors) {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Client identity for rate limiting: the peer address, or the first
/// `X-Forwarded-For` entry when the proxy in front is trusted to set it.
fn remote_addr_key(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(first) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return first.to_string();
        }
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    if let Some(addr) = req.extensions().get::<SocketAddr>() {
        return addr.ip().to_string();
    }
    "unknown".to_string()
}
