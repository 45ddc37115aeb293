use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use octoqueue_backend::{rate_limiter::RateLimiterManager, state::AppState};
use octoqueue_config::CorsConfig;
use octoqueue_job_queue::QueueOptions;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

// No tracker and no processor: /create-job answers 503 once past the limiter,
// which is enough to tell limited from unlimited requests apart.
fn state() -> Arc<AppState> {
    Arc::new(AppState::new(None, QueueOptions::default(), None, None))
}

fn limiter(requests: u32) -> RateLimiterManager {
    RateLimiterManager::from_config(
        true,
        requests,
        Duration::from_secs(60),
        Some("trusted".to_string()),
        vec!["/health".to_string(), "/admin/schema".to_string()],
    )
}

fn peer(client: &str) -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::new(client.parse().unwrap(), 40000))
}

fn create_job(client: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(Method::POST)
        .uri("/create-job")
        .header("content-type", "application/json")
        .extension(peer(client))
}

async fn status_of(app: &Router, req: Request<Body>) -> StatusCode {
    app.clone().oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn third_request_in_window_is_limited() {
    let app = octoqueue_backend::build_router_with_limiter(state(), limiter(2));

    for _ in 0..2 {
        let req = create_job("198.51.100.1")
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        assert_eq!(status_of(&app, req).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    let req = create_job("198.51.100.1")
        .body(Body::from(r#"{"data":{}}"#))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");

    // Another client has its own quota.
    let req = create_job("198.51.100.2")
        .body(Body::from(r#"{"data":{}}"#))
        .unwrap();
    assert_eq!(status_of(&app, req).await, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn bypass_header_skips_the_quota() {
    let app = octoqueue_backend::build_router_with_limiter(state(), limiter(1));

    for _ in 0..3 {
        let req = create_job("198.51.100.3")
            .header("x-bypass-ratelimit", "trusted")
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        assert_eq!(status_of(&app, req).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    let wrong = || {
        create_job("198.51.100.3")
            .header("x-bypass-ratelimit", "guess")
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap()
    };
    assert_eq!(status_of(&app, wrong()).await, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_of(&app, wrong()).await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn exempt_paths_are_never_limited() {
    let app = octoqueue_backend::build_router_with_limiter(state(), limiter(1));
    for _ in 0..5 {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .extension(peer("198.51.100.4"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(&app, req).await, StatusCode::OK);
    }
}

#[tokio::test]
async fn zero_quota_disables_limiting() {
    let app = octoqueue_backend::build_router_with_limiter(state(), limiter(0));
    for _ in 0..10 {
        let req = create_job("198.51.100.5")
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        assert_eq!(status_of(&app, req).await, StatusCode::SERVICE_UNAVAILABLE);
    }
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_quota() {
    let app = octoqueue_backend::build_router_with_limiter(state(), limiter(2));

    let mut statuses = Vec::new();
    for i in 0..10 {
        let req = create_job("198.51.100.6")
            .header("x-forwarded-for", format!("10.0.0.{i}"))
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        statuses.push(status_of(&app, req).await);
    }
    assert_eq!(&statuses[..2], &[StatusCode::SERVICE_UNAVAILABLE; 2]);
    assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn trusted_proxy_keys_on_forwarded_for() {
    let limiter = limiter(1).with_trust_forwarded_for(true);
    let app = octoqueue_backend::build_router_with_limiter(state(), limiter);

    // Both requests arrive through the same proxy address.
    for client in ["203.0.113.1", "203.0.113.2"] {
        let req = create_job("192.0.2.10")
            .header("x-forwarded-for", format!("{client}, 192.0.2.10"))
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        assert_eq!(status_of(&app, req).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    let req = create_job("192.0.2.10")
        .header("x-forwarded-for", "203.0.113.1")
        .body(Body::from(r#"{"data":{}}"#))
        .unwrap();
    assert_eq!(status_of(&app, req).await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn cors_preflight_from_allowed_origin() {
    let cors = CorsConfig {
        allowed_origins: vec!["http://127.0.0.1:5173".to_string()],
        allow_all_origins: false,
    };
    let app = octoqueue_backend::build_app(state(), limiter(1), &cors);

    let preflight = |origin: &'static str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/create-job")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap()
    };

    let resp = app.clone().oneshot(preflight("http://127.0.0.1:5173")).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://127.0.0.1:5173")
    );

    let resp = app.clone().oneshot(preflight("https://evil.example")).await.unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}
