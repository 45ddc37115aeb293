use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Liveness: answers whenever the process is up, with the current unix time.
pub async fn health() -> Json<Value> {
    let now = chrono::Utc::now();
    let timestamp = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
    Json(json!({ "status": "healthy", "timestamp": timestamp }))
}
