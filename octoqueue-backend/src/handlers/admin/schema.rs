use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Extension;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::handlers::auth::utils::require_api_key;
use crate::schema::JobSchema;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SchemaRequest {
    pub job_schema: Map<String, Value>,
}

/// POST /admin/schema
/// Install the JSON Schema every submitted job's data must satisfy.
pub async fn set_schema(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SchemaRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let schema = JobSchema::compile(Value::Object(request.job_schema))?;
    state.install_schema(schema).await;
    info!("job schema updated");

    Ok(Json(json!({
        "status": "success",
        "message": "Schema updated successfully",
    })))
}

/// GET /admin/schema
/// Return the active schema, or null when none is installed.
pub async fn get_schema(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let schema = state.schema().await;
    Ok(Json(json!({
        "job_schema": schema.as_ref().map(|s| s.raw()),
    })))
}
