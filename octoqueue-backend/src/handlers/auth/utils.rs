use crate::{error::ApiError, state::AppState};
use axum::http::HeaderMap;
use tracing::warn;

/// Header carrying the shared admin secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Compare two secrets without short-circuiting on the first differing byte.
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Extract the presented API key, if any.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Require the configured API key on the request.
///
/// A server without a key refuses every admin call rather than running open.
pub fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.api_key() else {
        warn!("admin request refused: no API key configured");
        return Err(ApiError::forbidden("No API key set server side"));
    };
    let Some(presented) = extract_api_key(headers) else {
        warn!("admin request refused: no API key presented");
        return Err(ApiError::forbidden("No API key given client side"));
    };
    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        warn!("admin request refused: invalid API key");
        return Err(ApiError::forbidden("Invalid API key"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use octoqueue_job_queue::QueueOptions;

    fn state(key: Option<&str>) -> AppState {
        AppState::new(None, QueueOptions::default(), None, key.map(String::from))
    }

    fn headers(key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = key {
            headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        }
        headers
    }

    #[test]
    fn accepts_matching_key() {
        require_api_key(&state(Some("secret")), &headers(Some("secret"))).unwrap();
    }

    #[test]
    fn secret_comparison() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"secret"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn refusal_reasons() {
        let cases = [
            (None, Some("secret"), "No API key set server side"),
            (Some("secret"), None, "No API key given client side"),
            (Some("secret"), Some("guess"), "Invalid API key"),
        ];
        for (server, client, message) in cases {
            let err = require_api_key(&state(server), &headers(client)).unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)));
            assert_eq!(err.to_string(), message);
        }
    }
}
