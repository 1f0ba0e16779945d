//! Config, stats and health handlers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};

use super::super::client::ClientMeta;
use super::super::types::{HealthResponse, MessageResponse, PublicConfigResponse, StatsRequest};
use super::super::{AppError, SharedState};
use crate::error::Error;

/// GET /config - Public limits for the upload form.
pub(crate) async fn public_config(State(state): State<SharedState>) -> Json<PublicConfigResponse> {
    Json(PublicConfigResponse {
        max_file_size: state.max_upload_mib,
    })
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"))
}

/// Accepts `application/json` or `application/x-www-form-urlencoded`.
fn parse_stats(headers: &HeaderMap, body: &[u8]) -> Result<StatsRequest, AppError> {
    if is_json(headers) {
        return serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")));
    }
    let url = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();
    Ok(StatsRequest { url })
}

/// POST /stats - Record an external URL visit.
pub(crate) async fn save_stats(
    State(state): State<SharedState>,
    ClientMeta(client): ClientMeta,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let request = parse_stats(&headers, &body)?;

    match state.manager.record_visit(&request.url, &client).await {
        Ok(()) => Ok(Json(MessageResponse::new("stats saved"))),
        Err(Error::Internal(e)) => {
            tracing::error!(error = %format!("{e:#}"), "Failed to store stats");
            Err(AppError::Internal("failed to store stats".to_string()))
        },
        Err(e) => Err(e.into()),
    }
}

/// GET /health - Liveness check.
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_stats_form() {
        let parsed = parse_stats(&HeaderMap::new(), b"url=https%3A%2F%2Fexample.org%2Fa&x=1").unwrap();
        assert_eq!(parsed.url, "https://example.org/a");
    }

    #[test]
    fn test_parse_stats_json() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let parsed = parse_stats(&headers, br#"{"url":"https://example.org/b"}"#).unwrap();
        assert_eq!(parsed.url, "https://example.org/b");
        assert!(parse_stats(&headers, b"{not json").is_err());
    }
}
