//! Proxy-level error types and their HTTP mapping (§7).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vcr_cassette::CoreError;

/// Errors the request handler and admin API can produce.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds the configured limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("no cassette recorded for fingerprint {0}")]
    CassetteMiss(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("cassette store error: {0}")]
    StoreIo(String),

    #[error("invalid mode '{0}'")]
    ModeInvalid(String),

    #[error("no upstream target configured for path '{0}'")]
    NoTarget(String),
}

impl From<CoreError> for ProxyError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRequest(msg) => ProxyError::InvalidRequest(msg),
            CoreError::BodyTooLarge { limit } => ProxyError::BodyTooLarge { limit },
            CoreError::CassetteMiss(fp) => ProxyError::CassetteMiss(fp),
            CoreError::StoreIo(e) => ProxyError::StoreIo(e.to_string()),
            CoreError::RouteConfigInvalid { path, source } => {
                ProxyError::StoreIo(format!("route config at {path}: {source}"))
            }
            CoreError::ModeInvalid(m) => ProxyError::ModeInvalid(m),
            _ => ProxyError::StoreIo(err.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    /// Maps each error kind to the status/body pairs in §7. `StoreIO` is
    /// deliberately ambiguous here (502 vs 500 depending on whether it
    /// happened during record or replay) — callers that can distinguish
    /// should return the mapped response directly instead of propagating
    /// through this impl.
    fn into_response(self) -> Response {
        let (status, error, detail) = match &self {
            ProxyError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            ProxyError::BodyTooLarge { limit } => (
                StatusCode::BAD_REQUEST,
                "body_too_large",
                format!("body exceeds {limit} bytes"),
            ),
            ProxyError::CassetteMiss(fp) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "cassette_miss", "fingerprint": fp })),
                )
                    .into_response();
            }
            ProxyError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", self.to_string()),
            ProxyError::UpstreamUnavailable(detail) => {
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "upstream_unavailable", "detail": detail })),
                )
                    .into_response();
            }
            ProxyError::StoreIo(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "store_io", msg.clone()),
            ProxyError::ModeInvalid(m) => (StatusCode::BAD_REQUEST, "mode_invalid", m.clone()),
            ProxyError::NoTarget(path) => (StatusCode::BAD_GATEWAY, "no_target", path.clone()),
        };

        (status, Json(json!({ "error": error, "detail": detail }))).into_response()
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
