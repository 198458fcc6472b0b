//! Core error types for normalization, fingerprinting, and cassette storage.

use thiserror::Error;

/// Errors raised by the matching-and-cassette engine.
///
/// These are transport-agnostic: the HTTP-facing crate maps each variant to
/// a status code and JSON body.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds the configured limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("no cassette recorded for fingerprint {0}")]
    CassetteMiss(String),

    #[error("store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("invalid route-config YAML at {path}: {source}")]
    RouteConfigInvalid {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid mode '{0}', expected one of record|replay|spy")]
    ModeInvalid(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
