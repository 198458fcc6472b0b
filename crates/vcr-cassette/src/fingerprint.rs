//! Folds a [`CanonicalRequest`] into a 64-hex-character SHA-256 digest.
//!
//! The serialization below is part of the external contract (§4.2 of the
//! design): it must not change between versions without a format-version
//! bump recorded in cassette metadata.

use sha2::{Digest, Sha256};

use crate::normalize::{CanonicalBody, CanonicalRequest};

/// Compute the canonical byte stream for `req` and return its SHA-256 digest
/// as 64 lowercase hex characters.
pub fn fingerprint(req: &CanonicalRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.method.as_bytes());
    hasher.update(b"\n");
    hasher.update(req.path.as_bytes());
    hasher.update(b"\n");

    let query = req
        .query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    hasher.update(query.as_bytes());
    hasher.update(b"\n");

    for (name, values) in &req.headers {
        hasher.update(name.as_bytes());
        hasher.update(b": ");
        hasher.update(values.join(",").as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\n");

    match &req.body {
        CanonicalBody::Json(s) => hasher.update(s.as_bytes()),
        CanonicalBody::Form(pairs) => {
            let s = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            hasher.update(s.as_bytes());
        }
        CanonicalBody::Raw(bytes) => hasher.update(bytes),
    }

    hex::encode(hasher.finalize())
}
