//! On-disk cassette schema: a single recorded request/response pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared format version, bumped whenever the fingerprint serialization
/// or on-disk schema changes in a way that invalidates old cassettes.
pub const FORMAT_VERSION: &str = "1";

/// Body payload tagged by how it is stored on disk (§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "body_encoding", content = "body")]
pub enum Payload {
    #[serde(rename = "utf-8")]
    Utf8(String),
    #[serde(rename = "base64")]
    Base64(String),
}

impl Payload {
    /// Encode raw bytes, preferring UTF-8 text when it round-trips cleanly.
    pub fn encode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Payload::Utf8(text.to_string()),
            Err(_) => Payload::Base64(base64_encode(bytes)),
        }
    }

    /// Decode back to the original bytes.
    pub fn decode(&self) -> Vec<u8> {
        match self {
            Payload::Utf8(s) => s.as_bytes().to_vec(),
            Payload::Base64(s) => base64_decode(s).unwrap_or_default(),
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}

/// A captured HTTP request (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, Vec<String>)>,
    #[serde(default)]
    pub headers: Vec<(String, Vec<String>)>,
    #[serde(default)]
    pub content_type: String,
    #[serde(flatten)]
    pub payload: Payload,
}

/// A captured HTTP response (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, Vec<String>)>,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Cassette metadata (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CassetteMeta {
    pub recorded_at: DateTime<Utc>,
    pub target: String,
    pub domain: String,
    pub version: String,
    /// Full 64-hex fingerprint; the filename carries only the first 8 chars.
    pub fingerprint: String,
}

/// `{meta, request, response}` — the full on-disk cassette document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cassette {
    pub meta: CassetteMeta,
    pub request: CapturedRequest,
    pub response: CapturedResponse,
}

impl Cassette {
    /// `<METHOD>_<path-slug>_<fingerprint8>.json`, relative to the domain
    /// directory (§3).
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.json",
            self.request.method,
            path_slug(&self.request.path),
            &self.meta.fingerprint[..8.min(self.meta.fingerprint.len())],
        )
    }
}

/// Path with `/` replaced by `_` and any character outside
/// `[A-Za-z0-9_.-]` stripped (§3).
pub fn path_slug(path: &str) -> String {
    path.chars()
        .map(|c| if c == '/' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}
