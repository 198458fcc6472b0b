//! Canonicalization of an inbound HTTP request into a stable intermediate
//! representation.
//!
//! [`normalize`] is pure and stateless: given the same request bytes and the
//! same [`RouteConfig`](crate::route_config::RouteConfig), it always produces
//! the same [`CanonicalRequest`].

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::route_config::RouteConfig;

/// Default body-size ceiling (§4.1). Requests above this are rejected.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Headers stripped from every request regardless of route config (§4.1).
pub const DEFAULT_ALWAYS_IGNORE_HEADERS: &[&str] =
    &["date", "x-request-id", "x-trace-id", "traceparent", "tracestate"];

/// The canonicalized body, tagged by how it was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalBody {
    /// Parsed JSON, already key-sorted and with ignored fields removed.
    /// The string is the minimal, stable serialization used for fingerprinting.
    Json(String),
    /// Parsed form data, sorted as `name=value` pairs.
    Form(Vec<(String, String)>),
    /// Any other content-type, or JSON that failed to parse: the raw bytes.
    Raw(Vec<u8>),
}

/// A request reduced to the fields that participate in matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    pub method: String,
    pub path: String,
    /// Sorted `(name, value)` pairs, already filtered by `ignore.query_params`.
    pub query: Vec<(String, String)>,
    /// Sorted `(name, [values])` pairs, already filtered by ignore lists.
    pub headers: Vec<(String, Vec<String>)>,
    pub body: CanonicalBody,
}

/// Raw input to the normalizer: what an HTTP framework hands us after
/// reading the body into memory.
pub struct RawRequest<'a> {
    pub method: &'a str,
    /// Path plus query string exactly as received on the wire (e.g. `/a?b=1`).
    pub raw_target: &'a str,
    /// Header name/value pairs in transmission order (names may repeat and
    /// may be of any case).
    pub headers: &'a [(String, String)],
    pub body: &'a [u8],
    pub content_type: &'a str,
}

pub fn normalize(
    req: &RawRequest,
    route: &RouteConfig,
    global_always_ignore_headers: &[String],
    body_limit: usize,
) -> CoreResult<CanonicalRequest> {
    if req.body.len() > body_limit {
        return Err(CoreError::BodyTooLarge { limit: body_limit });
    }

    let method = normalize_method(req.method)?;
    let (path, raw_query) = split_path_and_query(req.raw_target)?;
    let path = normalize_path(&path)?;
    let query = normalize_query(raw_query, &route.ignore.query_params);
    let headers = normalize_headers(req.headers, global_always_ignore_headers, &route.ignore.headers);
    let body = normalize_body(req.content_type, req.body, &route.ignore.body_fields);

    Ok(CanonicalRequest {
        method,
        path,
        query,
        headers,
        body,
    })
}

fn normalize_method(method: &str) -> CoreResult<String> {
    if method.is_empty() || !method.chars().all(|c| c.is_ascii() && !c.is_control()) {
        return Err(CoreError::InvalidRequest(format!("invalid method '{method}'")));
    }
    Ok(method.to_ascii_uppercase())
}

fn split_path_and_query(raw_target: &str) -> CoreResult<(String, &str)> {
    if raw_target.is_empty() || !raw_target.starts_with('/') {
        return Err(CoreError::InvalidRequest(format!(
            "invalid request target '{raw_target}'"
        )));
    }
    match raw_target.split_once('?') {
        Some((path, query)) => Ok((path.to_string(), query)),
        None => Ok((raw_target.to_string(), "")),
    }
}

/// Percent-decode once, lowercase, collapse duplicate `/`, strip trailing
/// `/` unless root. `%2F`/`%2f` is left encoded rather than decoded to a
/// literal `/` byte, so `/a%2Fb` and `/a/b` remain distinguishable — decoding
/// it would let a request smuggle an extra path segment past whatever
/// prefix-matching the caller does on the canonical path (§4.1).
fn normalize_path(path: &str) -> CoreResult<String> {
    let decoded = percent_decode(path, true)?;
    let lowered = decoded.to_lowercase();

    let mut collapsed = String::with_capacity(lowered.len());
    let mut prev_slash = false;
    for c in lowered.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }

    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    Ok(collapsed)
}

fn normalize_query(raw_query: &str, ignore_params: &[String]) -> Vec<(String, String)> {
    if raw_query.is_empty() {
        return Vec::new();
    }
    let mut pairs: Vec<(String, String)> = raw_query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let (name, value) = match pair.split_once('=') {
                Some((n, v)) => (n, v),
                None => (pair, ""),
            };
            let name = percent_decode(name, false).ok()?;
            let value = percent_decode(value, false).ok()?;
            Some((name, value))
        })
        .filter(|(name, _)| !ignore_params.iter().any(|i| i == name))
        .collect();
    pairs.sort();
    pairs
}

/// Collapse sorted `(name, value)` query pairs into `(name, [values])`,
/// preserving the per-name value order `normalize_query`'s sort already
/// established. Used to shape a captured request's query for storage (§3).
pub fn group_query(pairs: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in pairs {
        if let Some(last) = grouped.last_mut() {
            if &last.0 == name {
                last.1.push(value.clone());
                continue;
            }
        }
        grouped.push((name.clone(), vec![value.clone()]));
    }
    grouped
}

/// Lowercase header names and coalesce repeated names into an ordered list
/// of values, preserving first-seen order. Unlike `normalize_headers`, this
/// applies no ignore list and does not sort the name set — used to shape a
/// captured response's headers for storage (§3), where nothing is filtered.
pub fn group_headers(headers: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        match grouped.iter_mut().find(|(n, _)| *n == lower) {
            Some(entry) => entry.1.push(value.clone()),
            None => grouped.push((lower, vec![value.clone()])),
        }
    }
    grouped
}

fn normalize_headers(
    headers: &[(String, String)],
    global_always_ignore: &[String],
    route_ignore: &[String],
) -> Vec<(String, Vec<String>)> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        if DEFAULT_ALWAYS_IGNORE_HEADERS.contains(&lower.as_str())
            || global_always_ignore.iter().any(|h| h == &lower)
            || route_ignore.iter().any(|h| h == &lower)
        {
            continue;
        }
        grouped.entry(lower).or_default().push(value.clone());
    }
    grouped.into_iter().collect()
}

fn normalize_body(content_type: &str, body: &[u8], ignore_body_fields: &[String]) -> CanonicalBody {
    let base_type = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();

    if base_type == "application/json" || base_type.ends_with("+json") {
        if let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(body) {
            for expr in ignore_body_fields {
                if let Some(path) = crate::jsonpath::JsonPathLite::parse(expr) {
                    path.delete_from(&mut value);
                }
            }
            let sorted = sort_json_keys(&value);
            if let Ok(canonical) = serde_json::to_string(&sorted) {
                return CanonicalBody::Json(canonical);
            }
        }
        // Malformed JSON (or a serialization failure, which cannot actually
        // happen for a parsed Value) falls back to raw-bytes matching.
        return CanonicalBody::Raw(body.to_vec());
    }

    if base_type == "application/x-www-form-urlencoded" {
        if let Ok(text) = std::str::from_utf8(body) {
            let mut pairs = normalize_query(text, ignore_body_fields);
            pairs.sort();
            return CanonicalBody::Form(pairs);
        }
        return CanonicalBody::Raw(body.to_vec());
    }

    CanonicalBody::Raw(body.to_vec())
}

/// `serde_json::Value` has no notion of "sorted object": recursively walk
/// and rebuild every object as a `BTreeMap`-backed `Map`, which serializes
/// keys in lexicographic order.
fn sort_json_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sort_json_keys(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// Percent-decode `s`. When `keep_encoded_slash` is set, a `%2F`/`%2f`
/// escape is copied through verbatim instead of being decoded to a literal
/// `/` byte (§4.1) — everything else decodes normally.
fn percent_decode(s: &str, keep_encoded_slash: bool) -> CoreResult<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(CoreError::InvalidRequest("truncated percent-escape".into()));
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .map_err(|_| CoreError::InvalidRequest("invalid percent-escape".into()))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| CoreError::InvalidRequest("invalid percent-escape".into()))?;
            if keep_encoded_slash && byte == b'/' {
                out.extend_from_slice(&bytes[i..i + 3]);
            } else {
                out.push(byte);
            }
            i += 3;
        } else if bytes[i] == b'+' {
            out.push(b' ');
            i += 1;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CoreError::InvalidRequest("non-UTF-8 after percent-decode".into()))
}
