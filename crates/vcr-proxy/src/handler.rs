//! The proxy request handler: normalize → fingerprint → mode dispatch (§4.7).

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use vcr_cassette::{
    CanonicalRequest, CapturedRequest, CapturedResponse, Cassette, CassetteMeta, Mode, Payload, RawRequest,
};

use crate::error::ProxyError;
use crate::state::AppState;
use crate::upstream;

/// Thin wrapper around [`handle`] that also maintains the global `errors`
/// counter: any 5xx the handler emits, from whatever error site it
/// originated at, increments it exactly once here (§7).
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mode = state.mode.clone();
    match handle(state, method, uri, headers, body).await {
        Ok(response) => response,
        Err(err) => {
            let response = err.into_response();
            if response.status().is_server_error() {
                mode.record_error();
            }
            response
        }
    }
}

#[instrument(skip(state, headers, body), fields(fingerprint, mode, domain, outcome))]
async fn handle(
    state: AppState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let path = uri.path().to_string();
    let (prefix, target_url) = state
        .resolve_target(&path)
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .ok_or_else(|| ProxyError::NoTarget(path.clone()))?;
    let domain = upstream::host_of(&target_url);

    let raw_target = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path.clone(),
    };
    let method_str = method.as_str().to_string();
    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
        .collect();
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mode = state.mode.mode();
    tracing::Span::current().record("mode", mode.as_str());
    tracing::Span::current().record("domain", domain.as_str());

    let route_config = state.routes.get_or_create(&domain, &method_str, &path, mode)?;
    let canonical = vcr_cassette::normalize(
        &RawRequest {
            method: &method_str,
            raw_target: &raw_target,
            headers: &header_pairs,
            body: &body,
            content_type: &content_type,
        },
        &route_config,
        &state.config.matching.always_ignore_headers,
        vcr_cassette::DEFAULT_BODY_LIMIT,
    )?;
    let fingerprint = vcr_cassette::fingerprint(&canonical);
    tracing::Span::current().record("fingerprint", fingerprint.as_str());

    let stripped = path.strip_prefix(prefix.as_str()).unwrap_or(&path);
    let stripped = if stripped.starts_with('/') { stripped.to_string() } else { format!("/{stripped}") };
    let upstream_path = match uri.query() {
        Some(q) => format!("{stripped}?{q}"),
        None => stripped,
    };

    let response = match mode {
        Mode::Replay => match state.cassettes.lookup(&domain, &fingerprint)? {
            Some(cassette) => {
                state.mode.record_hit();
                tracing::Span::current().record("outcome", "hit");
                cassette_to_response(&cassette)
            }
            None => {
                state.mode.record_miss();
                tracing::Span::current().record("outcome", "miss");
                return Err(ProxyError::CassetteMiss(fingerprint));
            }
        },
        Mode::Record => {
            tracing::Span::current().record("outcome", "record");
            let cassette = record(
                &state,
                &domain,
                &target_url,
                &upstream_path,
                &method_str,
                &header_pairs,
                body.to_vec(),
                fingerprint.clone(),
                &canonical,
                &content_type,
            )
            .await?;
            cassette_to_response(&cassette)
        }
        Mode::Spy => match state.cassettes.lookup(&domain, &fingerprint)? {
            Some(cassette) => {
                state.mode.record_hit();
                tracing::Span::current().record("outcome", "hit");
                cassette_to_response(&cassette)
            }
            None => {
                state.mode.record_miss();
                tracing::Span::current().record("outcome", "recorded-on-miss");
                let cassette = record(
                    &state,
                    &domain,
                    &target_url,
                    &upstream_path,
                    &method_str,
                    &header_pairs,
                    body.to_vec(),
                    fingerprint.clone(),
                    &canonical,
                    &content_type,
                )
                .await?;
                cassette_to_response(&cassette)
            }
        },
    };

    info!(fingerprint = %fingerprint, mode = mode.as_str(), domain = %domain, "request handled");
    Ok(response)
}

/// Forward upstream through the single-flight coordinator, capture the
/// response, and persist the cassette (§4.5, §4.7).
///
/// `upstream_path` (prefix-stripped, still carrying the raw `?query` string)
/// is what actually gets requested of upstream; `canonical` supplies the
/// percent-decoded/lowercased path and the already-ignore-filtered query and
/// headers that get *stored* in the cassette (§3) — the two diverge
/// deliberately, since what's forwarded and what's captured serve different
/// purposes.
#[allow(clippy::too_many_arguments)]
async fn record(
    state: &AppState,
    domain: &str,
    target_url: &str,
    upstream_path: &str,
    method: &str,
    headers: &[(String, String)],
    body: Vec<u8>,
    fingerprint: String,
    canonical: &CanonicalRequest,
    content_type: &str,
) -> Result<Cassette, ProxyError> {
    let state = state.clone();
    let domain = domain.to_string();
    let target_url = target_url.to_string();
    let upstream_path = upstream_path.to_string();
    let method = method.to_string();
    let headers = headers.to_vec();
    let captured_path = canonical.path.clone();
    let captured_query = vcr_cassette::group_query(&canonical.query);
    let captured_headers = canonical.headers.clone();
    let content_type = content_type.to_string();
    let fp_for_meta = fingerprint.clone();

    let (result, role) = state
        .single_flight
        .run_labeled(&fingerprint, move || async move {
            let upstream_response =
                upstream::forward(&state.upstream, &target_url, &method, &upstream_path, &headers, body.clone())
                    .await
                    .map_err(|e| match e {
                        ProxyError::UpstreamTimeout => TIMEOUT_MARKER.to_string(),
                        other => other.to_string(),
                    })?;

            let cassette = Cassette {
                meta: CassetteMeta {
                    recorded_at: chrono::Utc::now(),
                    target: format!("{}{}", target_url.trim_end_matches('/'), upstream_path),
                    domain: domain.clone(),
                    version: vcr_cassette::cassette::FORMAT_VERSION.to_string(),
                    fingerprint: fp_for_meta.clone(),
                },
                request: CapturedRequest {
                    method: method.clone(),
                    path: captured_path.clone(),
                    query: captured_query.clone(),
                    headers: captured_headers.clone(),
                    content_type: content_type.clone(),
                    payload: Payload::encode(&body),
                },
                response: CapturedResponse {
                    status: upstream_response.status,
                    headers: vcr_cassette::group_headers(&upstream_response.headers),
                    payload: Payload::encode(&upstream_response.body),
                },
            };

            state
                .cassettes
                .save(&domain, &cassette, state.config.cassettes.overwrite)
                .map_err(|e| e.to_string())?;

            Ok(cassette)
        })
        .await;

    tracing::trace!(fingerprint = %fingerprint, role = role.as_str(), "single-flight join");

    match result {
        Ok(cassette) => {
            if role == vcr_cassette::Role::Leader {
                state.mode.record_recorded();
            }
            Ok(cassette)
        }
        Err(msg) => {
            if msg == TIMEOUT_MARKER {
                Err(ProxyError::UpstreamTimeout)
            } else {
                Err(ProxyError::UpstreamUnavailable(msg))
            }
        }
    }
}

/// Sentinel threaded through the single-flight coordinator's `String` error
/// channel so a leader's timeout is distinguishable from other transport
/// failures once it reaches every follower.
const TIMEOUT_MARKER: &str = "\u{0}vcr-proxy:upstream-timeout";

fn cassette_to_response(cassette: &Cassette) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(cassette.response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
    for (name, values) in &cassette.response.headers {
        for value in values {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(axum::body::Body::from(cassette.response.payload.decode()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
