//! Admin REST surface over the mode engine and cassette store (§6).

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, put},
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ProxyError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/mode", get(get_mode).put(put_mode))
        .route("/api/stats", get(get_stats))
        .route("/api/cassettes", get(list_cassettes).delete(delete_all_cassettes))
        .route("/api/cassettes/{domain}", get(list_cassettes_for_domain).delete(delete_domain_cassettes))
        .route("/api/cassettes/{domain}/{id}", delete(delete_one_cassette))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_mode(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "mode": state.mode.mode().as_str() }))
}

#[derive(Deserialize)]
struct SetMode {
    mode: String,
}

async fn put_mode(State(state): State<AppState>, Json(body): Json<SetMode>) -> Result<impl IntoResponse, ProxyError> {
    let mode: vcr_cassette::Mode = body.mode.parse().map_err(|_: vcr_cassette::CoreError| ProxyError::ModeInvalid(body.mode.clone()))?;
    let from = state.mode.mode().as_str();
    state.mode.set_mode(mode);
    info!(from, to = mode.as_str(), "admin mode change");
    Ok(Json(json!({ "mode": mode.as_str() })))
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.mode.counters())
}

async fn list_cassettes(State(state): State<AppState>) -> Result<impl IntoResponse, ProxyError> {
    let ids = state.cassettes.list(None)?;
    Ok(Json(ids))
}

async fn list_cassettes_for_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<impl IntoResponse, ProxyError> {
    let ids = state.cassettes.list(Some(&domain))?;
    Ok(Json(ids))
}

async fn delete_all_cassettes(State(state): State<AppState>) -> Result<impl IntoResponse, ProxyError> {
    let deleted = state.cassettes.delete(None, None)?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn delete_domain_cassettes(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<impl IntoResponse, ProxyError> {
    let deleted = state.cassettes.delete(Some(&domain), None)?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn delete_one_cassette(
    State(state): State<AppState>,
    Path((domain, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ProxyError> {
    let deleted = state.cassettes.delete(Some(&domain), Some(&id))?;
    Ok(Json(json!({ "deleted": deleted })))
}
