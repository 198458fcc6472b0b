//! Binds the proxy port and the admin port as two independent axum servers
//! sharing one [`AppState`] (§10.1).

use axum::Router;
use axum::routing::any;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handler::proxy_handler;
use crate::state::AppState;
use crate::{admin, config::AppConfig};

/// Exit code for a port bind failure (§6).
pub const EXIT_BIND_FAILURE: i32 = 2;

pub fn build_proxy_router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .fallback(proxy_handler)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub fn build_admin_router(state: AppState) -> Router {
    admin::router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Bind both routers and serve until either task exits or errors.
pub async fn run(config: AppConfig) -> std::io::Result<()> {
    let proxy_addr = format!("0.0.0.0:{}", config.port);
    let admin_addr = format!("0.0.0.0:{}", config.admin_port);

    let state = AppState::new(config);
    let proxy_router = build_proxy_router(state.clone());
    let admin_router = build_admin_router(state);

    let proxy_listener = tokio::net::TcpListener::bind(&proxy_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;

    info!(proxy_addr = %proxy_addr, admin_addr = %admin_addr, "vcr-proxy starting");

    let proxy_task = tokio::spawn(async move { axum::serve(proxy_listener, proxy_router).await });
    let admin_task = tokio::spawn(async move { axum::serve(admin_listener, admin_router).await });

    let (proxy_result, admin_result) = tokio::try_join!(proxy_task, admin_task)
        .expect("server tasks do not panic under normal operation");
    proxy_result?;
    admin_result?;
    Ok(())
}
