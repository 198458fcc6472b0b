//! vcr-proxy — entry point.
//!
//! Loads layered configuration, initializes structured logging, and starts
//! the proxy and admin HTTP servers.

use tracing_subscriber::EnvFilter;
use vcr_proxy::config;
use vcr_proxy::server;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("VCR_CONFIG").unwrap_or_else(|_| "./vcr-proxy".to_string());
    let config = match config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        mode = %config.mode,
        targets = config.targets.len(),
        "vcr-proxy configuration loaded"
    );

    if let Err(e) = server::run(config).await {
        eprintln!("server error: {e}");
        std::process::exit(server::EXIT_BIND_FAILURE);
    }
}
