//! Shared application state injected into every axum handler.

use std::sync::Arc;
use std::time::Duration;

use vcr_cassette::{Cassette, CassetteStore, ModeEngine, RouteConfigStore, SingleFlight};

use crate::config::AppConfig;

/// State shared across the proxy router and the admin router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub mode: Arc<ModeEngine>,
    pub cassettes: Arc<CassetteStore>,
    pub routes: Arc<RouteConfigStore>,
    pub single_flight: Arc<SingleFlight<Cassette>>,
    pub upstream: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let mode = config.mode.parse().unwrap_or(vcr_cassette::Mode::Record);
        let cassettes_dir = config.cassettes.dir.clone();
        let upstream = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.proxy_timeout))
            .build()
            .expect("reqwest client configuration is always valid");

        Self {
            mode: Arc::new(ModeEngine::new(mode)),
            cassettes: Arc::new(CassetteStore::new(&cassettes_dir)),
            routes: Arc::new(RouteConfigStore::new(&cassettes_dir)),
            single_flight: Arc::new(SingleFlight::new()),
            upstream,
            config: Arc::new(config),
        }
    }

    /// Resolve the upstream base URL for `path` by longest path-prefix match
    /// over `config.targets` (§4.7).
    pub fn resolve_target(&self, path: &str) -> Option<(&str, &str)> {
        self.config
            .targets
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, url)| (prefix.as_str(), url.as_str()))
    }
}
