//! Layered configuration: YAML file + `VCR_`-prefixed environment (§10.3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration, deserialized from the merged YAML + environment
/// sources. Every field has a default so a bare `VCR_TARGET=...` is enough
/// to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: String,
    pub port: u16,
    pub admin_port: u16,
    /// Path-prefix → upstream base URL, longest-prefix-match at request time.
    pub targets: BTreeMap<String, String>,
    pub cassettes: CassettesConfig,
    pub matching: MatchingConfig,
    /// Upstream call timeout, in seconds.
    pub proxy_timeout: u64,
    pub logging: LoggingConfig,
    /// Forward/intercepting-proxy deployment shape. The reverse-proxy shape
    /// (path-prefix routing over `targets`) is always active; this section
    /// only governs whether the forward shape is *also* requested, which is
    /// currently rejected at startup (§1 — TLS MITM is not implemented).
    pub forward_proxy: ForwardProxyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: "record".to_string(),
            port: 8080,
            admin_port: 8081,
            targets: BTreeMap::new(),
            cassettes: CassettesConfig::default(),
            matching: MatchingConfig::default(),
            proxy_timeout: 30,
            logging: LoggingConfig::default(),
            forward_proxy: ForwardProxyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CassettesConfig {
    pub dir: String,
    pub overwrite: bool,
}

impl Default for CassettesConfig {
    fn default() -> Self {
        Self { dir: "./cassettes".to_string(), overwrite: false }
    }
}

/// `mode: forward` plus certificate paths, mirroring the config surface a
/// TLS-terminating intercepting proxy would need. Present so operators can
/// express the intent; rejected at startup because the MITM machinery
/// itself is out of scope (§1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardProxyConfig {
    pub enabled: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub always_ignore_headers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Error produced while loading configuration — always maps to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration names no upstream targets; set `targets` in the config file or VCR_TARGET")]
    NoTargets,

    #[error(
        "forward_proxy.enabled is set, but the forward/intercepting TLS-MITM proxy shape is not \
         implemented; use the reverse-proxy shape (`targets`) instead"
    )]
    ForwardProxyNotImplemented,
}

/// Load `AppConfig` from `path` (if it exists) layered with `VCR_`-prefixed
/// environment variables, then apply the `VCR_TARGET` single-target
/// shorthand overlay. `config::Environment` cannot express "insert a map
/// entry under an arbitrary key", so that one piece of overlay logic is
/// hand-written rather than expressed declaratively.
pub fn load(path: &str) -> Result<AppConfig, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("VCR").separator("__"));

    let raw = builder.build()?;
    let mut cfg: AppConfig = raw.try_deserialize()?;

    if let Ok(target) = std::env::var("VCR_TARGET") {
        cfg.targets.insert("/".to_string(), target);
    }

    if cfg.targets.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    if cfg.forward_proxy.enabled {
        return Err(ConfigError::ForwardProxyNotImplemented);
    }

    Ok(cfg)
}
