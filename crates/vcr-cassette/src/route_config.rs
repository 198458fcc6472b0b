//! Per-(domain, method, path) matching-policy overrides, cached in memory
//! and reloaded when the backing YAML file's mtime changes (§4.3).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::cassette::path_slug;
use crate::error::{CoreError, CoreResult};
use crate::mode::Mode;

/// `{route: {method, path}, matched: {...}, ignore: {...}}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub route: RouteId,
    #[serde(default)]
    pub matched: MatchedFields,
    #[serde(default)]
    pub ignore: IgnoredFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteId {
    pub method: String,
    pub path: String,
}

/// Advisory only — these lists document what participates in matching but
/// do not themselves affect it (§3). `ignore` below is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedFields {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub body_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnoredFields {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub body_fields: Vec<String>,
    #[serde(default)]
    pub query_params: Vec<String>,
}

impl RouteConfig {
    /// A route config with empty ignore lists, written on first record of a
    /// previously-unseen `(method, path)` pair (§4.3).
    pub fn new_default(method: &str, path: &str) -> Self {
        Self {
            route: RouteId { method: method.to_string(), path: path.to_string() },
            matched: MatchedFields::default(),
            ignore: IgnoredFields::default(),
        }
    }
}

struct CachedEntry {
    config: RouteConfig,
    mtime: Option<SystemTime>,
}

/// Filesystem-backed route-config store with mtime-triggered reload.
///
/// Lookup key is `(domain, method, path)`; the literal request path is used
/// verbatim as the path-template (§4.3 / §9 open question: no parameterized
/// template inference).
pub struct RouteConfigStore {
    root: PathBuf,
    cache: Mutex<HashMap<(String, String, String), CachedEntry>>,
}

impl RouteConfigStore {
    pub fn new(cassettes_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: cassettes_dir.into().join("_routes"),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn file_path(&self, domain: &str, method: &str, path: &str) -> PathBuf {
        self.root.join(domain).join(format!("{method}_{}.yaml", path_slug(path)))
    }

    /// Look up or create the effective route config for this request.
    ///
    /// In `record` or `spy` mode, a missing file is written with empty
    /// `ignore` lists so operators have something to edit. In `replay`
    /// mode a missing file simply yields the default in memory (writing
    /// during a pure-replay run would defeat the "human curated after
    /// first record" contract).
    pub fn get_or_create(&self, domain: &str, method: &str, path: &str, mode: Mode) -> CoreResult<RouteConfig> {
        let key = (domain.to_string(), method.to_string(), path.to_string());
        let file_path = self.file_path(domain, method, path);
        let disk_mtime = std::fs::metadata(&file_path).ok().and_then(|m| m.modified().ok());

        let mut cache = self.cache.lock().expect("route-config cache mutex poisoned");
        if let Some(entry) = cache.get(&key) {
            if entry.mtime == disk_mtime {
                return Ok(entry.config.clone());
            }
        }

        let config = if file_path.exists() {
            let text = std::fs::read_to_string(&file_path)?;
            serde_yaml::from_str(&text).map_err(|source| CoreError::RouteConfigInvalid {
                path: file_path.display().to_string(),
                source,
            })?
        } else {
            let fresh = RouteConfig::new_default(method, path);
            if matches!(mode, Mode::Record | Mode::Spy) {
                self.write(&file_path, &fresh)?;
            }
            fresh
        };

        cache.insert(key, CachedEntry { config: config.clone(), mtime: disk_mtime });
        Ok(config)
    }

    fn write(&self, file_path: &Path, config: &RouteConfig) -> CoreResult<()> {
        let dir = file_path.parent().expect("route-config path always has a parent");
        std::fs::create_dir_all(dir)?;
        let yaml = serde_yaml::to_string(config).expect("RouteConfig always serializes");
        let tmp_path = dir.join(format!(".{}.tmp", file_path.file_name().unwrap().to_string_lossy()));
        std::fs::write(&tmp_path, yaml)?;
        std::fs::rename(&tmp_path, file_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_default_config_on_first_record() {
        let dir = tempdir().unwrap();
        let store = RouteConfigStore::new(dir.path());
        let config = store.get_or_create("api.example.com", "POST", "/users", Mode::Record).unwrap();
        assert!(config.ignore.headers.is_empty());
        assert!(dir.path().join("_routes/api.example.com/POST_users.yaml").exists());
    }

    #[test]
    fn does_not_write_a_file_in_replay_mode() {
        let dir = tempdir().unwrap();
        let store = RouteConfigStore::new(dir.path());
        store.get_or_create("api.example.com", "GET", "/missing", Mode::Replay).unwrap();
        assert!(!dir.path().join("_routes/api.example.com/GET_missing.yaml").exists());
    }

    #[test]
    fn edits_are_picked_up_after_mtime_changes() {
        let dir = tempdir().unwrap();
        let store = RouteConfigStore::new(dir.path());
        store.get_or_create("api.example.com", "POST", "/users", Mode::Record).unwrap();

        let path = dir.path().join("_routes/api.example.com/POST_users.yaml");
        let mut edited = RouteConfig::new_default("POST", "/users");
        edited.ignore.headers.push("x-api-key".to_string());
        std::thread::sleep(std::time::Duration::from_millis(50));
        std::fs::write(&path, serde_yaml::to_string(&edited).unwrap()).unwrap();

        let reloaded = store.get_or_create("api.example.com", "POST", "/users", Mode::Record).unwrap();
        assert_eq!(reloaded.ignore.headers, vec!["x-api-key".to_string()]);
    }
}
