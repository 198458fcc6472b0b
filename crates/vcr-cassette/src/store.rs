//! Filesystem-backed, content-addressed cassette store (§4.4).

use std::path::PathBuf;

use crate::cassette::Cassette;
use crate::error::CoreResult;

/// Outcome of a [`CassetteStore::save`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Recorded,
    Skipped,
}

/// Identifies one cassette file for listing/deletion purposes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CassetteId {
    pub domain: String,
    pub id: String,
    pub method: String,
    pub path: String,
}

pub struct CassetteStore {
    root: PathBuf,
}

impl CassetteStore {
    pub fn new(cassettes_dir: impl Into<PathBuf>) -> Self {
        Self { root: cassettes_dir.into() }
    }

    fn domain_dir(&self, domain: &str) -> PathBuf {
        self.root.join(domain)
    }

    /// Read `<dir>/<domain>/*_<fingerprint8>.json`, disambiguating by
    /// comparing the full fingerprint stored inside each candidate file.
    pub fn lookup(&self, domain: &str, fingerprint: &str) -> CoreResult<Option<Cassette>> {
        let dir = self.domain_dir(domain);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok(None);
        };
        let fp8 = &fingerprint[..8.min(fingerprint.len())];
        let suffix = format!("_{fp8}.json");

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            if !name.ends_with(&suffix) {
                continue;
            }
            let text = std::fs::read_to_string(entry.path())?;
            let Ok(cassette) = serde_json::from_str::<Cassette>(&text) else {
                continue;
            };
            if cassette.meta.fingerprint == fingerprint {
                return Ok(Some(cassette));
            }
        }
        Ok(None)
    }

    /// Serialize `cassette` to a temp file in the domain directory, fsync,
    /// then atomically rename into place (§3, §4.4). A pre-existing file is
    /// left untouched unless `overwrite` is set.
    pub fn save(&self, domain: &str, cassette: &Cassette, overwrite: bool) -> CoreResult<SaveOutcome> {
        let dir = self.domain_dir(domain);
        std::fs::create_dir_all(&dir)?;
        let final_path = dir.join(cassette.file_name());

        if final_path.exists() && !overwrite {
            return Ok(SaveOutcome::Skipped);
        }

        let json = serde_json::to_string_pretty(cassette).expect("Cassette always serializes");
        let tmp_path = dir.join(format!(".{}.tmp", cassette.file_name()));
        let file = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        { let mut w = std::io::BufWriter::new(&file); w.write_all(json.as_bytes())?; }
        file.sync_all()?;
        std::fs::rename(&tmp_path, &final_path)?;

        Ok(SaveOutcome::Recorded)
    }

    /// Enumerate cassette ids, optionally filtered to one domain.
    pub fn list(&self, domain: Option<&str>) -> CoreResult<Vec<CassetteId>> {
        let mut out = Vec::new();
        let domains: Vec<String> = match domain {
            Some(d) => vec![d.to_string()],
            None => self.all_domains()?,
        };
        for domain in domains {
            let dir = self.domain_dir(&domain);
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
                if !name.ends_with(".json") {
                    continue;
                }
                if let Ok(text) = std::fs::read_to_string(entry.path()) {
                    if let Ok(cassette) = serde_json::from_str::<Cassette>(&text) {
                        out.push(CassetteId {
                            domain: domain.clone(),
                            id: name.trim_end_matches(".json").to_string(),
                            method: cassette.request.method,
                            path: cassette.request.path,
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    /// Delete cassettes, optionally scoped to a domain and/or a specific id.
    /// Returns the number of files removed.
    pub fn delete(&self, domain: Option<&str>, id: Option<&str>) -> CoreResult<u64> {
        let ids = self.list(domain)?;
        let mut deleted = 0u64;
        for cassette in ids {
            if let Some(want_id) = id {
                if cassette.id != want_id {
                    continue;
                }
            }
            let path = self.domain_dir(&cassette.domain).join(format!("{}.json", cassette.id));
            if std::fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn all_domains(&self) -> CoreResult<Vec<String>> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Ok(Vec::new());
        };
        let mut domains = Vec::new();
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    if name != "_routes" {
                        domains.push(name.to_string());
                    }
                }
            }
        }
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::{CapturedRequest, CapturedResponse, CassetteMeta, Payload, FORMAT_VERSION};
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample(fingerprint: &str, method: &str, path: &str) -> Cassette {
        Cassette {
            meta: CassetteMeta {
                recorded_at: Utc::now(),
                target: format!("https://api.example.com{path}"),
                domain: "api.example.com".to_string(),
                version: FORMAT_VERSION.to_string(),
                fingerprint: fingerprint.to_string(),
            },
            request: CapturedRequest {
                method: method.to_string(),
                path: path.to_string(),
                query: Vec::new(),
                headers: Vec::new(),
                content_type: "application/json".to_string(),
                payload: Payload::Utf8("{}".to_string()),
            },
            response: CapturedResponse {
                status: 200,
                headers: Vec::new(),
                payload: Payload::Utf8(r#"{"ok":true}"#.to_string()),
            },
        }
    }

    #[test]
    fn save_then_lookup_round_trips() {
        let dir = tempdir().unwrap();
        let store = CassetteStore::new(dir.path());
        let cassette = sample(&"a".repeat(64), "POST", "/api/v1/users");

        let outcome = store.save("api.example.com", &cassette, false).unwrap();
        assert_eq!(outcome, SaveOutcome::Recorded);

        let found = store.lookup("api.example.com", &cassette.meta.fingerprint).unwrap();
        assert_eq!(found, Some(cassette));
    }

    #[test]
    fn lookup_miss_returns_none() {
        let dir = tempdir().unwrap();
        let store = CassetteStore::new(dir.path());
        assert_eq!(store.lookup("api.example.com", &"b".repeat(64)).unwrap(), None);
    }

    #[test]
    fn save_without_overwrite_skips_existing() {
        let dir = tempdir().unwrap();
        let store = CassetteStore::new(dir.path());
        let cassette = sample(&"c".repeat(64), "POST", "/x");
        store.save("api.example.com", &cassette, false).unwrap();

        let mut changed = cassette.clone();
        changed.response.payload = Payload::Utf8(r#"{"ok":false}"#.to_string());
        let outcome = store.save("api.example.com", &changed, false).unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped);

        let found = store.lookup("api.example.com", &cassette.meta.fingerprint).unwrap().unwrap();
        assert_eq!(found.response.payload, Payload::Utf8(r#"{"ok":true}"#.to_string()));
    }

    #[test]
    fn save_with_overwrite_replaces_existing() {
        let dir = tempdir().unwrap();
        let store = CassetteStore::new(dir.path());
        let cassette = sample(&"d".repeat(64), "POST", "/x");
        store.save("api.example.com", &cassette, true).unwrap();

        let mut changed = cassette.clone();
        changed.response.payload = Payload::Utf8(r#"{"ok":false}"#.to_string());
        store.save("api.example.com", &changed, true).unwrap();

        let found = store.lookup("api.example.com", &cassette.meta.fingerprint).unwrap().unwrap();
        assert_eq!(found.response.payload, Payload::Utf8(r#"{"ok":false}"#.to_string()));
    }

    #[test]
    fn disambiguates_shared_fingerprint_prefix() {
        let dir = tempdir().unwrap();
        let store = CassetteStore::new(dir.path());
        let fp_a = format!("{}{}", "e".repeat(8), "1".repeat(56));
        let fp_b = format!("{}{}", "e".repeat(8), "2".repeat(56));
        let a = sample(&fp_a, "GET", "/a");
        let b = sample(&fp_b, "GET", "/b");
        store.save("api.example.com", &a, false).unwrap();
        store.save("api.example.com", &b, false).unwrap();

        let found = store.lookup("api.example.com", &fp_b).unwrap().unwrap();
        assert_eq!(found.request.path, "/b");
    }

    #[test]
    fn list_and_delete_by_domain() {
        let dir = tempdir().unwrap();
        let store = CassetteStore::new(dir.path());
        store.save("a.example.com", &sample(&"1".repeat(64), "GET", "/x"), false).unwrap();
        store.save("b.example.com", &sample(&"2".repeat(64), "GET", "/y"), false).unwrap();

        assert_eq!(store.list(None).unwrap().len(), 2);
        assert_eq!(store.list(Some("a.example.com")).unwrap().len(), 1);

        let deleted = store.delete(Some("a.example.com"), None).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.list(None).unwrap().len(), 1);
    }
}
