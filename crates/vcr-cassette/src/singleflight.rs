//! Deduplicates concurrent upstream fetches that share a fingerprint (§4.5).
//!
//! When the handler is about to forward a request upstream and record the
//! result, several requests with the same fingerprint may arrive before the
//! first one finishes. Only the first ("leader") actually calls upstream;
//! the rest ("followers") await the leader's result and reuse it. A failed
//! fetch is not cached — the next caller becomes a new leader and retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

/// Whether this caller actually ran `fetch` or joined an in-flight one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
        }
    }
}

/// Keyed by fingerprint. `T` is the value produced by a successful fetch
/// (e.g. the recorded [`crate::cassette::Cassette`]); it must be `Clone`
/// since every follower receives its own copy over the broadcast channel.
pub struct SingleFlight<T: Clone + Send + 'static> {
    inflight: Mutex<HashMap<String, broadcast::Sender<Result<T, String>>>>,
}

impl<T: Clone + Send + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fetch` for `key`, or await the in-flight call already running for
    /// the same key. Returns `Err(message)` both when this caller's own
    /// `fetch` failed and when it followed a leader whose `fetch` failed.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> Result<T, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        self.run_labeled(key, fetch).await.0
    }

    /// Same as [`Self::run`], additionally reporting whether this caller was
    /// the leader (actually ran `fetch`) or a follower (joined an in-flight
    /// call) — used for the `single-flight join` log field (§10.4).
    pub async fn run_labeled<F, Fut>(&self, key: &str, fetch: F) -> (Result<T, String>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut receiver = {
            let mut inflight = self.inflight.lock().expect("single-flight mutex poisoned");
            if let Some(tx) = inflight.get(key) {
                Some(tx.subscribe())
            } else {
                let (tx, _rx) = broadcast::channel(1);
                inflight.insert(key.to_string(), tx);
                None
            }
        };

        if let Some(ref mut rx) = receiver {
            let result = rx.recv().await.unwrap_or_else(|_| Err("leader dropped without a result".to_string()));
            return (result, Role::Follower);
        }

        let result = fetch().await;

        let tx = {
            let mut inflight = self.inflight.lock().expect("single-flight mutex poisoned");
            inflight.remove(key)
        };
        if let Some(tx) = tx {
            let _ = tx.send(result.clone());
        }
        (result, Role::Leader)
    }

    /// Number of fingerprints with a fetch currently in flight. Exposed for
    /// tests and the admin stats endpoint.
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().expect("single-flight mutex poisoned").len()
    }
}

pub type SharedSingleFlight<T> = Arc<SingleFlight<T>>;
