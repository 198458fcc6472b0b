//! Process-wide operating mode and hit/miss counters.
//!
//! [`ModeEngine`] holds a single [`Mode`] value plus four monotonic counters.
//! All reads and writes are atomic so the admin API and the request handler
//! can observe/mutate them concurrently without a lock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::error::CoreError;

/// The handler's dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Always forward upstream and persist the result.
    Record,
    /// Always serve from the cassette store; 404 on miss.
    Replay,
    /// Serve from the cassette store on hit, record on miss.
    Spy,
}

impl Mode {
    fn as_u8(self) -> u8 {
        match self {
            Mode::Record => 0,
            Mode::Replay => 1,
            Mode::Spy => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Mode::Record,
            1 => Mode::Replay,
            _ => Mode::Spy,
        }
    }

    /// Lowercase wire representation used in config files and the admin API.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Replay => "replay",
            Mode::Spy => "spy",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record" => Ok(Mode::Record),
            "replay" => Ok(Mode::Replay),
            "spy" => Ok(Mode::Spy),
            other => Err(CoreError::ModeInvalid(other.to_string())),
        }
    }
}

/// Snapshot of the four counters exposed via `GET /api/stats`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub recorded: u64,
    pub errors: u64,
}

/// Atomic mode + counters, shared across the whole process.
#[derive(Debug)]
pub struct ModeEngine {
    mode: AtomicU8,
    hits: AtomicU64,
    misses: AtomicU64,
    recorded: AtomicU64,
    errors: AtomicU64,
}

impl ModeEngine {
    pub fn new(initial: Mode) -> Self {
        Self {
            mode: AtomicU8::new(initial.as_u8()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            recorded: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode.as_u8(), Ordering::SeqCst);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recorded(&self) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> Counters {
        Counters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_str() {
        for m in [Mode::Record, Mode::Replay, Mode::Spy] {
            let parsed: Mode = m.as_str().parse().unwrap();
            assert_eq!(parsed, m);
        }
    }

    #[test]
    fn invalid_mode_string_is_rejected() {
        assert!("bogus".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_switch_is_observed_immediately() {
        let engine = ModeEngine::new(Mode::Record);
        assert_eq!(engine.mode(), Mode::Record);
        engine.set_mode(Mode::Replay);
        assert_eq!(engine.mode(), Mode::Replay);
    }

    #[test]
    fn counters_accumulate() {
        let engine = ModeEngine::new(Mode::Spy);
        engine.record_hit();
        engine.record_hit();
        engine.record_miss();
        engine.record_recorded();
        engine.record_error();
        let c = engine.counters();
        assert_eq!((c.hits, c.misses, c.recorded, c.errors), (2, 1, 1, 1));
    }
}
