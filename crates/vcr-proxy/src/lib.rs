//! vcr-proxy — an HTTP record/replay proxy.
//!
//! Sits in front of one or more upstream HTTP services, recording
//! request/response pairs as cassettes on first observation and replaying
//! them on subsequent identical requests. See [`vcr_cassette`] for the
//! matching-and-cassette engine this crate wires up to `axum` and `reqwest`.

pub mod admin;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod state;
pub mod upstream;

pub use error::{ProxyError, ProxyResult};
pub use state::AppState;
