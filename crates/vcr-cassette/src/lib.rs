//! Deterministic request normalization, fingerprinting, route-config, and
//! cassette storage for the VCR proxy.
//!
//! This crate has no HTTP dependency: it operates on plain bytes and
//! [`RawRequest`](normalize::RawRequest) values so it can be exercised
//! without spinning up a server. `vcr-proxy` wires it to axum and reqwest.

pub mod cassette;
pub mod error;
pub mod fingerprint;
pub mod jsonpath;
pub mod mode;
pub mod normalize;
pub mod route_config;
pub mod singleflight;

pub use cassette::{Cassette, CassetteMeta, CapturedRequest, CapturedResponse, Payload};
pub use error::{CoreError, CoreResult};
pub use fingerprint::fingerprint;
pub use mode::{Counters, Mode, ModeEngine};
pub use normalize::{
    group_headers, group_query, normalize, CanonicalBody, CanonicalRequest, RawRequest, DEFAULT_BODY_LIMIT,
};
pub use route_config::{IgnoredFields, MatchedFields, RouteConfig, RouteConfigStore, RouteId};
pub use singleflight::{Role, SharedSingleFlight, SingleFlight};
pub use store::{CassetteId, CassetteStore, SaveOutcome};

mod store;
