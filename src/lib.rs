//! STUN fleet health checker.
//!
//! Probes a set of STUN servers with Binding Requests, keeps per-server
//! latency and loss statistics, and serves the fleet's health over HTTP.

pub mod config;
pub mod fleet;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod stun;

pub use config::schema::StunCheckConfig;
pub use fleet::{FleetConfig, FleetCoordinator, HealthSnapshot};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use probe::{ProbeClient, ProbeError, ProbeOptions};
