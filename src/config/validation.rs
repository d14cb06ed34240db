//! Configuration validation.
//!
//! # Responsibilities
//! - Clamp tunables into their supported ranges (never fatal)
//! - Reject configs the service cannot run with
//! - Translate the file/CLI schema into a `FleetConfig`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Out-of-range numbers are clamped with a warning instead of failing startup

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::StunCheckConfig;
use crate::fleet::{parse_targets, FleetConfig, StunTarget, TargetParseError};

pub const MIN_DELAY_SECS: u64 = 1;
pub const MAX_DELAY_SECS: u64 = 120;
pub const MIN_LATENCY_MS: u64 = 20;
pub const MIN_FAILURE_PCT: f64 = 0.001;
pub const MAX_FAILURE_PCT: f64 = 0.9999;
pub const MIN_CACHED_RESULTS: usize = 10;
pub const MAX_CACHED_RESULTS: usize = 10_000;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("no STUN servers configured")]
    NoServers,

    #[error("invalid STUN server '{entry}': {source}")]
    InvalidServer {
        entry: String,
        source: TargetParseError,
    },

    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Force every tunable into range, logging each adjustment.
pub fn clamp_config(config: &mut StunCheckConfig) {
    let probe = &mut config.probe;
    probe.delay_secs = clamp_logged("delay_secs", probe.delay_secs, MIN_DELAY_SECS, MAX_DELAY_SECS);
    probe.cached_results = clamp_logged(
        "cached_results",
        probe.cached_results,
        MIN_CACHED_RESULTS,
        MAX_CACHED_RESULTS,
    );
    probe.timeout_ms = clamp_logged("timeout_ms", probe.timeout_ms, 1, u64::MAX);

    let health = &mut config.health;
    health.max_latency_ms = clamp_logged("max_latency_ms", health.max_latency_ms, MIN_LATENCY_MS, u64::MAX);
    health.interval_ms = clamp_logged("health.interval_ms", health.interval_ms, 1, u64::MAX);
    health.max_failure_pct = clamp_failure_pct(health.max_failure_pct);

    config.dns.resolve_interval_secs =
        clamp_logged("resolve_interval_secs", config.dns.resolve_interval_secs, 1, u64::MAX);
}

fn clamp_logged<T>(name: &'static str, value: T, min: T, max: T) -> T
where
    T: Ord + Copy + std::fmt::Display,
{
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(setting = name, given = %value, using = %clamped, "Setting out of range, clamped");
    }
    clamped
}

fn clamp_failure_pct(value: f64) -> f64 {
    let clamped = if value.is_nan() {
        FleetConfig::default().max_failed_pct
    } else {
        value.clamp(MIN_FAILURE_PCT, MAX_FAILURE_PCT)
    };
    if clamped != value {
        tracing::warn!(setting = "max_failure_pct", given = value, using = clamped, "Setting out of range, clamped");
    }
    clamped
}

/// Parse every configured server into a target.
pub fn targets(config: &StunCheckConfig) -> Result<Vec<StunTarget>, Vec<ValidationError>> {
    let mut targets = Vec::new();
    let mut errors = Vec::new();

    for entry in &config.servers {
        match parse_targets(entry) {
            Ok(parsed) => targets.extend(parsed),
            Err(source) => errors.push(ValidationError::InvalidServer {
                entry: entry.clone(),
                source,
            }),
        }
    }
    if targets.is_empty() && errors.is_empty() {
        errors.push(ValidationError::NoServers);
    }

    if errors.is_empty() {
        Ok(targets)
    } else {
        Err(errors)
    }
}

pub fn listen_address(config: &StunCheckConfig) -> Result<SocketAddr, ValidationError> {
    config
        .listen_address
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidListenAddress(config.listen_address.clone()))
}

pub fn metrics_address(config: &StunCheckConfig) -> Result<SocketAddr, ValidationError> {
    config
        .observability
        .metrics_address
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidMetricsAddress(config.observability.metrics_address.clone()))
}

/// Build the coordinator's configuration from a clamped config.
pub fn fleet_config(config: &StunCheckConfig) -> Result<FleetConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let targets = targets(config).unwrap_or_else(|mut e| {
        errors.append(&mut e);
        Vec::new()
    });
    let listen = listen_address(config).map_err(|e| errors.push(e)).ok();
    if config.observability.metrics_enabled {
        if let Err(e) = metrics_address(config) {
            errors.push(e);
        }
    }

    let Some(listen) = listen.filter(|_| errors.is_empty()) else {
        return Err(errors);
    };

    Ok(FleetConfig {
        targets,
        bind_ip: listen.ip(),
        probe_interval: Duration::from_secs(config.probe.delay_secs),
        probe_timeout: Duration::from_millis(config.probe.timeout_ms),
        window_size: config.probe.cached_results,
        max_latency_ms: config.health.max_latency_ms as f64,
        max_failed_pct: config.health.max_failure_pct,
        resolve_interval: Duration::from_secs(config.dns.resolve_interval_secs),
        health_interval: Duration::from_millis(config.health.interval_ms),
        seed_spacing: Duration::from_millis(config.probe.seed_spacing_ms),
        ..FleetConfig::default()
    })
}

/// Semantic checks that are fatal at startup.
pub fn validate_config(config: &StunCheckConfig) -> Result<(), Vec<ValidationError>> {
    fleet_config(config).map(|_| ())
}
