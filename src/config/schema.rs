//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the checker.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the STUN checker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StunCheckConfig {
    /// STUN servers to check, each `host[:port]` (ie. "stun.example.com:3478").
    pub servers: Vec<String>,

    /// HTTP bind address. Its IP is also used for the STUN sockets.
    pub listen_address: String,

    /// Probe scheduling.
    pub probe: ProbeConfig,

    /// Health thresholds.
    pub health: HealthConfig,

    /// Re-resolution of server names.
    pub dns: DnsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for StunCheckConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            listen_address: "0.0.0.0:8080".to_string(),
            probe: ProbeConfig::default(),
            health: HealthConfig::default(),
            dns: DnsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Probe scheduling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Seconds between probes to each server.
    pub delay_secs: u64,

    /// Milliseconds before an unanswered probe counts as failed.
    pub timeout_ms: u64,

    /// Number of recent results kept per server.
    pub cached_results: usize,

    /// Spacing of the initial probes sent to a new server.
    pub seed_spacing_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            delay_secs: 5,
            timeout_ms: 1000,
            cached_results: 100,
            seed_spacing_ms: 50,
        }
    }
}

/// Health threshold configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Recent average latency above this marks a server as violating.
    pub max_latency_ms: u64,

    /// Recent failure fraction above this marks a server as violating (0.0 - 1.0).
    pub max_failure_pct: f64,

    /// Milliseconds between health evaluations.
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 100,
            max_failure_pct: 0.10,
            interval_ms: 1000,
        }
    }
}

/// DNS re-resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Seconds between resolution rounds.
    pub resolve_interval_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolve_interval_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: StunCheckConfig = toml::from_str(r#"servers = ["stun.example.com"]"#).unwrap();
        assert_eq!(config.servers, vec!["stun.example.com"]);
        assert_eq!(config.probe.delay_secs, 5);
        assert_eq!(config.probe.cached_results, 100);
        assert_eq!(config.health.max_latency_ms, 100);
        assert_eq!(config.health.max_failure_pct, 0.10);
        assert_eq!(config.observability.metrics_address, "0.0.0.0:9090");
    }

    #[test]
    fn nested_sections_override() {
        let config: StunCheckConfig = toml::from_str(
            r#"
            servers = ["a.example:1", "b.example"]
            listen_address = "127.0.0.1:9000"

            [probe]
            delay_secs = 10

            [health]
            max_failure_pct = 0.25

            [observability]
            metrics_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.probe.delay_secs, 10);
        assert_eq!(config.probe.timeout_ms, 1000);
        assert_eq!(config.health.max_failure_pct, 0.25);
        assert!(!config.observability.metrics_enabled);
    }
}
