//! Command line and environment overrides.
//!
//! Every flag can also come from a `STUN_*` environment variable; a flag on
//! the command line wins over the variable, and both win over the config file.
//!
//! Numeric values are taken as text so that negative or malformed input never
//! stops startup: negatives saturate to zero and are clamped later, anything
//! unparseable is logged and ignored.

use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::schema::StunCheckConfig;

#[derive(Debug, Default, Parser)]
#[command(name = "stun-check", version)]
#[command(about = "Tests STUN servers and reports stats over HTTP", long_about = None)]
pub struct Cli {
    /// TOML config file
    #[arg(short, long, value_name = "PATH", env = "STUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// STUN servers to check (ie. stun.test.com:2234,stun.test2.com:3322)
    #[arg(long, value_name = "HOST[:PORT],...", env = "STUN_SERVERS")]
    pub stun_servers: Option<String>,

    /// IP:port for the HTTP service; the IP is also used for the STUN sockets
    #[arg(long, value_name = "IP:PORT", env = "STUN_LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Seconds between checks of each server (1 - 120)
    #[arg(short, long, value_name = "SECS", env = "STUN_DELAY", allow_hyphen_values = true)]
    pub delay: Option<String>,

    /// Average latency in milliseconds above which a server is unhealthy
    #[arg(long, value_name = "MS", env = "STUN_MAX_LATENCY", allow_hyphen_values = true)]
    pub max_latency: Option<String>,

    /// Tolerable failure fraction before returning a 500 (0.0 - 1.0)
    #[arg(long, value_name = "FRACTION", env = "STUN_FAILPCT", allow_hyphen_values = true)]
    pub max_failure_pct: Option<String>,

    /// Number of results kept per server for the current stats (10 - 10000)
    #[arg(long, value_name = "COUNT", env = "STUN_CACHED_RESULTS", allow_hyphen_values = true)]
    pub cached_results: Option<String>,

    /// Prometheus exporter bind address
    #[arg(long, value_name = "IP:PORT", env = "STUN_METRICS_ADDRESS")]
    pub metrics_address: Option<String>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, value_name = "LEVEL", env = "STUN_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Overlay every value that was given onto `config`.
    pub fn apply(&self, config: &mut StunCheckConfig) {
        if let Some(servers) = &self.stun_servers {
            config.servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(listen) = &self.listen_address {
            config.listen_address = listen.clone();
        }
        if let Some(delay) = number::<i64>("delay", self.delay.as_deref()) {
            config.probe.delay_secs = saturating_unsigned(delay);
        }
        if let Some(latency) = number::<i64>("max_latency", self.max_latency.as_deref()) {
            config.health.max_latency_ms = saturating_unsigned(latency);
        }
        if let Some(pct) = number::<f64>("max_failure_pct", self.max_failure_pct.as_deref()) {
            config.health.max_failure_pct = pct;
        }
        if let Some(cached) = number::<i64>("cached_results", self.cached_results.as_deref()) {
            config.probe.cached_results = usize::try_from(cached.max(0)).unwrap_or(usize::MAX);
        }
        if let Some(addr) = &self.metrics_address {
            config.observability.metrics_address = addr.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

fn number<T: FromStr>(setting: &'static str, raw: Option<&str>) -> Option<T> {
    let raw = raw?.trim();
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(setting, given = raw, "Ignoring non-numeric setting");
            None
        }
    }
}

fn saturating_unsigned(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
