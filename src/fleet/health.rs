//! Fleet health evaluation with hysteresis.
//!
//! # State Transitions
//! ```text
//! Healthy → Degraded: any endpoint violates a threshold
//! Degraded → Healthy: no violation for the full hold-down window
//! ```
//!
//! # Design Decisions
//! - A single violation holds the fleet degraded for the whole window
//! - Before the first violation the fleet is healthy
//! - Snapshots are immutable; the coordinator swaps them in whole

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::probe::StatsView;

/// Hold-down after a violation before the fleet reports healthy again.
pub const HYSTERESIS_WINDOW: Duration = Duration::from_secs(120);

/// Published view of the fleet, read by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub endpoints: BTreeMap<SocketAddr, StatsView>,
    pub overall_healthy: bool,
    #[serde(skip)]
    pub last_violation: Option<Instant>,
    #[serde(skip)]
    pub generated_at: Instant,
}

impl HealthSnapshot {
    /// Snapshot published before the first evaluation.
    pub fn empty() -> Self {
        Self {
            endpoints: BTreeMap::new(),
            overall_healthy: true,
            last_violation: None,
            generated_at: Instant::now(),
        }
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Applies the per-endpoint thresholds and the fleet hold-down.
#[derive(Debug)]
pub struct HealthEvaluator {
    max_latency_ms: f64,
    max_failed_pct: f64,
    hysteresis: Duration,
    last_violation: Mutex<Option<Instant>>,
    was_healthy: AtomicBool,
}

impl HealthEvaluator {
    pub fn new(max_latency_ms: f64, max_failed_pct: f64, hysteresis: Duration) -> Self {
        Self {
            max_latency_ms,
            max_failed_pct,
            hysteresis,
            last_violation: Mutex::new(None),
            was_healthy: AtomicBool::new(true),
        }
    }

    /// Latency or failure rate over threshold.
    pub fn violates(&self, stats: &StatsView) -> bool {
        stats.current_latency_avg > self.max_latency_ms
            || stats.current_failed_pct > self.max_failed_pct
    }

    pub fn last_violation(&self) -> Option<Instant> {
        *self
            .last_violation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build the snapshot for `endpoints` as observed at `now`.
    pub fn evaluate(&self, endpoints: BTreeMap<SocketAddr, StatsView>, now: Instant) -> HealthSnapshot {
        let mut last_violation = self
            .last_violation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (endpoint, stats) in &endpoints {
            if self.violates(stats) {
                tracing::warn!(
                    endpoint = %endpoint,
                    current_latency_ms = stats.current_latency_avg,
                    current_failed_pct = stats.current_failed_pct,
                    "Endpoint over threshold"
                );
                *last_violation = Some(now);
            }
        }

        let overall_healthy = match *last_violation {
            Some(at) => now.saturating_duration_since(at) >= self.hysteresis,
            None => true,
        };

        let was_healthy = self.was_healthy.swap(overall_healthy, Ordering::Relaxed);
        if was_healthy && !overall_healthy {
            tracing::warn!(hold_down_secs = self.hysteresis.as_secs(), "Fleet degraded");
        } else if !was_healthy && overall_healthy {
            tracing::info!("Fleet healthy again");
        }

        HealthSnapshot {
            endpoints,
            overall_healthy,
            last_violation: *last_violation,
            generated_at: now,
        }
    }
}
