//! Windowed and lifetime probe statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::probe::request::{Outcome, PendingRequest};

/// Point-in-time statistics for one endpoint.
///
/// Percentages are fractions in `0.0..=1.0`; latencies are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsView {
    pub current_latency_avg: f64,
    pub current_failed_pct: f64,
    pub current_completed_pct: f64,
    pub total_latency_avg: f64,
    pub total_failed_pct: f64,
    pub total_completed_pct: f64,
    pub total_requests: u64,
}

/// Summary over the requests resident in the recent window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSummary {
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub latency_total: Duration,
}

impl WindowSummary {
    pub fn from_requests(requests: &[Arc<PendingRequest>]) -> Self {
        let mut summary = Self::default();
        for req in requests {
            match req.outcome() {
                Outcome::Completed => {
                    summary.completed += 1;
                    summary.latency_total += req.latency().unwrap_or_default();
                }
                Outcome::Failed => summary.failed += 1,
                Outcome::Pending => summary.pending += 1,
            }
        }
        summary
    }

    /// Completed / (completed + failed). Optimistic 1.0 with no evidence yet.
    pub fn completed_pct(&self) -> f64 {
        let decided = self.completed + self.failed;
        if decided == 0 {
            return 1.0;
        }
        self.completed as f64 / decided as f64
    }

    pub fn failed_pct(&self) -> f64 {
        1.0 - self.completed_pct()
    }

    /// Mean latency in milliseconds over completed requests, 0 if none.
    pub fn latency_avg_ms(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        duration_ms(self.latency_total) / self.completed as f64
    }
}

/// Lifetime counters, reset only explicitly.
///
/// `generation` advances on every reset; requests issued under an older
/// generation no longer count.
#[derive(Debug, Default)]
pub struct LifetimeCounters {
    sent: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    latency_micros: AtomicU64,
    generation: AtomicU64,
    // Serialises `record_sent` against `reset`.
    reset_lock: Mutex<()>,
}

impl LifetimeCounters {
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Count one send and return the generation it belongs to.
    pub fn record_sent(&self) -> u64 {
        let _guard = self.reset_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.generation()
    }

    /// Undo a `record_sent` for a datagram that never left.
    pub fn unrecord_sent(&self, generation: u64) {
        if generation == self.generation() {
            let _ = self
                .sent
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
        }
    }

    pub fn record_completed(&self, generation: u64, latency: Duration) {
        if generation != self.generation() {
            return;
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, generation: u64) {
        if generation != self.generation() {
            return;
        }
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        let _guard = self.reset_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.sent.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.latency_micros.store(0, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Completed / sent, or 1.0 before anything was sent.
    pub fn completed_pct(&self) -> f64 {
        let sent = self.sent();
        if sent == 0 {
            return 1.0;
        }
        self.completed() as f64 / sent as f64
    }

    pub fn failed_pct(&self) -> f64 {
        1.0 - self.completed_pct()
    }

    /// Mean latency in milliseconds, 0 with no completions.
    pub fn latency_avg_ms(&self) -> f64 {
        let completed = self.completed();
        if completed == 0 {
            return 0.0;
        }
        self.latency_micros.load(Ordering::Relaxed) as f64 / 1000.0 / completed as f64
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
