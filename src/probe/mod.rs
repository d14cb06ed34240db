//! Per-endpoint STUN probing.
//!
//! # Data Flow
//! ```text
//! send_probe():
//!     → request.rs (PendingRequest, outcome = Pending)
//!     → transaction.rs (register in table, admit into recent window)
//!     → UDP send_to
//!     → timeout task armed
//!
//! receive task:
//!     → stun::message (parse)
//!     → transaction.rs (lookup by transaction ID)
//!     → request.rs (Pending → Completed, exactly once)
//!
//! timeout task:
//!     → request.rs (Pending → Failed, exactly once)
//!
//! stats.rs derives windowed and lifetime views from the above.
//! ```
//!
//! # Design Decisions
//! - Terminal transitions are a single compare-and-set on an atomic outcome
//! - Timeout tasks hold the request itself, so eviction never cancels them
//! - Stats resets bump a generation; stale requests stop counting

pub mod client;
pub mod request;
pub mod stats;
pub mod transaction;

pub use client::{ProbeClient, ProbeHandle, ProbeOptions, ProbeState};
pub use request::{Outcome, PendingRequest};
pub use stats::StatsView;
pub use transaction::TransactionTable;

use std::time::Duration;
use thiserror::Error;

/// Reasons a probe does not produce a response.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The client is not in the Running state.
    #[error("probe client is not running")]
    NotRunning,

    /// No matching response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The datagram could not be sent.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The client stopped while the probe was outstanding.
    #[error("probe client shut down")]
    Shutdown,
}
