//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Honor `RUST_LOG` first, then the configured level
//!
//! # Design Decisions
//! - Each probe client logs under its own `probe{local,remote}` span
//! - Fields over interpolation: `txid`, `endpoint`, `latency_ms`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when neither `RUST_LOG` nor a level is configured.
pub const DEFAULT_FILTER: &str = "stun_check=info,tower_http=info";

/// Build the filter: `RUST_LOG` wins, then `level` applied to this crate.
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => format!("stun_check={level},tower_http={level}").into(),
        None => DEFAULT_FILTER.into(),
    })
}

/// Install the global subscriber. Safe to call once per process.
pub fn init_logging(level: Option<&str>) {
    let result = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
