//! STUN fleet management.
//!
//! # Data Flow
//! ```text
//! configured targets
//!     → resolver.rs (targets → endpoints)
//!     → coordinator.rs (one ProbeClient per endpoint, probe rounds)
//!     → health.rs (per-endpoint thresholds, hold-down, snapshot)
//!     → http (reads the published snapshot)
//! ```

pub mod coordinator;
pub mod health;
pub mod resolver;

pub use coordinator::{FleetConfig, FleetCoordinator, ReconcileReport, SharedSnapshot};
pub use health::{HealthEvaluator, HealthSnapshot, HYSTERESIS_WINDOW};
pub use resolver::{parse_targets, DnsResolver, Resolver, StunTarget, TargetParseError, DEFAULT_STUN_PORT};
