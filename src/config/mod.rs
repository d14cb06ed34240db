//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → config file (TOML, optional, loader.rs)
//!     → STUN_* environment and flags (cli.rs, merged by clap)
//!     → validation.rs (clamp, semantic checks)
//!     → StunCheckConfig (immutable) → FleetConfig
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde, clap) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::StunCheckConfig;
