//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Clamp → Metrics → Fleet start → HTTP listener
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → HTTP graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Fleet stop → broadcast to loops and seed tasks → clients stopped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then fleet, then listeners
//! - Ordered shutdown: stop serving, stop loops, stop clients

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
