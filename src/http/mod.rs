//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing layer, routing)
//!     → ArcSwap<HealthSnapshot> (lock-free read of the latest snapshot)
//!     → response.rs (render JSON, status code, headers)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use server::HttpServer;
