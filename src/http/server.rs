//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the status handlers
//! - Wire up request tracing
//! - Serve the latest fleet snapshot without blocking the fleet
//! - Stop gracefully on the shutdown future

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::Response,
    routing::any,
    Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::fleet::SharedSnapshot;
use crate::http::response;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: SharedSnapshot,
}

/// HTTP server exposing fleet health.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self {
            router: build_router(AppState { snapshot }),
        }
    }

    /// The router, for serving on a custom listener or testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", any(status_handler))
        .route("/stun_status", any(stun_status_handler))
        .fallback(bad_request_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Liveness only.
async fn status_handler() -> Response {
    response::empty(StatusCode::OK)
}

async fn stun_status_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshot.load();
    response::stun_status_response(&snapshot)
}

async fn bad_request_handler(uri: Uri) -> Response {
    tracing::debug!(path = %uri.path(), "Unknown path");
    response::empty(StatusCode::BAD_REQUEST)
}
