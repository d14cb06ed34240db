//! stun-check
//!
//! Continuously probes a fleet of STUN servers and reports their health.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌──────────────────────────────────────────────────────┐
//!                │                     STUN CHECK                       │
//!                │                                                      │
//!   DNS ◀────────┼── resolve loop ──┐                                   │
//!                │                  ▼                                   │
//!                │          ┌──────────────┐   send_probe   ┌─────────┐ │    STUN
//!                │          │    fleet     │───────────────▶│  probe  │─┼──▶ servers
//!                │          │ coordinator  │                │ clients │◀┼─── (UDP)
//!                │          └──────┬───────┘                └────┬────┘ │
//!                │                 │ health loop                 │stats │
//!                │                 ▼                             │      │
//!                │        ArcSwap<HealthSnapshot> ◀──────────────┘      │
//!                │                 │                                    │
//!   HTTP ◀───────┼──── http server ┘    observability (tracing, metrics)│
//!                └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use tokio::net::TcpListener;

use stun_check::config::{load_config, resolve_config, validation, Cli, ConfigError};
use stun_check::fleet::{DnsResolver, FleetCoordinator};
use stun_check::http::HttpServer;
use stun_check::lifecycle::shutdown_signal;
use stun_check::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Flag or env first, then the file's level; errors surface below.
    let log_level = cli.log_level.clone().or_else(|| {
        cli.config
            .as_deref()
            .and_then(|path| load_config(path).ok())
            .map(|file| file.observability.log_level)
    });
    logging::init_logging(log_level.as_deref());

    tracing::info!("stun-check v{} starting", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&cli)?;
    let fleet_config = validation::fleet_config(&config)
        .map_err(ConfigError::Validation)?;
    let listen_addr = validation::listen_address(&config)?;

    tracing::info!(
        servers = ?config.servers,
        listen = %listen_addr,
        delay_secs = config.probe.delay_secs,
        max_latency_ms = config.health.max_latency_ms,
        max_failure_pct = config.health.max_failure_pct,
        cached_results = config.probe.cached_results,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = validation::metrics_address(&config)?;
        metrics::init_metrics(addr);
    }

    let fleet = FleetCoordinator::new(fleet_config, DnsResolver);
    fleet.start().await;

    let listener = TcpListener::bind(listen_addr).await?;
    let server = HttpServer::new(fleet.snapshot_handle());
    let served = server.run(listener, shutdown_signal()).await;

    fleet.stop().await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
