//! STUN probe client for a single remote endpoint.
//!
//! # Responsibilities
//! - Own one UDP socket bound locally, targeting one STUN server
//! - Issue Binding Requests and correlate responses by transaction ID
//! - Fail unanswered requests after a fixed timeout
//! - Maintain windowed and lifetime statistics
//!
//! # States
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//! ```
//! Only Running accepts probes and processes datagrams.

use arc_swap::ArcSwapOption;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{Instrument, Span};

use crate::observability::metrics::ProbeMetrics;
use crate::probe::request::PendingRequest;
use crate::probe::stats::{LifetimeCounters, StatsView, WindowSummary};
use crate::probe::transaction::TransactionTable;
use crate::probe::ProbeError;
use crate::stun::{StunMessage, TransactionId};

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of recent requests kept for windowed stats.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Largest possible UDP payload, so no datagram is truncated.
const RECV_BUFFER_SIZE: usize = 65_535;

/// Probe client lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for ProbeState {
    fn from(val: u8) -> Self {
        match val {
            1 => ProbeState::Starting,
            2 => ProbeState::Running,
            3 => ProbeState::Stopping,
            _ => ProbeState::Stopped,
        }
    }
}

/// Tunables for a probe client.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Capacity of the recent window.
    pub window_size: usize,
    /// How long a request may stay pending.
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Resolves with the matched response, or the reason there is none.
#[derive(Debug)]
pub struct ProbeHandle {
    transaction_id: Option<TransactionId>,
    rx: oneshot::Receiver<Result<StunMessage, ProbeError>>,
}

impl ProbeHandle {
    fn failed(error: ProbeError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            transaction_id: None,
            rx,
        }
    }

    /// Transaction ID of the request, if one was issued.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }
}

impl Future for ProbeHandle {
    type Output = Result<StunMessage, ProbeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(ProbeError::Shutdown)))
    }
}

/// Probes one STUN server and keeps statistics about it.
pub struct ProbeClient {
    local: SocketAddr,
    remote: SocketAddr,
    options: ProbeOptions,
    state: AtomicU8,
    socket: ArcSwapOption<UdpSocket>,
    table: TransactionTable,
    counters: Arc<LifetimeCounters>,
    metrics: ProbeMetrics,
    stop_tx: watch::Sender<bool>,
    span: Span,
}

impl ProbeClient {
    /// Create a stopped client. `local` is the bind address (port 0 for ephemeral).
    pub fn new(local: SocketAddr, remote: SocketAddr, options: ProbeOptions) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            local,
            remote,
            table: TransactionTable::new(options.window_size),
            options,
            state: AtomicU8::new(ProbeState::Stopped as u8),
            socket: ArcSwapOption::empty(),
            counters: Arc::new(LifetimeCounters::default()),
            metrics: ProbeMetrics::for_endpoint(remote),
            stop_tx,
            span: tracing::info_span!("probe", local = %local, remote = %remote),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Address the socket is actually bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket
            .load()
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    pub fn state(&self) -> ProbeState {
        ProbeState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProbeState::Running
    }

    /// Bind the socket and start receiving. A client that is not Stopped is left alone.
    pub async fn start(self: &Arc<Self>) -> Result<(), ProbeError> {
        if !self.transition(ProbeState::Stopped, ProbeState::Starting) {
            return Ok(());
        }

        let socket = match UdpSocket::bind(self.local).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.set_state(ProbeState::Stopped);
                tracing::error!(parent: &self.span, error = %e, "Failed to bind UDP socket");
                return Err(ProbeError::Transport(e));
            }
        };

        self.stop_tx.send_replace(false);
        self.socket.store(Some(socket.clone()));

        tokio::spawn(
            receive_loop(Arc::downgrade(self), socket.clone(), self.stop_tx.subscribe())
                .instrument(self.span.clone()),
        );

        self.set_state(ProbeState::Running);
        tracing::info!(
            parent: &self.span,
            bound = ?socket.local_addr().ok(),
            window_size = self.options.window_size,
            "Probe client started"
        );
        Ok(())
    }

    /// Close the socket, fail every outstanding request with `Shutdown`, clear all state.
    pub fn stop(&self) {
        if !self.transition(ProbeState::Running, ProbeState::Stopping) {
            return;
        }

        self.stop_tx.send_replace(true);
        self.socket.store(None);

        for request in self.table.pending() {
            request.fail(ProbeError::Shutdown, || {});
        }

        self.log_stats();
        self.reset_stats();
        self.set_state(ProbeState::Stopped);
        tracing::info!(parent: &self.span, "Probe client stopped");
    }

    /// Send one Binding Request.
    ///
    /// The returned handle resolves with the response, or fails with
    /// `Timeout`, `Transport`, `NotRunning` or `Shutdown`. A failed send leaves
    /// no trace in the table or the counters.
    pub async fn send_probe(&self) -> ProbeHandle {
        if !self.is_running() {
            return ProbeHandle::failed(ProbeError::NotRunning);
        }
        let Some(socket) = self.socket.load_full() else {
            return ProbeHandle::failed(ProbeError::NotRunning);
        };

        let generation = self.counters.record_sent();
        let (request, rx) = loop {
            let (tx, rx) = oneshot::channel();
            let request = Arc::new(PendingRequest::new(
                TransactionId::random(),
                Instant::now(),
                generation,
                tx,
            ));
            if self.table.insert(request.clone()) {
                break (request, rx);
            }
        };
        let id = request.transaction_id();
        let handle = ProbeHandle {
            transaction_id: Some(id),
            rx,
        };

        let bytes = StunMessage::binding_request_with_id(id).encode();

        if let Err(e) = socket.send_to(&bytes, self.remote).await {
            self.table.remove(&id);
            self.counters.unrecord_sent(generation);
            tracing::warn!(parent: &self.span, txid = %id, error = %e, "Error sending stun packet");
            request.fail(ProbeError::Transport(e), || {});
            return handle;
        }

        if !self.is_running() {
            // Stopped while the datagram was in flight; stop() already failed it.
            self.table.remove(&id);
            request.fail(ProbeError::Shutdown, || {});
            return handle;
        }

        self.metrics.record_sent();
        // A reset since `record_sent` means this request belongs to the old window.
        let admitted = if self.counters.generation() == generation {
            self.table.admit(id)
        } else {
            None
        };
        match admitted {
            Some(evicted) => {
                tracing::debug!(parent: &self.span, txid = %id, evicted, "Sent request")
            }
            None => {
                self.table.remove(&id);
                tracing::debug!(parent: &self.span, txid = %id, "Stats reset while sending, request untracked");
            }
        }
        self.arm_timeout(request);
        handle
    }

    fn arm_timeout(&self, request: Arc<PendingRequest>) {
        let counters = self.counters.clone();
        let metrics = self.metrics.clone();
        let timeout = self.options.timeout;
        let mut stop = self.stop_tx.subscribe();

        tokio::spawn(
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        let generation = request.generation();
                        let failed = request.fail(ProbeError::Timeout(timeout), || {
                            counters.record_failed(generation);
                            metrics.record_failed();
                        });
                        if failed {
                            tracing::info!(txid = %request.transaction_id(), "Failed Request");
                        }
                    }
                    _ = stop.changed() => {
                        request.fail(ProbeError::Shutdown, || {});
                    }
                }
            }
            .instrument(self.span.clone()),
        );
    }

    /// Handle one inbound datagram from the remote endpoint.
    ///
    /// Unparseable, unsolicited, duplicate and late datagrams are dropped
    /// without touching any counter.
    pub fn on_datagram_received(&self, bytes: &[u8]) {
        if !self.is_running() {
            return;
        }

        let message = match StunMessage::parse(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(parent: &self.span, error = %e, len = bytes.len(), "Bad UDP response");
                return;
            }
        };

        let id = message.transaction_id;
        if !message.message_type.is_response() {
            tracing::trace!(parent: &self.span, txid = %id, kind = ?message.message_type, "Ignoring non-response");
            return;
        }

        let Some(request) = self.table.get(&id) else {
            tracing::trace!(parent: &self.span, txid = %id, "Unmatched response");
            return;
        };

        let generation = request.generation();
        let completed = request.complete(message, Instant::now(), |latency| {
            self.counters.record_completed(generation, latency);
            self.metrics.record_completed(latency);
        });

        match completed {
            Some(latency) => tracing::debug!(
                parent: &self.span,
                txid = %id,
                latency_ms = latency.as_secs_f64() * 1000.0,
                "CompletedRequest"
            ),
            None => tracing::trace!(parent: &self.span, txid = %id, "Late or duplicate response"),
        }
    }

    /// Zero the lifetime counters and forget every tracked request.
    /// In-flight handles still resolve; their outcomes are no longer recorded.
    pub fn reset_stats(&self) {
        self.counters.reset();
        self.table.clear();
    }

    /// True while any registered request is still waiting for its outcome.
    pub fn has_pending_requests(&self) -> bool {
        !self.table.pending().is_empty()
    }

    pub fn window_summary(&self) -> WindowSummary {
        WindowSummary::from_requests(&self.table.resident())
    }

    pub fn current_latency_avg(&self) -> f64 {
        self.window_summary().latency_avg_ms()
    }

    pub fn current_completed_pct(&self) -> f64 {
        self.window_summary().completed_pct()
    }

    pub fn current_failed_pct(&self) -> f64 {
        self.window_summary().failed_pct()
    }

    pub fn total_latency_avg(&self) -> f64 {
        self.counters.latency_avg_ms()
    }

    pub fn total_completed_pct(&self) -> f64 {
        self.counters.completed_pct()
    }

    pub fn total_failed_pct(&self) -> f64 {
        self.counters.failed_pct()
    }

    pub fn total_requests(&self) -> u64 {
        self.counters.sent()
    }

    /// All statistics, with the window read once.
    pub fn stats(&self) -> StatsView {
        let window = self.window_summary();
        StatsView {
            current_latency_avg: window.latency_avg_ms(),
            current_failed_pct: window.failed_pct(),
            current_completed_pct: window.completed_pct(),
            total_latency_avg: self.counters.latency_avg_ms(),
            total_failed_pct: self.counters.failed_pct(),
            total_completed_pct: self.counters.completed_pct(),
            total_requests: self.counters.sent(),
        }
    }

    pub fn log_stats(&self) {
        tracing::info!(
            parent: &self.span,
            total_requests = self.counters.sent(),
            completed_requests = self.counters.completed(),
            missed_requests = self.counters.failed(),
            pct_completed = self.counters.completed_pct() * 100.0,
            avg_latency_ms = self.counters.latency_avg_ms(),
            "STATS"
        );
    }

    fn transition(&self, from: ProbeState, to: ProbeState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, state: ProbeState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for ProbeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeClient")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ProbeClient {
    fn drop(&mut self) {
        // Release timer and receive tasks even if stop() was never called.
        self.stop_tx.send_replace(true);
    }
}

async fn receive_loop(
    client: Weak<ProbeClient>,
    socket: Arc<UdpSocket>,
    mut stop: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, from)) => {
                    let Some(client) = client.upgrade() else { break };
                    if !same_endpoint(from, client.remote) {
                        tracing::trace!(from = %from, "Dropping datagram from unexpected source");
                        continue;
                    }
                    client.on_datagram_received(&buf[..len]);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "UDP receive error");
                }
            },
            _ = stop.changed() => break,
        }
    }
    tracing::debug!("Receive loop exited");
}

fn same_endpoint(a: SocketAddr, b: SocketAddr) -> bool {
    a.port() == b.port() && a.ip().to_canonical() == b.ip().to_canonical()
}
