//! Fleet coordinator.
//!
//! # Responsibilities
//! - Keep one probe client per resolved STUN endpoint
//! - Drive periodic probing across the fleet
//! - Publish a health snapshot every health interval
//!
//! # Data Flow
//! ```text
//! resolve loop:  Resolver → endpoint set → add/start/seed or stop/remove clients
//! probe loop:    every client → send_probe() in its own task
//! health loop:   client stats → HealthEvaluator → ArcSwap<HealthSnapshot>
//! ```
//!
//! # Design Decisions
//! - Clients are keyed by endpoint and remember the target they came from
//! - A target whose lookup fails keeps its clients for that round
//! - Loops iterate over copied client lists, never holding a map guard across `.await`

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::fleet::health::{HealthEvaluator, HealthSnapshot, HYSTERESIS_WINDOW};
use crate::fleet::resolver::{DnsResolver, Resolver, StunTarget};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::probe::{ProbeClient, ProbeOptions};

/// Latest fleet snapshot, shared with readers.
pub type SharedSnapshot = Arc<ArcSwap<HealthSnapshot>>;

/// Delay before the first probe round.
const FIRST_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Fleet tunables, already clamped by the config layer.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub targets: Vec<StunTarget>,
    /// Local IP every probe socket binds to.
    pub bind_ip: IpAddr,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    /// Recent window capacity per client; also the number of seed probes.
    pub window_size: usize,
    pub max_latency_ms: f64,
    pub max_failed_pct: f64,
    pub resolve_interval: Duration,
    pub health_interval: Duration,
    pub seed_spacing: Duration,
    pub hysteresis: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(1000),
            window_size: 100,
            max_latency_ms: 100.0,
            max_failed_pct: 0.10,
            resolve_interval: Duration::from_secs(5),
            health_interval: Duration::from_secs(1),
            seed_spacing: Duration::from_millis(50),
            hysteresis: HYSTERESIS_WINDOW,
        }
    }
}

/// What one reconciliation round changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<SocketAddr>,
    pub removed: Vec<SocketAddr>,
    pub failed_targets: Vec<StunTarget>,
}

#[derive(Debug)]
struct TrackedClient {
    client: Arc<ProbeClient>,
    source: StunTarget,
}

/// Owns the probe clients for every resolved endpoint.
pub struct FleetCoordinator<R = DnsResolver> {
    config: FleetConfig,
    resolver: R,
    clients: DashMap<SocketAddr, TrackedClient>,
    snapshot: SharedSnapshot,
    evaluator: HealthEvaluator,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<R: Resolver> FleetCoordinator<R> {
    pub fn new(config: FleetConfig, resolver: R) -> Arc<Self> {
        let evaluator = HealthEvaluator::new(
            config.max_latency_ms,
            config.max_failed_pct,
            config.hysteresis,
        );
        Arc::new(Self {
            config,
            resolver,
            clients: DashMap::new(),
            snapshot: Arc::new(ArcSwap::from_pointee(HealthSnapshot::empty())),
            evaluator,
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Handle for readers such as the HTTP server.
    pub fn snapshot_handle(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    /// Most recently published snapshot.
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.snapshot.load_full()
    }

    /// Tracked endpoints in ascending order.
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        let mut endpoints: Vec<SocketAddr> = self.clients.iter().map(|e| *e.key()).collect();
        endpoints.sort();
        endpoints
    }

    pub fn client(&self, endpoint: &SocketAddr) -> Option<Arc<ProbeClient>> {
        self.clients.get(endpoint).map(|t| t.client.clone())
    }

    /// Run the first reconciliation, then spawn the resolve, probe and health loops.
    /// Calling it again, or after `stop`, has no effect.
    pub async fn start(self: &Arc<Self>) {
        if self.shutdown.is_triggered() || self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::info!(
            targets = self.config.targets.len(),
            probe_interval_secs = self.config.probe_interval.as_secs(),
            window_size = self.config.window_size,
            "Starting fleet coordinator"
        );

        self.reconcile().await;

        self.spawn_loop(
            "resolve",
            self.config.resolve_interval,
            self.config.resolve_interval,
            |fleet| async move {
                fleet.reconcile().await;
            },
        );
        self.spawn_loop(
            "probe",
            FIRST_PROBE_DELAY,
            self.config.probe_interval,
            |fleet| async move {
                fleet.probe_all();
            },
        );
        self.spawn_loop(
            "health",
            self.config.health_interval,
            self.config.health_interval,
            |fleet| async move {
                fleet.refresh_health();
            },
        );
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, name: &'static str, first: Duration, period: Duration, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fleet = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        // A stop that landed before `subscribe` was never broadcast to us.
        if self.shutdown.is_triggered() {
            tracing::debug!(task = name, "Fleet stopped before loop started");
            return;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(fleet.clone()).await,
                    _ = shutdown.recv() => {
                        tracing::debug!(task = name, "Fleet loop exiting");
                        break;
                    }
                }
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    /// Resolve every target and bring the client set in line with the result.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut desired: HashMap<SocketAddr, StunTarget> = HashMap::new();
        let mut failed: HashSet<StunTarget> = HashSet::new();

        for target in &self.config.targets {
            match self.resolver.resolve(target).await {
                Ok(addrs) => {
                    for addr in addrs {
                        desired.entry(addr).or_insert_with(|| target.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(target = %target, error = %e, "Problem looking up address");
                    failed.insert(target.clone());
                }
            }
        }

        for (endpoint, source) in &desired {
            if self.shutdown.is_triggered() {
                break;
            }
            if self.clients.contains_key(endpoint) {
                continue;
            }

            let local = SocketAddr::new(self.local_ip_for(endpoint), 0);
            let client = Arc::new(ProbeClient::new(local, *endpoint, self.probe_options()));
            if let Err(e) = client.start().await {
                tracing::error!(endpoint = %endpoint, error = %e, "Failed to start probe client");
                continue;
            }

            match self.clients.entry(*endpoint) {
                Entry::Occupied(_) => client.stop(),
                Entry::Vacant(slot) => {
                    slot.insert(TrackedClient {
                        client: client.clone(),
                        source: source.clone(),
                    });
                    tracing::info!(endpoint = %endpoint, target = %source, "Added new StunClient");
                    self.seed(client);
                    report.added.push(*endpoint);
                }
            }
        }

        let stale: Vec<SocketAddr> = self
            .clients
            .iter()
            .filter(|e| !desired.contains_key(e.key()) && !failed.contains(&e.value().source))
            .map(|e| *e.key())
            .collect();

        for endpoint in stale {
            if let Some((_, tracked)) = self.clients.remove(&endpoint) {
                tracked.client.stop();
                tracing::info!(endpoint = %endpoint, target = %tracked.source, "Removed StunClient");
                report.removed.push(endpoint);
            }
        }

        report.added.sort();
        report.removed.sort();
        report.failed_targets = failed.into_iter().collect();
        report
    }

    /// Fire one probe at every tracked client without awaiting outcomes.
    /// Returns the number of probes issued.
    pub fn probe_all(&self) -> usize {
        let clients = self.tracked_clients();
        for client in &clients {
            let client = client.clone();
            tokio::spawn(async move {
                let _ = client.send_probe().await;
            });
        }
        tracing::trace!(clients = clients.len(), "Probe round");
        clients.len()
    }

    /// Evaluate every client and publish a new snapshot.
    pub fn refresh_health(&self) -> Arc<HealthSnapshot> {
        let endpoints: BTreeMap<_, _> = self
            .tracked_clients()
            .iter()
            .map(|c| (c.remote_addr(), c.stats()))
            .collect();

        let snapshot = Arc::new(self.evaluator.evaluate(endpoints, Instant::now()));
        metrics::record_fleet_health(snapshot.endpoints.len(), snapshot.overall_healthy);
        self.snapshot.store(snapshot.clone());
        snapshot
    }

    /// Stop the loops, wait for them, then stop and forget every client.
    pub async fn stop(&self) {
        self.shutdown.trigger();

        let tasks = {
            let mut tasks = self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *tasks)
        };
        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Fleet loop ended abnormally");
            }
        }

        for endpoint in self.endpoints() {
            if let Some((_, tracked)) = self.clients.remove(&endpoint) {
                tracked.client.stop();
            }
        }
        tracing::info!("Fleet coordinator stopped");
    }

    fn seed(&self, client: Arc<ProbeClient>) {
        let count = self.config.window_size;
        let spacing = self.config.seed_spacing;
        let mut shutdown = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return;
        }

        tokio::spawn(async move {
            let start = Instant::now();
            for i in 0..count {
                let at = start + spacing * i as u32;
                tokio::select! {
                    _ = time::sleep_until(at) => {}
                    _ = shutdown.recv() => return,
                }
                if !client.is_running() {
                    return;
                }
                let _ = client.send_probe().await;
            }
            tracing::debug!(endpoint = %client.remote_addr(), probes = count, "Seeding finished");
        });
    }

    fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            window_size: self.config.window_size,
            timeout: self.config.probe_timeout,
        }
    }

    /// The configured bind IP, or the unspecified address of the endpoint's family.
    fn local_ip_for(&self, endpoint: &SocketAddr) -> IpAddr {
        match (self.config.bind_ip, endpoint) {
            (ip, SocketAddr::V6(_)) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            (ip, SocketAddr::V4(_)) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            (ip, _) => ip,
        }
    }

    fn tracked_clients(&self) -> Vec<Arc<ProbeClient>> {
        self.clients.iter().map(|e| e.value().client.clone()).collect()
    }
}

impl<R> std::fmt::Debug for FleetCoordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetCoordinator")
            .field("targets", &self.config.targets)
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}
