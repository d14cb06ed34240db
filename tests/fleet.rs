//! Fleet reconciliation and health publication.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stun_check::fleet::{FleetConfig, FleetCoordinator, Resolver, StunTarget};
use stun_check::probe::ProbeState;

mod common;
use common::{start_fake_stun_server, wait_until, Reply};

/// Resolver whose answer the test can change; `None` means lookup failure.
#[derive(Clone, Default)]
struct SwitchableResolver {
    answer: Arc<Mutex<Option<Vec<SocketAddr>>>>,
}

impl SwitchableResolver {
    fn set(&self, endpoints: &[SocketAddr]) {
        *self.answer.lock().unwrap() = Some(endpoints.to_vec());
    }

    fn fail(&self) {
        *self.answer.lock().unwrap() = None;
    }
}

impl Resolver for SwitchableResolver {
    async fn resolve(&self, target: &StunTarget) -> io::Result<Vec<SocketAddr>> {
        let answer = self.answer.lock().unwrap().clone();
        answer.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{target} not found")))
    }
}

fn fleet_config() -> FleetConfig {
    FleetConfig {
        targets: vec![StunTarget::new("stun.fleet.test", 3478)],
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        window_size: 10,
        probe_timeout: Duration::from_millis(500),
        seed_spacing: Duration::from_millis(5),
        ..FleetConfig::default()
    }
}

#[tokio::test]
async fn test_endpoint_set_changes() {
    let a = start_fake_stun_server(|_| Reply::Answer).await;
    let b = start_fake_stun_server(|_| Reply::Answer).await;
    let resolver = SwitchableResolver::default();
    let fleet = FleetCoordinator::new(fleet_config(), resolver.clone());

    resolver.set(&[a.addr]);
    let report = fleet.reconcile().await;
    assert_eq!(report.added, vec![a.addr]);
    assert_eq!(fleet.endpoints(), vec![a.addr]);

    // {A} → {A, B}: B gets a client and is seeded with a full window.
    resolver.set(&[a.addr, b.addr]);
    let report = fleet.reconcile().await;
    assert_eq!(report.added, vec![b.addr]);
    assert!(report.removed.is_empty());

    let b_client = fleet.client(&b.addr).unwrap();
    assert_eq!(b_client.state(), ProbeState::Running);
    assert!(wait_until(Duration::from_secs(2), || b.received() == 10).await);
    assert!(wait_until(Duration::from_secs(2), || b_client.window_summary().completed == 10).await);

    let snapshot = fleet.refresh_health();
    assert!(snapshot.endpoints.contains_key(&a.addr));
    assert_eq!(snapshot.endpoints[&b.addr].total_requests, 10);

    // Back to {A}: B is stopped, removed, and gone from the next snapshot.
    resolver.set(&[a.addr]);
    let report = fleet.reconcile().await;
    assert_eq!(report.removed, vec![b.addr]);
    assert_eq!(b_client.state(), ProbeState::Stopped);
    assert_eq!(fleet.endpoints(), vec![a.addr]);

    let snapshot = fleet.refresh_health();
    assert!(!snapshot.endpoints.contains_key(&b.addr));
    assert_eq!(fleet.snapshot().endpoints.len(), 1);

    fleet.stop().await;
}

#[tokio::test]
async fn test_failed_lookup_keeps_clients() {
    let a = start_fake_stun_server(|_| Reply::Answer).await;
    let resolver = SwitchableResolver::default();
    let fleet = FleetCoordinator::new(fleet_config(), resolver.clone());

    resolver.set(&[a.addr]);
    fleet.reconcile().await;

    resolver.fail();
    let report = fleet.reconcile().await;
    assert!(report.removed.is_empty());
    assert_eq!(report.failed_targets, vec![StunTarget::new("stun.fleet.test", 3478)]);
    assert_eq!(fleet.endpoints(), vec![a.addr]);
    assert!(fleet.client(&a.addr).unwrap().is_running());

    fleet.stop().await;
}

#[tokio::test]
async fn test_unresponsive_endpoint_degrades_fleet() {
    let dead = start_fake_stun_server(|_| Reply::Ignore).await;
    let resolver = SwitchableResolver::default();
    let fleet = FleetCoordinator::new(
        FleetConfig {
            probe_timeout: Duration::from_millis(100),
            ..fleet_config()
        },
        resolver.clone(),
    );

    resolver.set(&[dead.addr]);
    fleet.reconcile().await;
    assert!(fleet.refresh_health().overall_healthy);

    let client = fleet.client(&dead.addr).unwrap();
    assert!(wait_until(Duration::from_secs(2), || client.window_summary().failed > 0).await);

    let snapshot = fleet.refresh_health();
    assert!(!snapshot.overall_healthy);
    assert!(snapshot.last_violation.is_some());
    // Still held down on the next evaluation.
    assert!(!fleet.refresh_health().overall_healthy);

    fleet.stop().await;
}

#[tokio::test]
async fn test_probe_round_and_stop() {
    let a = start_fake_stun_server(|_| Reply::Answer).await;
    let resolver = SwitchableResolver::default();
    let fleet = FleetCoordinator::new(
        FleetConfig {
            window_size: 10,
            seed_spacing: Duration::from_millis(1),
            ..fleet_config()
        },
        resolver.clone(),
    );

    resolver.set(&[a.addr]);
    fleet.start().await;
    assert_eq!(fleet.endpoints(), vec![a.addr]);
    assert!(wait_until(Duration::from_secs(2), || a.received() >= 10).await);

    assert_eq!(fleet.probe_all(), 1);
    assert!(wait_until(Duration::from_secs(2), || a.received() >= 11).await);

    let client = fleet.client(&a.addr).unwrap();
    fleet.stop().await;
    assert!(fleet.endpoints().is_empty());
    assert_eq!(client.state(), ProbeState::Stopped);
}
