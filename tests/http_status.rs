//! End-to-end: fake STUN server → fleet → HTTP status endpoints.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use stun_check::fleet::{FleetConfig, FleetCoordinator, Resolver, StunTarget};
use stun_check::http::HttpServer;

mod common;
use common::{start_fake_stun_server, wait_until, Reply};

struct Fixed(SocketAddr);

impl Resolver for Fixed {
    async fn resolve(&self, _target: &StunTarget) -> io::Result<Vec<SocketAddr>> {
        Ok(vec![self.0])
    }
}

#[tokio::test]
async fn test_status_endpoints_over_http() {
    let stun = start_fake_stun_server(|_| Reply::Answer).await;
    let fleet = FleetCoordinator::new(
        FleetConfig {
            targets: vec![StunTarget::new("stun.http.test", 3478)],
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            window_size: 10,
            seed_spacing: Duration::from_millis(1),
            ..FleetConfig::default()
        },
        Fixed(stun.addr),
    );
    fleet.reconcile().await;

    let client = fleet.client(&stun.addr).unwrap();
    assert!(wait_until(Duration::from_secs(2), || client.window_summary().completed == 10).await);
    fleet.refresh_health();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(HttpServer::new(fleet.snapshot_handle()).run(listener, async move {
        let _ = stop_rx.await;
    }));

    let http = reqwest::Client::new();
    let base = format!("http://{http_addr}");

    let res = http.get(format!("{base}/status")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().is_empty());

    let res = http.get(format!("{base}/stun_status")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["connection"], "close");
    let json: serde_json::Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
    let entry = &json[stun.addr.to_string()];
    assert_eq!(entry["current_completed"], "1.0000");
    assert_eq!(entry["current_failed"], "0.0000");
    assert_eq!(entry["total_requests"], 10);

    let res = http.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(res.status(), 400);

    let _ = stop_tx.send(());
    server.await.unwrap().unwrap();
    fleet.stop().await;
}
