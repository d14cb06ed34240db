//! Probe client behaviour against a fake STUN server.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use stun_check::probe::{ProbeClient, ProbeError, ProbeOptions};

mod common;
use common::{approx_eq, start_fake_stun_server, Reply};

async fn started_client(remote: std::net::SocketAddr, window_size: usize, timeout_ms: u64) -> Arc<ProbeClient> {
    let client = Arc::new(ProbeClient::new(
        "127.0.0.1:0".parse().unwrap(),
        remote,
        ProbeOptions {
            window_size,
            timeout: Duration::from_millis(timeout_ms),
        },
    ));
    client.start().await.unwrap();
    client
}

#[tokio::test]
async fn test_unanswered_probe_times_out() {
    let server = start_fake_stun_server(|_| Reply::Ignore).await;
    let client = started_client(server.addr, 10, 200).await;

    let result = client.send_probe().await.await;
    assert!(matches!(result, Err(ProbeError::Timeout(_))));

    assert_eq!(client.current_completed_pct(), 0.0);
    assert_eq!(client.current_failed_pct(), 1.0);
    assert_eq!(client.current_latency_avg(), 0.0);
    assert_eq!(client.total_requests(), 1);

    client.reset_stats();
    assert_eq!(client.current_completed_pct(), 1.0);
    assert_eq!(client.current_failed_pct(), 0.0);
    assert_eq!(client.total_requests(), 0);

    client.stop();
}

#[tokio::test]
async fn test_all_probes_answered() {
    let server = start_fake_stun_server(|_| Reply::Answer).await;
    let client = started_client(server.addr, 100, 1000).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        handles.push(client.send_probe().await);
    }
    for result in join_all(handles).await {
        let response = result.unwrap();
        assert!(response.mapped_address().is_some());
    }

    let stats = client.stats();
    assert_eq!(stats.current_completed_pct, 1.0);
    assert_eq!(stats.current_failed_pct, 0.0);
    assert!(stats.current_latency_avg > 0.0);
    assert_eq!(stats.total_requests, 50);
    assert_eq!(stats.total_completed_pct, 1.0);
    assert_eq!(server.received(), 50);

    client.stop();
}

#[tokio::test]
async fn test_malformed_response_is_ignored() {
    let server = start_fake_stun_server(|_| Reply::Garbage).await;
    let client = started_client(server.addr, 10, 300).await;

    let handle = client.send_probe().await;
    assert!(common::wait_until(Duration::from_secs(1), || server.received() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Garbage arrived but nothing moved.
    assert!(client.has_pending_requests());
    let window = client.window_summary();
    assert_eq!((window.completed, window.failed, window.pending), (0, 0, 1));
    assert_eq!(client.total_requests(), 1);

    assert!(matches!(handle.await, Err(ProbeError::Timeout(_))));
    assert_eq!(client.window_summary().failed, 1);
    assert_eq!(client.total_failed_pct(), 1.0);

    client.stop();
}

#[tokio::test]
async fn test_window_tracks_only_recent_requests() {
    // First 50: every other one answered. Next 50: every fourth one dropped.
    let server = start_fake_stun_server(|i| match i {
        i if i < 50 && i % 2 == 1 => Reply::Ignore,
        i if i >= 50 && (i - 50) % 4 == 0 => Reply::Ignore,
        _ => Reply::Answer,
    })
    .await;
    let client = started_client(server.addr, 10, 250).await;

    async fn run_batch(client: &ProbeClient, answered: impl Fn(usize) -> bool) {
        let mut unanswered = Vec::new();
        for i in 0..50 {
            let handle = client.send_probe().await;
            if answered(i) {
                assert!(handle.await.is_ok(), "probe {i} should be answered");
            } else {
                unanswered.push(handle);
            }
        }
        for result in join_all(unanswered).await {
            assert!(matches!(result, Err(ProbeError::Timeout(_))));
        }
    }

    run_batch(&client, |i| i % 2 == 0).await;
    assert!(approx_eq(client.current_completed_pct(), 0.5));
    assert_eq!(client.window_summary().completed + client.window_summary().failed, 10);

    run_batch(&client, |i| i % 4 != 0).await;
    assert!(approx_eq(client.current_completed_pct(), 0.70));
    assert!(approx_eq(client.current_failed_pct(), 0.30));
    assert!(approx_eq(client.total_completed_pct(), 0.62));
    assert_eq!(client.total_requests(), 100);

    client.stop();
}

#[tokio::test]
async fn test_stop_resolves_outstanding_probes() {
    let server = start_fake_stun_server(|_| Reply::Ignore).await;
    let client = started_client(server.addr, 10, 5_000).await;

    let handles: Vec<_> = {
        let mut v = Vec::new();
        for _ in 0..5 {
            v.push(client.send_probe().await);
        }
        v
    };
    client.stop();

    for result in join_all(handles).await {
        assert!(matches!(result, Err(ProbeError::Shutdown)));
    }
    assert_eq!(client.total_requests(), 0);
    assert!(matches!(client.send_probe().await.await, Err(ProbeError::NotRunning)));
}

#[tokio::test]
async fn test_restart_after_stop() {
    let server = start_fake_stun_server(|_| Reply::Answer).await;
    let client = started_client(server.addr, 10, 1000).await;

    assert!(client.send_probe().await.await.is_ok());
    client.stop();
    client.start().await.unwrap();

    assert_eq!(client.total_requests(), 0);
    assert!(client.send_probe().await.await.is_ok());
    assert_eq!(client.total_requests(), 1);
    assert_eq!(client.total_completed_pct(), 1.0);

    client.stop();
}

#[tokio::test]
async fn test_failed_send_is_not_tracked() {
    // An IPv4 socket cannot reach an IPv6 destination.
    let client = Arc::new(ProbeClient::new(
        "127.0.0.1:0".parse().unwrap(),
        "[::1]:3478".parse().unwrap(),
        ProbeOptions {
            window_size: 10,
            timeout: Duration::from_millis(200),
        },
    ));
    client.start().await.unwrap();

    let result = client.send_probe().await.await;
    assert!(matches!(result, Err(ProbeError::Transport(_))));
    assert_eq!(client.total_requests(), 0);
    assert!(!client.has_pending_requests());
    let window = client.window_summary();
    assert_eq!((window.completed, window.failed, window.pending), (0, 0, 0));

    client.stop();
}

#[tokio::test]
async fn test_large_response_is_matched() {
    let server = start_fake_stun_server(|_| Reply::Oversized).await;
    let client = started_client(server.addr, 10, 1000).await;

    let response = client.send_probe().await.await.unwrap();
    assert!(response.mapped_address().is_some());
    assert_eq!(client.window_summary().completed, 1);

    client.stop();
}
