//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use stun_check::stun::{Attribute, StunMessage};

/// What the fake server does with the n-th request it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Binding Success echoing the transaction ID.
    Answer,
    /// Drop the request.
    Ignore,
    /// Send bytes that are not a STUN message.
    Garbage,
    /// Binding Success padded with a large SOFTWARE attribute.
    Oversized,
}

/// SOFTWARE attribute type, used to pad oversized answers.
const ATTR_SOFTWARE: u16 = 0x8022;

/// A UDP STUN responder driven by a per-request policy.
pub struct FakeStunServer {
    pub addr: SocketAddr,
    received: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeStunServer {
    /// Requests received so far.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

impl Drop for FakeStunServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a fake STUN server on an ephemeral loopback port.
/// Answers are delayed slightly so measured latency is never zero.
pub async fn start_fake_stun_server<F>(policy: F) -> FakeStunServer
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let received = Arc::new(AtomicUsize::new(0));

    let counter = received.clone();
    let task = tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let Ok(request) = StunMessage::parse(&buf[..len]) else {
                continue;
            };
            let index = counter.fetch_add(1, Ordering::SeqCst);

            let payload = match policy(index) {
                Reply::Answer => {
                    StunMessage::binding_success(request.transaction_id, from).encode()
                }
                Reply::Garbage => b"TEST12345".to_vec(),
                Reply::Oversized => {
                    let mut answer = StunMessage::binding_success(request.transaction_id, from);
                    answer.attributes.push(Attribute {
                        kind: ATTR_SOFTWARE,
                        value: vec![b'x'; 4000],
                    });
                    answer.encode()
                }
                Reply::Ignore => continue,
            };

            let socket = socket.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                let _ = socket.send_to(&payload, from).await;
            });
        }
    });

    FakeStunServer {
        addr,
        received,
        task,
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
