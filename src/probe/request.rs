//! Outstanding probe state.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::probe::ProbeError;
use crate::stun::{StunMessage, TransactionId};

pub(crate) type Responder = oneshot::Sender<Result<StunMessage, ProbeError>>;

/// Outcome of a probe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending = 0,
    Completed = 1,
    Failed = 2,
}

impl From<u8> for Outcome {
    fn from(val: u8) -> Self {
        match val {
            1 => Outcome::Completed,
            2 => Outcome::Failed,
            _ => Outcome::Pending,
        }
    }
}

/// A sent probe awaiting its response.
///
/// `outcome` moves out of `Pending` exactly once. Whoever wins that
/// compare-and-set also takes the responder, so the caller's handle is
/// resolved exactly once too.
#[derive(Debug)]
pub struct PendingRequest {
    transaction_id: TransactionId,
    sent_at: Instant,
    generation: u64,
    outcome: AtomicU8,
    /// Written before the Completed transition is published.
    latency_micros: AtomicU64,
    responder: Mutex<Option<Responder>>,
}

impl PendingRequest {
    pub(crate) fn new(
        transaction_id: TransactionId,
        sent_at: Instant,
        generation: u64,
        responder: Responder,
    ) -> Self {
        Self {
            transaction_id,
            sent_at,
            generation,
            outcome: AtomicU8::new(Outcome::Pending as u8),
            latency_micros: AtomicU64::new(0),
            responder: Mutex::new(Some(responder)),
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn sent_at(&self) -> Instant {
        self.sent_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from(self.outcome.load(Ordering::Acquire))
    }

    pub fn is_pending(&self) -> bool {
        self.outcome() == Outcome::Pending
    }

    /// Round-trip time; only meaningful once Completed.
    pub fn latency(&self) -> Option<Duration> {
        match self.outcome() {
            Outcome::Completed => Some(Duration::from_micros(
                self.latency_micros.load(Ordering::Relaxed),
            )),
            _ => None,
        }
    }

    /// Pending → Completed.
    ///
    /// If this call wins the transition, `record` runs with the latency before
    /// the handle is resolved, and the latency is returned.
    pub fn complete(
        &self,
        response: StunMessage,
        now: Instant,
        record: impl FnOnce(Duration),
    ) -> Option<Duration> {
        if !self.is_pending() {
            return None;
        }
        let latency = now.saturating_duration_since(self.sent_at);
        self.latency_micros
            .store(latency.as_micros() as u64, Ordering::Relaxed);

        if !self.transition(Outcome::Completed) {
            return None;
        }
        record(latency);
        self.respond(Ok(response));
        Some(latency)
    }

    /// Pending → Failed. If this call wins, `record` runs before the handle
    /// is resolved with `error`.
    pub fn fail(&self, error: ProbeError, record: impl FnOnce()) -> bool {
        if !self.transition(Outcome::Failed) {
            return false;
        }
        record();
        self.respond(Err(error));
        true
    }

    fn transition(&self, to: Outcome) -> bool {
        self.outcome
            .compare_exchange(
                Outcome::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn respond(&self, result: Result<StunMessage, ProbeError>) {
        let responder = self
            .responder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = responder {
            // Caller may have dropped the handle; that is fine.
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> (PendingRequest, oneshot::Receiver<Result<StunMessage, ProbeError>>) {
        let (tx, rx) = oneshot::channel();
        let req = PendingRequest::new(TransactionId::random(), Instant::now(), 0, tx);
        (req, rx)
    }

    #[tokio::test]
    async fn complete_then_fail_is_noop() {
        let (req, rx) = request();
        let response = StunMessage::binding_request_with_id(req.transaction_id());

        let later = req.sent_at() + Duration::from_millis(7);
        assert_eq!(req.complete(response, later, |_| {}), Some(Duration::from_millis(7)));
        assert!(!req.fail(ProbeError::Timeout(Duration::from_secs(1)), || {}));

        assert_eq!(req.outcome(), Outcome::Completed);
        assert_eq!(req.latency(), Some(Duration::from_millis(7)));
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn fail_then_complete_is_noop() {
        let (req, rx) = request();
        assert!(req.fail(ProbeError::Timeout(Duration::from_secs(1)), || {}));

        let response = StunMessage::binding_request_with_id(req.transaction_id());
        assert_eq!(req.complete(response, Instant::now(), |_| panic!("loser must not record")), None);

        assert_eq!(req.outcome(), Outcome::Failed);
        assert_eq!(req.latency(), None);
        assert!(matches!(rx.await.unwrap(), Err(ProbeError::Timeout(_))));
    }

    #[test]
    fn racing_transitions_resolve_once() {
        for _ in 0..200 {
            let (req, _rx) = request();
            let req = std::sync::Arc::new(req);
            let a = {
                let req = req.clone();
                std::thread::spawn(move || {
                    let msg = StunMessage::binding_request_with_id(req.transaction_id());
                    req.complete(msg, Instant::now(), |_| {}).is_some()
                })
            };
            let b = {
                let req = req.clone();
                std::thread::spawn(move || req.fail(ProbeError::Shutdown, || {}))
            };
            let won_a = a.join().unwrap();
            let won_b = b.join().unwrap();
            assert!(won_a ^ won_b, "exactly one transition must win");
        }
    }
}
