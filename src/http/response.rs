//! Response rendering.
//!
//! # Responsibilities
//! - Render a health snapshot as the `/stun_status` JSON document
//! - Map overall health to the HTTP status code
//! - Mark every response `Connection: close`
//!
//! # Design Decisions
//! - Floating statistics are rendered as strings with four decimals
//! - The body is pretty-printed and keyed by the endpoint's `ip:port` form

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::fleet::HealthSnapshot;
use crate::probe::StatsView;

/// One endpoint's entry in the status document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StunStatusEntry {
    pub current_latency: String,
    pub current_failed: String,
    pub current_completed: String,
    pub total_latency: String,
    pub total_failed: String,
    pub total_completed: String,
    pub total_requests: u64,
}

impl From<&StatsView> for StunStatusEntry {
    fn from(stats: &StatsView) -> Self {
        Self {
            current_latency: format!("{:.4}", stats.current_latency_avg),
            current_failed: format!("{:.4}", stats.current_failed_pct),
            current_completed: format!("{:.4}", stats.current_completed_pct),
            total_latency: format!("{:.4}", stats.total_latency_avg),
            total_failed: format!("{:.4}", stats.total_failed_pct),
            total_completed: format!("{:.4}", stats.total_completed_pct),
            total_requests: stats.total_requests,
        }
    }
}

/// Pretty JSON body for `/stun_status`.
pub fn stun_status_body(snapshot: &HealthSnapshot) -> Result<String, serde_json::Error> {
    let entries: BTreeMap<String, StunStatusEntry> = snapshot
        .endpoints
        .iter()
        .map(|(endpoint, stats)| (endpoint.to_string(), StunStatusEntry::from(stats)))
        .collect();
    serde_json::to_string_pretty(&entries)
}

/// 200 when the fleet is healthy, 500 otherwise.
pub fn stun_status_code(snapshot: &HealthSnapshot) -> StatusCode {
    if snapshot.overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub fn stun_status_response(snapshot: &HealthSnapshot) -> Response {
    match stun_status_body(snapshot) {
        Ok(body) => closing(
            stun_status_code(snapshot),
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            Body::from(body),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render stun status");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Body-less response with `Connection: close`.
pub fn empty(status: StatusCode) -> Response {
    closing(status, [], Body::empty())
}

fn closing<const N: usize>(
    status: StatusCode,
    headers: [(header::HeaderName, HeaderValue); N],
    body: Body,
) -> Response {
    let mut response = (status, body).into_response();
    let map = response.headers_mut();
    for (name, value) in headers {
        map.insert(name, value);
    }
    map.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::time::Instant;

    fn snapshot(healthy: bool) -> HealthSnapshot {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "192.0.2.10:3478".parse::<SocketAddr>().unwrap(),
            StatsView {
                current_latency_avg: 12.345678,
                current_failed_pct: 0.1,
                current_completed_pct: 0.9,
                total_latency_avg: 10.0,
                total_failed_pct: 0.05,
                total_completed_pct: 0.95,
                total_requests: 40,
            },
        );
        HealthSnapshot {
            endpoints,
            overall_healthy: healthy,
            last_violation: None,
            generated_at: Instant::now(),
        }
    }

    #[test]
    fn entry_uses_four_decimals() {
        let snap = snapshot(true);
        let entry = StunStatusEntry::from(snap.endpoints.values().next().unwrap());
        assert_eq!(entry.current_latency, "12.3457");
        assert_eq!(entry.current_failed, "0.1000");
        assert_eq!(entry.total_completed, "0.9500");
        assert_eq!(entry.total_requests, 40);
    }

    #[test]
    fn body_is_keyed_by_endpoint() {
        let body = stun_status_body(&snapshot(true)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let entry = &json["192.0.2.10:3478"];
        assert_eq!(entry["current_completed"], "0.9000");
        assert_eq!(entry["total_requests"], 40);
        assert!(body.contains('\n'), "pretty printed");
    }

    #[test]
    fn status_code_follows_health() {
        assert_eq!(stun_status_code(&snapshot(true)), StatusCode::OK);
        assert_eq!(stun_status_code(&snapshot(false)), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn responses_close_connection() {
        let response = empty(StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        let response = stun_status_response(&snapshot(false));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
