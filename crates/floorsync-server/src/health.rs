//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Admitted sessions.
    pub connections: usize,
    /// Sessions that announced an identity.
    pub announced: usize,
}

/// Build a health response from live registry counts.
pub fn health_check(start_time: Instant, connections: usize, announced: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        announced,
    }
}
