//! `/health` endpoint body.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Rooms with at least one watcher.
    pub rooms: usize,
    /// Live watcher connections across all rooms.
    pub connections: usize,
}

pub fn health_check(start_time: Instant, rooms: usize, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        rooms,
        connections,
    }
}
