//! Time utilities and match timing defaults

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Frame rate configuration
pub const FRAMES_PER_SECOND: u64 = 50; // 50 fps
pub const FRAME_INTERVAL_MS: u64 = 1_000 / FRAMES_PER_SECOND;
/// A new product falls every second
pub const SPAWN_INTERVAL_MS: u64 = 1_000;
/// Match length announced to clients in `started`
pub const MATCH_DURATION_SECS: u64 = 30;
/// Time given to the terminal notice to flush before sockets are closed
pub const FINISH_GRACE_MS: u64 = 1_000;
/// Slow consumers are evicted after this write deadline
pub const WRITE_TIMEOUT_MS: u64 = 1_000;

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
