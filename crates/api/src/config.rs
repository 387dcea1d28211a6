//! Process configuration, read from environment variables with documented
//! defaults (spec §3's ambient config concern; spec.md itself leaves these
//! out of core scope).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// How long the projection dispatcher sleeps when a tick claims nothing (spec §4.F).
    pub projection_poll_interval: Duration,
    /// Events claimed per projection dispatcher tick (spec §4.F).
    pub projection_batch_size: usize,
    /// Request-scoped deadline for command dispatch (spec §5).
    pub request_deadline: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8080"),
            projection_poll_interval: Duration::from_secs(env_u64("PROJECTION_POLL_INTERVAL_SECS", 5)),
            projection_batch_size: env_u64("PROJECTION_BATCH_SIZE", 100) as usize,
            request_deadline: Duration::from_secs(env_u64("REQUEST_DEADLINE_SECS", 5)),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
