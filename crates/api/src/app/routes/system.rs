//! Liveness probe (spec §6: `GET /ping`).

pub async fn ping() -> &'static str {
    "pong"
}
