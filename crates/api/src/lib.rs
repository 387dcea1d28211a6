//! HTTP ingress adapter (spec §4.E) and process wiring for the canister
//! service binary.

pub mod app;
pub mod config;
pub mod telemetry;
