#![doc = include_str!("../docs/rustdoc.md")]

/// Alert predicates and the auto-dismissing alert board.
pub mod alerts;
/// Command-line argument definitions.
pub mod cli;
/// WebSocket connection driver and reconnect loop.
pub mod client;
/// Connection state machine, backoff and integrity counters.
pub mod client_state;
/// Operator commands read from stdin.
pub mod commands;
/// Runtime configuration model.
pub mod config;
/// Error types used across the crate.
pub mod error;
/// Channels between the driver and the controller.
pub mod events;
/// Terminal output formatters.
pub mod formatter;
/// Metrics and connection status reporting.
pub mod monitoring;
/// Payload normalization into canonical records.
pub mod normalize;
/// Bounded event log with filter, sort and render pass.
pub mod pipeline;
/// Render targets for dashboard views.
pub mod render;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Scanner wire messages and canonical record types.
pub mod types;
/// Dashboard controller.
pub mod ui;

/// Primary crate error type.
pub use error::DashboardError;
