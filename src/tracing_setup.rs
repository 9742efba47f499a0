// file: src/tracing_setup.rs
// description: structured logging configuration and tracing initialization
// reference: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

// stdout carries the dashboard, so logs go to stderr
pub fn setup_tracing(log_level: &str, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("fvg_dashboard={}", log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .with_span_list(true)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
