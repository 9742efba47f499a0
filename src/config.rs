/// file: src/config.rs
/// description: runtime configuration built from CLI arguments, including endpoint selection
use crate::{
    cli::Args,
    client_state::Backoff,
    error::DashboardError,
    formatter::OutputFormat,
    pipeline::{FilterState, TypeFilter},
};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub websocket: WebSocketConfig,
    pub health: HealthConfig,
    pub pipeline: PipelineConfig,
    pub metrics: MetricsConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: Url,
    pub timeout: Duration,
    pub max_reconnects: u32,
    pub backoff: Backoff,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub probe_interval: Duration,
    /// Connection is considered dead when nothing arrived for this long.
    pub stale_after: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub log_capacity: usize,
    pub display_rows: usize,
    pub proximity_alert_pct: f64,
    pub alert_ttl: Duration,
    pub initial_filter: FilterState,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let probe_interval = Duration::from_secs(30);
        Self {
            probe_interval,
            stale_after: probe_interval * 3,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_capacity: 1_000,
            display_rows: 100,
            proximity_alert_pct: 0.5,
            alert_ttl: Duration::from_secs(5),
            initial_filter: FilterState::default(),
        }
    }
}

impl Config {
    /// Defaults for everything except the endpoint.
    pub fn new(url: Url) -> Self {
        Config {
            websocket: WebSocketConfig {
                url,
                timeout: Duration::from_secs(10),
                max_reconnects: 10,
                backoff: Backoff::default(),
            },
            health: HealthConfig::default(),
            pipeline: PipelineConfig::default(),
            metrics: MetricsConfig {
                enabled: false,
                port: 9090,
            },
            display: DisplayConfig {
                format: OutputFormat::Table,
                colored: true,
                quiet: false,
            },
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, DashboardError> {
        let url = resolve_endpoint(&EndpointHint {
            explicit: args.url.as_deref(),
            host: &args.host,
            port: args.port,
            secure: args.secure,
        })?;

        if args.timeout == 0 {
            return Err(DashboardError::InvalidConfig(
                "connection timeout must be at least one second".to_string(),
            ));
        }
        if args.probe_interval == 0 {
            return Err(DashboardError::InvalidConfig(
                "probe interval must be at least one second".to_string(),
            ));
        }
        if args.log_capacity == 0 || args.display_rows == 0 {
            return Err(DashboardError::InvalidConfig(
                "log capacity and display rows must be positive".to_string(),
            ));
        }

        let mut filter = FilterState {
            type_filter: TypeFilter::parse(&args.type_filter)
                .ok_or_else(|| DashboardError::InvalidConfig(format!(
                    "unknown type filter '{}'",
                    args.type_filter
                )))?,
            ..FilterState::default()
        };
        filter.set_max_distance((!args.no_distance_limit).then_some(args.max_distance))?;
        filter.set_timeframes(&args.timeframes)?;

        let probe_interval = Duration::from_secs(args.probe_interval);
        let mut config = Config::new(url);
        config.websocket.timeout = Duration::from_secs(args.timeout);
        config.websocket.max_reconnects = args.max_reconnects;
        config.health = HealthConfig {
            probe_interval,
            stale_after: probe_interval * 3,
        };
        config.pipeline.log_capacity = args.log_capacity;
        config.pipeline.display_rows = args.display_rows;
        config.pipeline.initial_filter = filter;
        config.metrics = MetricsConfig {
            enabled: args.metrics,
            port: args.metrics_port,
        };
        config.display = DisplayConfig {
            format: OutputFormat::from(args.format.as_str()),
            colored: !args.no_color,
            quiet: args.quiet,
        };
        Ok(config)
    }
}

/// Inputs for choosing the scanner endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHint<'a> {
    pub explicit: Option<&'a str>,
    pub host: &'a str,
    pub port: Option<u16>,
    pub secure: bool,
}

const DEFAULT_LOCAL_PORT: u16 = 8000;

/// An explicit URL wins; hosted deployments get `wss://host/ws`; local falls back to port 8000.
pub fn resolve_endpoint(hint: &EndpointHint<'_>) -> Result<Url, DashboardError> {
    if let Some(explicit) = hint.explicit.filter(|u| !u.trim().is_empty()) {
        debug!("using explicit websocket url {}", explicit);
        return Ok(Url::parse(explicit.trim())?);
    }

    let host = hint.host.trim();
    let url = if host.contains("railway.app") || hint.secure {
        format!("wss://{host}/ws")
    } else {
        format!("ws://{host}:{}/ws", hint.port.unwrap_or(DEFAULT_LOCAL_PORT))
    };
    debug!("derived websocket url {}", url);
    Ok(Url::parse(&url)?)
}
