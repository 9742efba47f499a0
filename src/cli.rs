use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fvg-dashboard",
    about = "terminal dashboard for streamed fair value gap detections",
    version
)]
pub struct Args {
    /// Explicit WebSocket endpoint URL (overrides host/port detection)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Scanner host used when no explicit URL is given
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Scanner port used for plain (non-TLS) local endpoints
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect with TLS (wss://) when deriving the endpoint
    #[arg(long)]
    pub secure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Maximum number of automatic reconnection attempts
    #[arg(long, default_value = "10")]
    pub max_reconnects: u32,

    /// Liveness probe interval in seconds
    #[arg(long, default_value = "30")]
    pub probe_interval: u64,

    /// Output format: table, csv, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - suppress banner and status lines
    #[arg(long)]
    pub quiet: bool,

    /// Initial maximum distance filter in percent
    #[arg(long, default_value = "20")]
    pub max_distance: f64,

    /// Start without a distance limit
    #[arg(long)]
    pub no_distance_limit: bool,

    /// Initial type filter: all, bullish, bearish, touching, historical, new, tested,
    /// untested, extreme_orders, strong_orders, institutional, blocks, extreme_blocks,
    /// strong_blocks
    #[arg(long, default_value = "all")]
    pub type_filter: String,

    /// Comma separated timeframes to display, or "all"
    #[arg(long, default_value = "4h,12h,1d,1w")]
    pub timeframes: String,

    /// Maximum number of rows drawn per render pass
    #[arg(long, default_value = "100")]
    pub display_rows: usize,

    /// Maximum number of events kept in memory
    #[arg(long, default_value = "1000")]
    pub log_capacity: usize,
}
