use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}
