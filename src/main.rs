use anyhow::Result;
use clap::Parser;
use fvg_dashboard::{
    cli::Args,
    client::FvgWebSocketClient,
    client_state::{ConnectionState, shared},
    config::Config,
    events::{DriverCommand, create_command_channel, create_event_channel},
    monitoring::setup_metrics,
    pipeline::DataPipeline,
    render::TerminalRenderer,
    tracing_setup::setup_tracing,
    ui::DashboardController,
};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup tracing/logging
    setup_tracing(&args.log_level, args.json_logs)?;

    // wss:// endpoints need a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        "Starting FVG Dashboard v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(Config::from_args(&args)?);
    info!("Scanner endpoint: {}", config.websocket.url);

    // Setup metrics server if enabled
    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let (event_sender, event_receiver) = create_event_channel();
    let (command_sender, command_receiver) = create_command_channel();
    let state = shared(ConnectionState::new(
        config.websocket.max_reconnects,
        config.websocket.backoff,
    ));

    let mut client = FvgWebSocketClient::new(
        config.clone(),
        event_sender,
        command_receiver,
        state.clone(),
    );
    let driver = tokio::spawn(async move {
        if let Err(e) = client.run().await {
            error!("WebSocket client error: {}", e);
        }
    });

    let (line_sender, line_receiver) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_sender.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading operator input: {}", e);
                    break;
                }
            }
        }
    });

    let shutdown_sender = command_sender.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            let _ = shutdown_sender.send(DriverCommand::Shutdown).await;
        }
    });

    let renderer = TerminalRenderer::stdout(
        config.display.format,
        config.display.colored,
        config.display.quiet,
        config.pipeline.alert_ttl,
    );
    let pipeline = DataPipeline::new(&config.pipeline, renderer);
    let show_banner = !config.display.quiet && config.display.colored;
    let mut controller =
        DashboardController::new(event_receiver, command_sender, state, pipeline, show_banner);

    info!("Dashboard started. Type 'help' for commands, Ctrl+C to exit...");
    controller.run(line_receiver).await;

    if let Err(e) = driver.await {
        error!("Connection driver panicked: {}", e);
    }

    info!("Dashboard stopped successfully");
    Ok(())
}
