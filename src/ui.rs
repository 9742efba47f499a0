/// file: src/ui.rs
/// description: dashboard controller; routes driver events into the pipeline and operator input to the driver
use crate::{
    client_state::SharedConnectionState,
    commands::{ControlCommand, HELP},
    events::{ClientEvent, CommandSender, DriverCommand, EventReceiver},
    formatter::Colors,
    monitoring::{ALERTS_COUNTER, FVG_EVENTS_COUNTER, LOG_SIZE_GAUGE},
    pipeline::DataPipeline,
    render::Renderer,
    types::{InboundMessage, OutboundMessage},
};
use chrono::Utc;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, trace, warn};

/// Lines typed by the operator, one command per line.
pub type OperatorReceiver = mpsc::Receiver<String>;

pub struct DashboardController<R> {
    event_receiver: EventReceiver,
    command_sender: CommandSender,
    state: SharedConnectionState,
    pipeline: DataPipeline<R>,
    show_banner: bool,
}

impl<R: Renderer> DashboardController<R> {
    pub fn new(
        event_receiver: EventReceiver,
        command_sender: CommandSender,
        state: SharedConnectionState,
        pipeline: DataPipeline<R>,
        show_banner: bool,
    ) -> Self {
        Self {
            event_receiver,
            command_sender,
            state,
            pipeline,
            show_banner,
        }
    }

    /// Runs until the driver reports it stopped or its event channel closes.
    pub async fn run(&mut self, mut operator: OperatorReceiver) {
        self.print_startup_banner();
        self.pipeline.refresh();

        let mut operator_open = true;
        loop {
            let expiry = self.pipeline.renderer().next_expiry();
            tokio::select! {
                event = self.event_receiver.recv() => match event {
                    Some(event) => {
                        if !self.handle_event(event).await {
                            break;
                        }
                    }
                    None => break,
                },
                line = operator.recv(), if operator_open => match line {
                    Some(line) => self.handle_line(&line).await,
                    None => {
                        debug!("Operator input closed");
                        operator_open = false;
                    }
                },
                _ = sleep_until(expiry.unwrap_or_else(Instant::now)), if expiry.is_some() => {
                    self.pipeline.dismiss_alerts(Instant::now());
                }
            }
        }
    }

    pub fn pipeline(&self) -> &DataPipeline<R> {
        &self.pipeline
    }

    async fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Starting => {
                info!("Client starting...");
            }
            ClientEvent::Connecting { url } => {
                self.status("CONNECTING", &url);
            }
            ClientEvent::Connected { connection_id } => {
                self.status("CONNECTED", &format!("ID: {}", connection_id));
            }
            ClientEvent::Inbound(message) => self.dispatch(message).await,
            ClientEvent::MalformedFrame { reason } => {
                debug!("Ignored malformed frame: {}", reason);
            }
            ClientEvent::Sent { kind } => {
                debug!("Sent {}", kind);
                match kind {
                    "start_scan" => self.status("SCANNING", "Scan start requested"),
                    "stop_scan" => self.status("SCANNING", "Scan stop requested"),
                    "update_settings" => self.status("SETTINGS", "Settings sent"),
                    _ => {}
                }
            }
            ClientEvent::SendDropped { kind } => {
                warn!("Dropped {} while not connected", kind);
                self.status("ERROR", &format!("Not connected, {} dropped", kind));
            }
            ClientEvent::ConnectionFailed(error) => {
                self.status("ERROR", &error);
            }
            ClientEvent::Reconnecting { attempt, delay } => {
                let max = self.state.lock().await.max_attempts;
                self.status(
                    "RECONNECTING",
                    &format!(
                        "Attempt {}/{} in {:.1}s...",
                        attempt,
                        max,
                        delay.as_secs_f64()
                    ),
                );
            }
            ClientEvent::HealthCheckFailed { reason } => {
                self.status("ERROR", &format!("Health check failed: {}", reason));
            }
            ClientEvent::Disconnected => {
                self.status("DISCONNECTED", "Connection closed");
            }
            ClientEvent::Offline => {
                self.status("OFFLINE", "Network offline, waiting for 'online'");
            }
            ClientEvent::GaveUp { attempts } => {
                self.status(
                    "FAILED",
                    &format!(
                        "Gave up after {} attempts, type 'reconnect' to try again",
                        attempts
                    ),
                );
            }
            ClientEvent::Stopping => {
                self.status("STOPPING", "Client shutting down");
                return false;
            }
        }

        true
    }

    async fn dispatch(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Welcome(hello) => {
                let version = hello.server_version.as_deref().unwrap_or("unknown");
                let environment = hello.environment.as_deref().unwrap_or("unknown");
                info!(version, environment, "Scanner handshake");
                self.status(
                    "CONNECTED",
                    &format!("Scanner v{} ({})", version, environment),
                );
            }
            InboundMessage::Heartbeat {
                count,
                active_clients,
            } => {
                trace!(?count, ?active_clients, "Heartbeat");
            }
            InboundMessage::PriceUpdate(update) => self.pipeline.apply_price(update),
            InboundMessage::Detection(detection) => {
                trace!(format = ?detection.format, "Detection");
                let alerts = self.pipeline.ingest(&detection.payload, Utc::now());
                FVG_EVENTS_COUNTER.increment(1);
                ALERTS_COUNTER.increment(alerts.len() as u64);
                LOG_SIZE_GAUGE.set(self.pipeline.len() as f64);
            }
            InboundMessage::Stats(stats) => self.pipeline.apply_stats(stats),
            InboundMessage::ScanStatus(status) => {
                self.state.lock().await.scanning = status.scanning;
                self.pipeline.apply_scan_status(status);
            }
            InboundMessage::SettingsUpdated(settings) => {
                self.status("SETTINGS", &format!("Scanner settings updated: {}", settings));
            }
            InboundMessage::Pong => trace!("Pong"),
            InboundMessage::Incomplete { tag } => {
                debug!("Ignored '{}' message without usable payload", tag);
            }
            InboundMessage::Unknown { tag } => {
                debug!("Ignored message type '{}'", tag);
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let command = match ControlCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                self.status("ERROR", &e.to_string());
                return;
            }
        };
        debug!("Operator command: {:?}", command);

        match command {
            ControlCommand::Reconnect => self.send_command(DriverCommand::Reconnect).await,
            ControlCommand::StartScan => {
                self.send_command(DriverCommand::Send(OutboundMessage::StartScan))
                    .await
            }
            ControlCommand::StopScan => {
                self.send_command(DriverCommand::Send(OutboundMessage::StopScan))
                    .await
            }
            ControlCommand::Ping => {
                self.send_command(DriverCommand::Send(OutboundMessage::Ping))
                    .await
            }
            ControlCommand::UpdateSettings(settings) => {
                self.send_command(DriverCommand::Send(OutboundMessage::UpdateSettings {
                    settings,
                }))
                .await
            }
            ControlCommand::Clear => {
                self.pipeline.clear();
                LOG_SIZE_GAUGE.set(0.0);
            }
            ControlCommand::Filter(change) => self.pipeline.set_filter(change),
            ControlCommand::Sort(column) => self.pipeline.set_sort(column),
            ControlCommand::Online => self.send_command(DriverCommand::Online).await,
            ControlCommand::Offline => self.send_command(DriverCommand::Offline).await,
            ControlCommand::Visible => self.send_command(DriverCommand::Visible).await,
            ControlCommand::Pause => {
                self.pipeline.pause();
                self.status("PAUSED", "Display frozen, events still recorded");
            }
            ControlCommand::Resume => {
                self.pipeline.resume();
                self.status("RESUMED", "Display live");
            }
            ControlCommand::Status => {
                let status = self.state.lock().await.snapshot().to_json();
                self.status("STATUS", &status.to_string());
            }
            ControlCommand::Help => self.status("HELP", HELP),
            ControlCommand::Quit => self.send_command(DriverCommand::Shutdown).await,
        }
    }

    async fn send_command(&self, command: DriverCommand) {
        if self.command_sender.send(command).await.is_err() {
            warn!("Connection driver is gone, command ignored");
        }
    }

    fn status(&mut self, status: &str, message: &str) {
        self.pipeline.renderer_mut().status(status, message);
    }

    fn print_startup_banner(&self) {
        if !self.show_banner {
            return;
        }

        println!();
        println!(
            "{}{}╔══════════════════════════════════════════════════════════════════════════════╗{}",
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            Colors::RESET
        );
        println!(
            "{}{}║                        FAIR VALUE GAP SCANNER DASHBOARD                      ║{}",
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            Colors::RESET
        );
        println!(
            "{}{}╠══════════════════════════════════════════════════════════════════════════════╣{}",
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            Colors::RESET
        );
        println!(
            "{}{}║{} Version: {}{:<8}{} │ Feed: {}{:<10}{} │ Type {}help{} for commands          {}{}║{}",
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            Colors::RESET,
            Colors::BRIGHT_GREEN,
            env!("CARGO_PKG_VERSION"),
            Colors::RESET,
            Colors::BRIGHT_YELLOW,
            "FVG",
            Colors::RESET,
            Colors::BRIGHT_MAGENTA,
            Colors::RESET,
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            Colors::RESET
        );
        println!(
            "{}{}╚══════════════════════════════════════════════════════════════════════════════╝{}",
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            Colors::RESET
        );
        println!();
    }
}
