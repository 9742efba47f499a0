// file: src/client.rs
// description: WebSocket connection driver for the FVG scanner stream
// reference: https://docs.rs/tokio-tungstenite/latest/tokio_tungstenite/

use crate::{
    client_state::{ConnectionPhase, ReconnectDecision, SharedConnectionState},
    config::Config,
    error::DashboardError,
    events::{ClientEvent, CommandReceiver, DriverCommand, EventSender},
    monitoring::{
        CONNECTED_GAUGE, FRAMES_RECEIVED_COUNTER, MALFORMED_FRAMES_COUNTER, RECONNECT_COUNTER,
    },
    types::{InboundMessage, OutboundMessage},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpStream,
    time::{Instant, MissedTickBehavior, interval_at, sleep, timeout},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Driver step after a connection attempt, a session or a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Connect,
    Retry(Duration),
    /// Network reported offline; wait for `Online`.
    Suspend,
    /// Retries exhausted; only a manual reconnect leaves this.
    Park,
    Stop,
}

/// How an open session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Shutdown,
    Reconnect,
    Offline,
}

pub struct FvgWebSocketClient {
    pub config: Arc<Config>,
    event_sender: EventSender,
    commands: CommandReceiver,
    pub state: SharedConnectionState,
}

impl FvgWebSocketClient {
    pub fn new(
        config: Arc<Config>,
        event_sender: EventSender,
        commands: CommandReceiver,
        state: SharedConnectionState,
    ) -> Self {
        Self {
            config,
            event_sender,
            commands,
            state,
        }
    }

    /// Drives the connection until a shutdown is requested or the command channel closes.
    pub async fn run(&mut self) -> Result<(), DashboardError> {
        self.send_event(ClientEvent::Starting).await;
        self.state.lock().await.start();

        let mut next = Next::Connect;
        loop {
            next = match next {
                Next::Connect => self.connect_and_run().await,
                Next::Retry(delay) => self.wait(Some(delay)).await,
                Next::Suspend | Next::Park => self.wait(None).await,
                Next::Stop => break,
            };
            debug!("driver step: {:?}", next);
        }

        CONNECTED_GAUGE.set(0.0);
        self.send_event(ClientEvent::Stopping).await;
        Ok(())
    }

    async fn connect_and_run(&mut self) -> Next {
        let url = self.config.websocket.url.to_string();
        self.send_event(ClientEvent::Connecting { url: url.clone() })
            .await;

        let connecting = timeout(self.config.websocket.timeout, connect_async(url.as_str()));
        tokio::pin!(connecting);

        let attempt = loop {
            tokio::select! {
                attempt = &mut connecting => break attempt,
                command = self.commands.recv() => {
                    if let Some(next) = self.handle_idle_command(command).await {
                        return next;
                    }
                }
            }
        };

        let ws_stream = match attempt {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                error!("Failed to connect to WebSocket: {}", e);
                self.send_event(ClientEvent::ConnectionFailed(e.to_string()))
                    .await;
                return self.after_close().await;
            }
            Err(_) => {
                error!(
                    "Connection attempt timed out after {:?}",
                    self.config.websocket.timeout
                );
                self.send_event(ClientEvent::ConnectionFailed(
                    DashboardError::Timeout.to_string(),
                ))
                .await;
                return self.after_close().await;
            }
        };

        let connection_id = {
            let mut state = self.state.lock().await;
            state.on_open();
            state.connection_id.clone()
        };
        CONNECTED_GAUGE.set(1.0);
        info!(connection_id = %connection_id, "WebSocket connection established to {}", url);
        self.send_event(ClientEvent::Connected { connection_id })
            .await;

        let (mut write, mut read) = ws_stream.split();
        let end = self.handle_session(&mut write, &mut read).await;
        CONNECTED_GAUGE.set(0.0);

        match end {
            SessionEnd::Closed => {
                self.send_event(ClientEvent::Disconnected).await;
                self.after_close().await
            }
            SessionEnd::Shutdown => {
                close_quietly(&mut write).await;
                self.state.lock().await.shutdown();
                self.send_event(ClientEvent::Disconnected).await;
                Next::Stop
            }
            SessionEnd::Reconnect => {
                close_quietly(&mut write).await;
                self.state.lock().await.manual_reconnect();
                self.send_event(ClientEvent::Disconnected).await;
                Next::Connect
            }
            SessionEnd::Offline => {
                close_quietly(&mut write).await;
                self.state.lock().await.on_offline();
                self.send_event(ClientEvent::Offline).await;
                Next::Suspend
            }
        }
    }

    async fn handle_session(&mut self, write: &mut WsWriter, read: &mut WsReader) -> SessionEnd {
        info!("Starting message handling loop");

        let period = self.config.health.probe_interval;
        let stale_after = self.config.health.stale_after;
        let mut probe = interval_at(Instant::now() + period, period);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(message)) => {
                        if let Some(end) = self.handle_message(message).await {
                            return end;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket stream error: {}", e);
                        self.send_event(ClientEvent::ConnectionFailed(e.to_string()))
                            .await;
                        return SessionEnd::Closed;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return SessionEnd::Closed;
                    }
                },
                _ = probe.tick() => {
                    if let Err(reason) = self.probe(write, stale_after).await {
                        warn!("Liveness probe failed: {}", reason);
                        self.send_event(ClientEvent::HealthCheckFailed { reason })
                            .await;
                        return SessionEnd::Closed;
                    }
                }
                command = self.commands.recv() => match command {
                    None | Some(DriverCommand::Shutdown) => return SessionEnd::Shutdown,
                    Some(DriverCommand::Reconnect) => return SessionEnd::Reconnect,
                    Some(DriverCommand::Offline) => return SessionEnd::Offline,
                    Some(DriverCommand::Online) | Some(DriverCommand::Visible) => {
                        trace!("already connected");
                    }
                    Some(DriverCommand::Send(message)) => {
                        if let Err(e) = self.send_outbound(write, message).await {
                            error!("Failed to send message: {}", e);
                            return SessionEnd::Closed;
                        }
                    }
                },
            }
        }
    }

    async fn handle_message(&mut self, message: Message) -> Option<SessionEnd> {
        match message {
            Message::Text(text) => self.handle_text(text.as_str()).await,
            Message::Binary(data) => {
                debug!("Ignoring binary frame ({} bytes)", data.len());
                self.state.lock().await.record_message();
            }
            Message::Ping(_) | Message::Pong(_) => {
                trace!("Received control frame");
                self.state.lock().await.record_message();
            }
            Message::Close(frame) => {
                info!("WebSocket closed by server: {:?}", frame);
                return Some(SessionEnd::Closed);
            }
            Message::Frame(_) => {}
        }
        None
    }

    async fn handle_text(&mut self, text: &str) {
        FRAMES_RECEIVED_COUNTER.increment(1);
        self.state.lock().await.record_message();

        match InboundMessage::decode(text) {
            Ok(message) => {
                trace!(kind = message.kind(), "Received message");
                self.send_event(ClientEvent::Inbound(message)).await;
            }
            Err(e) => self.reject_frame(e.to_string()).await,
        }
    }

    async fn reject_frame(&mut self, reason: String) {
        MALFORMED_FRAMES_COUNTER.increment(1);
        self.state.lock().await.record_malformed();
        warn!("Dropping malformed frame: {}", reason);
        self.send_event(ClientEvent::MalformedFrame { reason }).await;
    }

    /// Stale when nothing arrived within `stale_after`; otherwise sends a ping.
    async fn probe(&mut self, write: &mut WsWriter, stale_after: Duration) -> Result<(), String> {
        let silent_for = self
            .state
            .lock()
            .await
            .last_message_time
            .map(|at| at.elapsed());

        if let Some(silent_for) = silent_for
            && silent_for > stale_after
        {
            return Err(format!("no frames for {}ms", silent_for.as_millis()));
        }

        write_message(write, &OutboundMessage::Ping)
            .await
            .map_err(|e| format!("ping failed: {e}"))?;
        trace!("Sent liveness ping");
        Ok(())
    }

    async fn send_outbound(
        &mut self,
        write: &mut WsWriter,
        message: OutboundMessage,
    ) -> Result<(), DashboardError> {
        let kind = message.kind();
        if !self.state.lock().await.can_send() {
            self.send_event(ClientEvent::SendDropped { kind }).await;
            return Ok(());
        }

        write_message(write, &message).await?;
        match message {
            OutboundMessage::StartScan => self.state.lock().await.scanning = true,
            OutboundMessage::StopScan => self.state.lock().await.scanning = false,
            _ => {}
        }
        debug!("Sent {}", kind);
        self.send_event(ClientEvent::Sent { kind }).await;
        Ok(())
    }

    /// Waits out a retry delay (or indefinitely) while answering commands.
    async fn wait(&mut self, delay: Option<Duration>) -> Next {
        let mut armed = delay.is_some();
        let timer = sleep(delay.unwrap_or_default());
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer, if armed => {
                    armed = false;
                    let mut state = self.state.lock().await;
                    state.begin_retry();
                    if state.phase == ConnectionPhase::Connecting {
                        return Next::Connect;
                    }
                    debug!("retry timer fired while {:?}, waiting", state.phase);
                }
                command = self.commands.recv() => {
                    if let Some(next) = self.handle_idle_command(command).await {
                        return next;
                    }
                }
            }
        }
    }

    /// Commands that arrive while no session is open.
    async fn handle_idle_command(&mut self, command: Option<DriverCommand>) -> Option<Next> {
        match command {
            None | Some(DriverCommand::Shutdown) => {
                self.state.lock().await.shutdown();
                Some(Next::Stop)
            }
            Some(DriverCommand::Reconnect) => {
                info!("Manual reconnect requested");
                self.state.lock().await.manual_reconnect();
                Some(Next::Connect)
            }
            Some(DriverCommand::Offline) => {
                self.state.lock().await.on_offline();
                self.send_event(ClientEvent::Offline).await;
                Some(Next::Suspend)
            }
            Some(DriverCommand::Online) => {
                let wake = self.state.lock().await.on_online();
                wake.then_some(Next::Connect)
            }
            Some(DriverCommand::Visible) => {
                let wake = self.state.lock().await.on_visible();
                wake.then_some(Next::Connect)
            }
            Some(DriverCommand::Send(message)) => {
                debug!("Dropping {} while disconnected", message.kind());
                self.send_event(ClientEvent::SendDropped {
                    kind: message.kind(),
                })
                .await;
                None
            }
        }
    }

    async fn after_close(&mut self) -> Next {
        let (decision, attempts) = {
            let mut state = self.state.lock().await;
            let decision = state.on_close();
            (decision, state.reconnect_attempts)
        };

        match decision {
            ReconnectDecision::Retry { attempt, delay } => {
                RECONNECT_COUNTER.increment(1);
                info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                self.send_event(ClientEvent::Reconnecting { attempt, delay })
                    .await;
                Next::Retry(delay)
            }
            ReconnectDecision::GiveUp => {
                error!("Giving up after {} reconnection attempts", attempts);
                self.send_event(ClientEvent::GaveUp { attempts }).await;
                Next::Park
            }
            ReconnectDecision::Stopped => Next::Stop,
        }
    }

    async fn send_event(&self, event: ClientEvent) {
        if self.event_sender.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn write_message(
    write: &mut WsWriter,
    message: &OutboundMessage,
) -> Result<(), DashboardError> {
    let json = message.to_json()?;
    write.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn close_quietly(write: &mut WsWriter) {
    if let Err(e) = write.close().await {
        debug!("Close handshake failed: {}", e);
    }
}
