//! Drives the connection client against a loopback WebSocket server.

use futures_util::{SinkExt, StreamExt};
use fvg_dashboard::{
    DashboardError,
    client::FvgWebSocketClient,
    client_state::{ConnectionPhase, ConnectionState, SharedConnectionState, shared},
    config::Config,
    events::{
        ClientEvent, CommandSender, DriverCommand, EventReceiver, create_command_channel,
        create_event_channel,
    },
    types::{DetectionFormat, InboundMessage, OutboundMessage},
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    events: EventReceiver,
    commands: CommandSender,
    state: SharedConnectionState,
    driver: JoinHandle<Result<(), DashboardError>>,
}

impl Harness {
    fn start(config: Config) -> Self {
        let config = Arc::new(config);
        let (event_sender, events) = create_event_channel();
        let (commands, command_receiver) = create_command_channel();
        let state = shared(ConnectionState::new(
            config.websocket.max_reconnects,
            config.websocket.backoff,
        ));

        let mut client =
            FvgWebSocketClient::new(config, event_sender, command_receiver, state.clone());
        let driver = tokio::spawn(async move { client.run().await });

        Self {
            events,
            commands,
            state,
            driver,
        }
    }

    async fn next(&mut self) -> ClientEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("event channel closed")
    }

    /// Skips events until one matches.
    async fn until(&mut self, wanted: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = self.next().await;
            if wanted(&event) {
                return event;
            }
        }
    }

    async fn command(&self, command: DriverCommand) {
        self.commands.send(command).await.unwrap();
    }

    async fn shutdown(mut self) -> SharedConnectionState {
        self.command(DriverCommand::Shutdown).await;
        self.until(|e| *e == ClientEvent::Stopping).await;
        timeout(WAIT, self.driver)
            .await
            .expect("driver did not stop")
            .unwrap()
            .unwrap();
        self.state
    }
}

async fn bind() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("ws://{}/ws", listener.local_addr().unwrap())).unwrap();
    (listener, url)
}

fn fast_config(url: Url) -> Config {
    let mut config = Config::new(url);
    config.websocket.timeout = Duration::from_secs(2);
    config.websocket.backoff.floor = Duration::from_millis(20);
    config.websocket.backoff.ceiling = Duration::from_millis(200);
    config.health.probe_interval = Duration::from_secs(60);
    config.health.stale_after = Duration::from_secs(180);
    config
}

fn is_connected(event: &ClientEvent) -> bool {
    matches!(event, ClientEvent::Connected { .. })
}

#[tokio::test]
async fn test_frames_are_decoded_and_malformed_ones_dropped() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in [
            r#"{"type":"welcome","server_version":"2.0.1","environment":"production"}"#,
            r#"{"type":"fvg_data","pair":"BTCUSDT","tf":"4h","fvg_type":"Bullish","distance_pct":0.4}"#,
            "this is not json",
            "[1, 2, 3]",
        ] {
            ws.send(Message::text(frame.to_string())).await.unwrap();
        }

        // first text frame from the client
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                return text.as_str().to_string();
            }
        }
        String::new()
    });

    let mut harness = Harness::start(fast_config(url.clone()));
    assert_eq!(harness.next().await, ClientEvent::Starting);
    assert_eq!(
        harness.next().await,
        ClientEvent::Connecting {
            url: url.to_string()
        }
    );
    assert!(is_connected(&harness.next().await));

    match harness.next().await {
        ClientEvent::Inbound(InboundMessage::Welcome(hello)) => {
            assert_eq!(hello.server_version.as_deref(), Some("2.0.1"));
        }
        other => panic!("expected welcome, got {other:?}"),
    }
    match harness.next().await {
        ClientEvent::Inbound(InboundMessage::Detection(detection)) => {
            assert_eq!(detection.format, DetectionFormat::Standard);
            assert_eq!(detection.payload["pair"], "BTCUSDT");
        }
        other => panic!("expected detection, got {other:?}"),
    }
    assert!(matches!(harness.next().await, ClientEvent::MalformedFrame { .. }));
    assert!(matches!(harness.next().await, ClientEvent::MalformedFrame { .. }));

    {
        let state = harness.state.lock().await;
        assert_eq!(state.phase, ConnectionPhase::Open);
        assert_eq!(state.total_messages_received, 4);
        assert_eq!(state.malformed_frames, 2);
    }

    harness
        .command(DriverCommand::Send(OutboundMessage::StartScan))
        .await;
    assert_eq!(
        harness.next().await,
        ClientEvent::Sent { kind: "start_scan" }
    );
    let received = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received, r#"{"type":"start_scan"}"#);
    assert!(harness.state.lock().await.scanning);

    let state = harness.shutdown().await;
    let state = state.lock().await;
    assert!(state.stopped);
    assert!(!state.connected);
}

#[tokio::test]
async fn test_binary_frames_are_ignored() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let detection = br#"{"type":"fvg_data","pair":"BTCUSDT","tf":"4h"}"#;
        ws.send(Message::binary(detection.to_vec())).await.unwrap();
        ws.send(Message::text(r#"{"type":"welcome"}"#.to_string()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut harness = Harness::start(fast_config(url));
    harness.until(is_connected).await;

    // the binary detection never reaches the controller
    assert!(matches!(
        harness.next().await,
        ClientEvent::Inbound(InboundMessage::Welcome(_))
    ));
    {
        let state = harness.state.lock().await;
        assert_eq!(state.total_messages_received, 2);
        assert_eq!(state.malformed_frames, 0);
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        // first session is dropped right after the handshake
        let (stream, _) = listener.accept().await.unwrap();
        drop(accept_async(stream).await.unwrap());

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(r#"{"type":"welcome"}"#.to_string()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut harness = Harness::start(fast_config(url));
    harness.until(is_connected).await;

    let reconnecting = harness
        .until(|e| matches!(e, ClientEvent::Reconnecting { .. }))
        .await;
    assert_eq!(
        reconnecting,
        ClientEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(20),
        }
    );

    harness.until(is_connected).await;
    assert!(matches!(
        harness.next().await,
        ClientEvent::Inbound(InboundMessage::Welcome(_))
    ));
    {
        let state = harness.state.lock().await;
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.reconnect_delay, Duration::from_millis(20));
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_gives_up_then_manual_reconnect() {
    // grab a free port, then close it so every attempt is refused
    let (listener, url) = bind().await;
    drop(listener);

    let mut config = fast_config(url);
    config.websocket.max_reconnects = 2;
    config.websocket.backoff.floor = Duration::from_millis(5);
    let mut harness = Harness::start(config);

    let mut delays = Vec::new();
    let gave_up = loop {
        match harness.next().await {
            ClientEvent::Reconnecting { attempt, delay } => delays.push((attempt, delay)),
            event @ ClientEvent::GaveUp { .. } => break event,
            _ => {}
        }
    };
    assert_eq!(gave_up, ClientEvent::GaveUp { attempts: 2 });
    assert_eq!(
        delays,
        vec![
            (1, Duration::from_millis(5)),
            (2, Duration::from_millis(8)),
        ]
    );
    assert_eq!(harness.state.lock().await.phase, ConnectionPhase::Failed);

    // neither network nor visibility changes leave Failed
    harness.command(DriverCommand::Online).await;
    harness.command(DriverCommand::Visible).await;
    harness
        .command(DriverCommand::Send(OutboundMessage::Ping))
        .await;
    assert_eq!(
        harness.next().await,
        ClientEvent::SendDropped { kind: "ping" }
    );
    assert_eq!(harness.state.lock().await.phase, ConnectionPhase::Failed);

    harness.command(DriverCommand::Reconnect).await;
    assert!(matches!(
        harness.next().await,
        ClientEvent::Connecting { .. }
    ));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_probe_pings_and_detects_stale_connection() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut texts = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                texts.push(text.as_str().to_string());
            }
        }
        texts
    });

    let mut config = fast_config(url);
    config.health.probe_interval = Duration::from_millis(50);
    config.health.stale_after = Duration::from_millis(120);
    let mut harness = Harness::start(config);
    harness.until(is_connected).await;

    // the server never speaks, so the connection goes stale after a couple of pings
    let failed = harness
        .until(|e| matches!(e, ClientEvent::HealthCheckFailed { .. }))
        .await;
    assert!(matches!(
        failed,
        ClientEvent::HealthCheckFailed { reason } if reason.starts_with("no frames")
    ));
    assert_eq!(harness.next().await, ClientEvent::Disconnected);
    assert!(matches!(
        harness.next().await,
        ClientEvent::Reconnecting { attempt: 1, .. }
    ));

    harness.shutdown().await;
    let texts = timeout(WAIT, server).await.unwrap().unwrap();
    assert!(!texts.is_empty());
    assert!(texts.iter().all(|t| t == r#"{"type":"ping"}"#));
}

#[tokio::test]
async fn test_offline_suspends_until_online() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                if let Ok(mut ws) = accept_async(stream).await {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    let mut harness = Harness::start(fast_config(url));
    harness.until(is_connected).await;

    harness.command(DriverCommand::Offline).await;
    assert_eq!(harness.next().await, ClientEvent::Offline);
    {
        let state = harness.state.lock().await;
        assert_eq!(state.phase, ConnectionPhase::Closed);
        assert!(state.offline);
    }

    // nothing reconnects while offline
    assert!(
        timeout(Duration::from_millis(150), harness.events.recv())
            .await
            .is_err()
    );

    harness.command(DriverCommand::Online).await;
    assert!(matches!(
        harness.next().await,
        ClientEvent::Connecting { .. }
    ));
    harness.until(is_connected).await;
    assert!(!harness.state.lock().await.offline);

    harness.shutdown().await;
}
