/// file: src/events.rs
/// description: channels between the connection driver and the dashboard controller
use crate::types::{InboundMessage, OutboundMessage};
use std::time::Duration;
use tokio::sync::mpsc;

/// Emitted by the connection driver, consumed in order by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Starting,
    Connecting { url: String },
    Connected { connection_id: String },
    Inbound(InboundMessage),
    MalformedFrame { reason: String },
    Sent { kind: &'static str },
    SendDropped { kind: &'static str },
    ConnectionFailed(String),
    Reconnecting { attempt: u32, delay: Duration },
    HealthCheckFailed { reason: String },
    Disconnected,
    Offline,
    GaveUp { attempts: u32 },
    Stopping,
}

/// Requests sent from the controller to the connection driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Send(OutboundMessage),
    Reconnect,
    Visible,
    Online,
    Offline,
    Shutdown,
}

// Bounded so a stalled renderer applies backpressure to the socket reader.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;
const COMMAND_CHANNEL_CAPACITY: usize = 64;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;
pub type CommandSender = mpsc::Sender<DriverCommand>;
pub type CommandReceiver = mpsc::Receiver<DriverCommand>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

pub fn create_command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(COMMAND_CHANNEL_CAPACITY)
}
