/// file: src/types.rs
/// description: canonical event records and the wire messages exchanged with the FVG scanner
use crate::{error::DashboardError, normalize};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Chart timeframe a gap was detected on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    #[default]
    H4,
    H12,
    D1,
    W1,
    Other(String),
}

impl Timeframe {
    /// Timeframes shown when the operator has not narrowed the selection.
    pub const DEFAULT_SET: [Timeframe; 4] = [
        Timeframe::H4,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::W1,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let tf = raw.trim().to_ascii_lowercase();
        match tf.as_str() {
            "" => None,
            "4h" | "240" => Some(Timeframe::H4),
            "12h" | "720" => Some(Timeframe::H12),
            "1d" | "d" | "1440" => Some(Timeframe::D1),
            "1w" | "w" | "10080" => Some(Timeframe::W1),
            _ => Some(Timeframe::Other(tf)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Timeframe::H4 => "4h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
            Timeframe::Other(tf) => tf,
        }
    }

    /// Rank used when sorting by timeframe; unknown timeframes sort last.
    pub fn rank(&self) -> u8 {
        match self {
            Timeframe::H4 => 0,
            Timeframe::H12 => 1,
            Timeframe::D1 => 2,
            Timeframe::W1 => 3,
            Timeframe::Other(_) => 4,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum FvgKind {
    Bullish,
    Bearish,
    #[default]
    Unknown,
}

impl FvgKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bullish" | "bull" | "long" | "1" => Some(FvgKind::Bullish),
            "bearish" | "bear" | "short" | "-1" => Some(FvgKind::Bearish),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FvgKind::Bullish => "Bullish",
            FvgKind::Bearish => "Bearish",
            FvgKind::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockStrength {
    #[default]
    None,
    Weak,
    Medium,
    Strong,
    Extreme,
}

impl BlockStrength {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WEAK" => BlockStrength::Weak,
            "MEDIUM" => BlockStrength::Medium,
            "STRONG" => BlockStrength::Strong,
            "EXTREME" => BlockStrength::Extreme,
            _ => BlockStrength::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeTier {
    Low,
    Medium,
    High,
    Extreme,
}

impl VolumeTier {
    pub fn classify(volume: f64) -> Self {
        if volume >= 50_000_000.0 {
            VolumeTier::Extreme
        } else if volume >= 10_000_000.0 {
            VolumeTier::High
        } else if volume >= 1_000_000.0 {
            VolumeTier::Medium
        } else {
            VolumeTier::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VolumeTier::Low => "LOW",
            VolumeTier::Medium => "MED",
            VolumeTier::High => "HIGH",
            VolumeTier::Extreme => "EXTREME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrengthLevel {
    Weak,
    Medium,
    Strong,
    Extreme,
}

impl StrengthLevel {
    pub fn from_power(power_score: u8) -> Self {
        match power_score {
            80.. => StrengthLevel::Extreme,
            65..=79 => StrengthLevel::Strong,
            45..=64 => StrengthLevel::Medium,
            _ => StrengthLevel::Weak,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrengthLevel::Weak => "WEAK",
            StrengthLevel::Medium => "MEDIUM",
            StrengthLevel::Strong => "STRONG",
            StrengthLevel::Extreme => "EXTREME",
        }
    }
}

/// Canonical FVG detection. Built once by the normalizer and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub pair: String,
    pub timeframe: Timeframe,
    pub kind: FvgKind,
    pub gap_low: f64,
    pub gap_high: f64,
    pub gap_size: f64,
    pub current_price: f64,
    pub distance_pct: f64,
    pub within_proximity: bool,
    pub touched: bool,
    pub tested: bool,
    pub volume_strength: f64,
    pub volume_ratio: f64,
    pub unfilled_orders: f64,
    pub power_score: u8,
    pub institutional: bool,
    pub is_block_member: bool,
    pub block_badge: String,
    pub block_strength: BlockStrength,
    pub is_historical: bool,
    /// Synthetic record from a scanner test run.
    pub test_data: bool,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn volume_tier(&self) -> VolumeTier {
        VolumeTier::classify(self.volume_strength)
    }

    pub fn strength_level(&self) -> StrengthLevel {
        StrengthLevel::from_power(self.power_score)
    }
}

/// Aggregate counters published by the scanner. Replaced wholesale on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_pairs: u64,
    pub scanned_pairs: u64,
    pub bullish: u64,
    pub bearish: u64,
    pub institutional_blocks: u64,
    pub touched: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceUpdate {
    pub pair: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStatus {
    pub scanning: bool,
    pub scanned: u64,
    pub total: u64,
}

/// Wire layout a detection event arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionFormat {
    /// `fvg_data` frame; the `type` key is the message tag.
    Standard,
    /// `enhanced_fvg` frame, usually with a nested `data` object.
    Enhanced,
    /// Untagged frame where `type` carries the gap direction.
    Legacy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub format: DetectionFormat,
    pub payload: Value,
}

/// Inbound frame, discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Welcome(ServerHelloInfo),
    Heartbeat { count: Option<u64>, active_clients: Option<u64> },
    PriceUpdate(PriceUpdate),
    Detection(Detection),
    Stats(Statistics),
    ScanStatus(ScanStatus),
    SettingsUpdated(Value),
    Pong,
    /// Recognized tag but the payload lacks the fields needed to act on it.
    Incomplete { tag: String },
    Unknown { tag: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHelloInfo {
    pub server_version: Option<String>,
    pub environment: Option<String>,
    pub client_id: Option<String>,
}

impl InboundMessage {
    /// Decode a text frame. Fails only when the frame is not a JSON object.
    pub fn decode(text: &str) -> Result<Self, DashboardError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DashboardError::InvalidMessage(format!(
                "expected JSON object, got {}",
                json_kind(&value)
            )));
        }
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        match tag.as_str() {
            "welcome" | "connection_established" | "connection" => {
                InboundMessage::Welcome(normalize::server_hello(&value))
            }
            "heartbeat" => InboundMessage::Heartbeat {
                count: normalize::optional_count(&value, &["heartbeat_count", "count"]),
                active_clients: value
                    .get("server_stats")
                    .and_then(|stats| normalize::optional_count(stats, &["active_clients"])),
            },
            t @ ("price_update" | "live_price_update") => match normalize::price_update(&value) {
                Some(update) => InboundMessage::PriceUpdate(update),
                None => InboundMessage::Incomplete { tag: t.to_string() },
            },
            "fvg_data" => InboundMessage::Detection(Detection {
                format: DetectionFormat::Standard,
                payload: unwrap_data(value),
            }),
            "enhanced_fvg" => InboundMessage::Detection(Detection {
                format: DetectionFormat::Enhanced,
                payload: unwrap_data(value),
            }),
            "stats" | "stats_update" => InboundMessage::Stats(normalize::statistics(&value)),
            "scan_status" => InboundMessage::ScanStatus(normalize::scan_status(&value)),
            "settings_updated" => InboundMessage::SettingsUpdated(
                value
                    .get("settings")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            ),
            "pong" => InboundMessage::Pong,
            _ if looks_like_detection(&value) => InboundMessage::Detection(Detection {
                format: DetectionFormat::Legacy,
                payload: value,
            }),
            "" => InboundMessage::Unknown {
                tag: "<untagged>".to_string(),
            },
            other => InboundMessage::Unknown {
                tag: other.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Welcome(_) => "welcome",
            InboundMessage::Heartbeat { .. } => "heartbeat",
            InboundMessage::PriceUpdate(_) => "price_update",
            InboundMessage::Detection(_) => "detection",
            InboundMessage::Stats(_) => "stats",
            InboundMessage::ScanStatus(_) => "scan_status",
            InboundMessage::SettingsUpdated(_) => "settings_updated",
            InboundMessage::Pong => "pong",
            InboundMessage::Incomplete { .. } => "incomplete",
            InboundMessage::Unknown { .. } => "unknown",
        }
    }
}

// Detection frames sometimes wrap the event in `data`, sometimes inline it.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Object(_)) => data,
            Some(other) => {
                map.insert("data".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn looks_like_detection(value: &Value) -> bool {
    let has = |key: &str| value.get(key).is_some_and(|v| !v.is_null());
    has("pair") && (has("tf") || has("timeframe"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Settings object carried by `update_settings`.
pub type ScanSettings = Map<String, Value>;

/// Client-initiated control frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Ping,
    StartScan,
    StopScan,
    UpdateSettings { settings: ScanSettings },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, DashboardError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Ping => "ping",
            OutboundMessage::StartScan => "start_scan",
            OutboundMessage::StopScan => "stop_scan",
            OutboundMessage::UpdateSettings { .. } => "update_settings",
        }
    }
}
