//! Payload normalization.
//!
//! Scanner payloads are loosely shaped: field names changed across server
//! releases and numbers sometimes arrive as strings. Each canonical field has
//! one ordered list of candidate keys; the first key whose value coerces
//! cleanly wins, otherwise the field falls back to its default. Nothing in
//! here fails, so a record is always fully populated.

use crate::types::{
    BlockStrength, EventRecord, FvgKind, PriceUpdate, ScanStatus, ServerHelloInfo, Statistics,
    Timeframe,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

pub const UNKNOWN_PAIR: &str = "UNKNOWN";

const PAIR_KEYS: &[&str] = &["pair", "symbol"];
const TIMEFRAME_KEYS: &[&str] = &["timeframe", "tf", "interval"];
const KIND_KEYS: &[&str] = &["fvg_type", "direction", "kind", "type"];
const GAP_LOW_KEYS: &[&str] = &["gap_low", "bottom", "low"];
const GAP_HIGH_KEYS: &[&str] = &["gap_high", "top", "high"];
const PRICE_KEYS: &[&str] = &["current_price", "price", "close"];
const DISTANCE_KEYS: &[&str] = &["distance_pct", "distance"];
const PROXIMITY_KEYS: &[&str] = &["within_proximity", "in_proximity", "is_near"];
const TOUCHED_KEYS: &[&str] = &["is_touching", "touching", "touched"];
const TESTED_KEYS: &[&str] = &["tested", "mitigated"];
const VOLUME_KEYS: &[&str] = &["volume_strength", "volume", "vol"];
const VOLUME_RATIO_KEYS: &[&str] = &["volume_ratio", "vol_ratio"];
const UNFILLED_KEYS: &[&str] = &["unfilled_orders", "orders", "accumulated_orders"];
const POWER_KEYS: &[&str] = &["power_score", "score"];
const INSTITUTIONAL_KEYS: &[&str] = &["institutional_size", "institutional"];
const BLOCK_MEMBER_KEYS: &[&str] = &["is_block_member", "block"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "created_at"];

// Numeric epochs at or above this are milliseconds, below are seconds.
const MILLIS_THRESHOLD: f64 = 1e11;

/// Build the canonical record for one detection payload.
pub fn normalize_event(payload: &Value, received_at: DateTime<Utc>) -> EventRecord {
    let gap_low = number(payload, GAP_LOW_KEYS).unwrap_or(0.0);
    let gap_high = number(payload, GAP_HIGH_KEYS).unwrap_or(0.0);
    let current_price = number(payload, PRICE_KEYS).unwrap_or(0.0);

    let distance_pct = number(payload, DISTANCE_KEYS)
        .map(f64::abs)
        .or_else(|| distance_to_gap(current_price, gap_low, gap_high))
        .unwrap_or(0.0);

    let gap_size = number(payload, &["gap_size"])
        .map(f64::abs)
        .unwrap_or_else(|| (gap_high - gap_low).max(0.0));

    let power_score = number(payload, POWER_KEYS)
        .map(|score| score.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);

    EventRecord {
        pair: string(payload, PAIR_KEYS)
            .map(|p| p.to_ascii_uppercase())
            .unwrap_or_else(|| UNKNOWN_PAIR.to_string()),
        timeframe: lookup(payload, TIMEFRAME_KEYS, |v| {
            text(v).and_then(|s| Timeframe::parse(&s))
        })
        .unwrap_or_default(),
        kind: lookup(payload, KIND_KEYS, |v| text(v).and_then(|s| FvgKind::parse(&s)))
            .unwrap_or_default(),
        gap_low,
        gap_high,
        gap_size,
        current_price,
        distance_pct,
        within_proximity: flag(payload, PROXIMITY_KEYS),
        touched: flag(payload, TOUCHED_KEYS),
        tested: flag(payload, TESTED_KEYS),
        volume_strength: non_negative(payload, VOLUME_KEYS),
        volume_ratio: non_negative(payload, VOLUME_RATIO_KEYS),
        unfilled_orders: non_negative(payload, UNFILLED_KEYS),
        power_score,
        institutional: flag(payload, INSTITUTIONAL_KEYS),
        is_block_member: flag(payload, BLOCK_MEMBER_KEYS),
        block_badge: string(payload, &["block_badge"]).unwrap_or_default(),
        block_strength: string(payload, &["block_strength"])
            .map(|s| BlockStrength::parse(&s))
            .unwrap_or_default(),
        is_historical: flag(payload, &["is_historical", "historical"]),
        test_data: flag(payload, &["test_data", "is_test"]),
        timestamp: lookup(payload, TIMESTAMP_KEYS, timestamp).unwrap_or(received_at),
    }
}

/// Scanner-wide counters; accepts the counters inline or under `stats`/`data`.
pub fn statistics(value: &Value) -> Statistics {
    let body = ["stats", "data"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| v.is_object()))
        .unwrap_or(value);

    Statistics {
        total_pairs: count(body, &["total_pairs", "total", "total_symbols"]),
        scanned_pairs: count(body, &["scanned_pairs", "scanned", "scanned_symbols"]),
        bullish: count(body, &["bullish", "bullish_count", "bullish_fvgs"]),
        bearish: count(body, &["bearish", "bearish_count", "bearish_fvgs"]),
        institutional_blocks: count(body, &["institutional_blocks", "blocks", "block_count"]),
        touched: count(body, &["touched", "touching", "touching_fvgs"]),
    }
}

pub fn scan_status(value: &Value) -> ScanStatus {
    let scanning = lookup(value, &["scanning", "active", "is_scanning"], boolean)
        .or_else(|| {
            string(value, &["status"]).map(|status| {
                matches!(
                    status.to_ascii_lowercase().as_str(),
                    "running" | "started" | "scanning" | "active"
                )
            })
        })
        .unwrap_or(false);

    let total = count(value, &["total", "total_pairs"]);
    let scanned = count(value, &["scanned", "scanned_pairs"]);
    ScanStatus {
        scanning,
        // progress never runs past the pair count once one is known
        scanned: if total > 0 { scanned.min(total) } else { scanned },
        total,
    }
}

pub fn price_update(value: &Value) -> Option<PriceUpdate> {
    let pair = string(value, PAIR_KEYS)?.to_ascii_uppercase();
    let price = number(value, &["current_price", "price"])?;
    Some(PriceUpdate { pair, price })
}

/// Handshake details; each field is read on its own so one odd value drops only itself.
pub fn server_hello(value: &Value) -> ServerHelloInfo {
    ServerHelloInfo {
        server_version: string(value, &["server_version", "version"]),
        environment: string(value, &["environment"]),
        client_id: string(value, &["client_id"]),
    }
}

pub fn optional_count(payload: &Value, keys: &[&str]) -> Option<u64> {
    number(payload, keys).map(|n| n.round().max(0.0) as u64)
}

/// Percentage distance from `price` to the nearest gap edge, zero when inside.
pub fn distance_to_gap(price: f64, gap_low: f64, gap_high: f64) -> Option<f64> {
    if price <= 0.0 || (gap_low == 0.0 && gap_high == 0.0) {
        return None;
    }
    let (low, high) = if gap_low <= gap_high {
        (gap_low, gap_high)
    } else {
        (gap_high, gap_low)
    };
    let distance = if price < low {
        (low - price) / price * 100.0
    } else if price > high {
        (price - high) / price * 100.0
    } else {
        0.0
    };
    Some((distance.abs() * 100.0).round() / 100.0)
}

fn lookup<T>(payload: &Value, keys: &[&str], coerce: impl Fn(&Value) -> Option<T>) -> Option<T> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(coerce)
}

fn number(payload: &Value, keys: &[&str]) -> Option<f64> {
    lookup(payload, keys, finite)
}

fn non_negative(payload: &Value, keys: &[&str]) -> f64 {
    number(payload, keys).map(|n| n.max(0.0)).unwrap_or(0.0)
}

fn flag(payload: &Value, keys: &[&str]) -> bool {
    lookup(payload, keys, boolean).unwrap_or(false)
}

fn string(payload: &Value, keys: &[&str]) -> Option<String> {
    lookup(payload, keys, text)
}

fn count(payload: &Value, keys: &[&str]) -> u64 {
    optional_count(payload, keys).unwrap_or(0)
}

fn finite(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()).map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Value::String(s) = value {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Some(naive.and_utc());
        }
    }
    let epoch = finite(value)?;
    let millis = if epoch.abs() >= MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}
