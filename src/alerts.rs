/// file: src/alerts.rs
/// description: alert predicates for new detections and the auto-dismissing alert board
use crate::types::{EventRecord, FvgKind, Timeframe};
use serde::Serialize;
use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Touch,
    Proximity,
    Block,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Touch => "TOUCH",
            AlertKind::Proximity => "PROXIMITY",
            AlertKind::Block => "BLOCK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub pair: String,
    pub timeframe: Timeframe,
    pub direction: FvgKind,
    pub distance_pct: f64,
    pub message: String,
}

/// One alert per matching predicate: touch, close proximity, institutional block.
pub fn evaluate(record: &EventRecord, proximity_pct: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let alert = |kind: AlertKind, message: String| Alert {
        kind,
        pair: record.pair.clone(),
        timeframe: record.timeframe.clone(),
        direction: record.kind,
        distance_pct: record.distance_pct,
        message,
    };

    if record.touched {
        alerts.push(alert(
            AlertKind::Touch,
            format!(
                "{} {} {} gap touched",
                record.pair,
                record.timeframe,
                record.kind.as_str()
            ),
        ));
    }

    if record.within_proximity && record.distance_pct <= proximity_pct {
        alerts.push(alert(
            AlertKind::Proximity,
            format!(
                "{} {} price {:.2}% from {} gap",
                record.pair,
                record.timeframe,
                record.distance_pct,
                record.kind.as_str()
            ),
        ));
    }

    if record.is_block_member {
        let badge = if record.block_badge.is_empty() {
            "institutional block"
        } else {
            record.block_badge.as_str()
        };
        alerts.push(alert(
            AlertKind::Block,
            format!("{} {} {}", record.pair, record.timeframe, badge),
        ));
    }

    alerts
}

#[derive(Debug, Clone, Copy)]
pub struct AlertRules {
    proximity_pct: f64,
}

impl AlertRules {
    pub fn new(proximity_pct: f64) -> Self {
        Self { proximity_pct }
    }

    pub fn evaluate(&self, record: &EventRecord) -> Vec<Alert> {
        evaluate(record, self.proximity_pct)
    }
}

/// Transient alerts; each one disappears `ttl` after it was raised.
#[derive(Debug)]
pub struct AlertBoard {
    ttl: Duration,
    entries: VecDeque<(Instant, Alert)>,
}

impl AlertBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, alert: Alert, now: Instant) {
        self.entries.push_back((now, alert));
    }

    /// Drops expired alerts and returns how many were dismissed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        // entries are in raise order, so expired ones sit at the front
        while let Some((raised, _)) = self.entries.front() {
            if now.saturating_duration_since(*raised) < self.ttl {
                break;
            }
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// When the oldest alert goes away; `None` while the board is empty.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.front().map(|(raised, _)| *raised + self.ttl)
    }

    pub fn active(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter().map(|(_, alert)| alert)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_event;
    use chrono::Utc;
    use serde_json::json;

    fn record(payload: serde_json::Value) -> EventRecord {
        normalize_event(&payload, Utc::now())
    }

    #[test]
    fn test_each_predicate_fires_once() {
        let alerts = evaluate(
            &record(json!({
                "pair": "SOLUSDT",
                "tf": "1d",
                "fvg_type": "bearish",
                "is_touching": true,
                "within_proximity": true,
                "distance_pct": 0.2,
                "is_block_member": true,
                "block_badge": "BLOCK x3"
            })),
            0.5,
        );

        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AlertKind::Touch, AlertKind::Proximity, AlertKind::Block]
        );
        assert_eq!(alerts[2].message, "SOLUSDT 1d BLOCK x3");
        assert!(alerts.iter().all(|a| a.direction == FvgKind::Bearish));
    }

    #[test]
    fn test_proximity_threshold() {
        let near = record(json!({"within_proximity": true, "distance_pct": 0.5}));
        let far = record(json!({"within_proximity": true, "distance_pct": 0.51}));
        let flagless = record(json!({"distance_pct": 0.1}));

        assert_eq!(evaluate(&near, 0.5).len(), 1);
        assert!(evaluate(&far, 0.5).is_empty());
        assert!(evaluate(&flagless, 0.5).is_empty());
    }

    #[test]
    fn test_board_auto_dismisses() {
        let mut board = AlertBoard::new(Duration::from_secs(5));
        let alert = evaluate(&record(json!({"is_touching": true})), 0.5).remove(0);

        let start = Instant::now();
        board.push(alert.clone(), start);
        board.push(alert, start + Duration::from_secs(3));
        assert_eq!(board.len(), 2);

        assert_eq!(board.next_expiry(), Some(start + Duration::from_secs(5)));
        assert_eq!(board.prune(start + Duration::from_millis(4_999)), 0);
        assert_eq!(board.prune(start + Duration::from_secs(5)), 1);
        assert_eq!(board.active().count(), 1);
        assert_eq!(board.next_expiry(), Some(start + Duration::from_secs(8)));
        assert_eq!(board.prune(start + Duration::from_secs(8)), 1);
        assert!(board.is_empty());
        assert_eq!(board.next_expiry(), None);
    }
}
