use crate::{
    alerts::{Alert, AlertKind},
    pipeline::{DashboardView, SortDirection},
    types::{EventRecord, FvgKind},
};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    // Colors
    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const MAGENTA: &'static str = "\x1b[35m";
    pub const CYAN: &'static str = "\x1b[36m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    // Bright colors
    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";

    pub const CLEAR_SCREEN: &'static str = "\x1b[2J\x1b[H";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

/// `1.5M` style abbreviation with one decimal; values under a thousand print as-is.
pub fn abbreviate(n: f64) -> String {
    let magnitude = n.abs();
    if magnitude >= 1e9 {
        format!("{:.1}B", n / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.1}M", n / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.1}K", n / 1e3)
    } else {
        format!("{}", n)
    }
}

/// Four decimals at or above one, eight below.
pub fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.8}", price)
    }
}

pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(ts);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

/// Whole percent of pairs scanned, never above 100.
pub fn scan_percent(scanned: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (scanned as f64 / total as f64 * 100.0).clamp(0.0, 100.0) as u64
}

fn distance_color(distance_pct: f64) -> &'static str {
    if distance_pct == 0.0 {
        Colors::BRIGHT_MAGENTA
    } else if distance_pct < 1.0 {
        Colors::BRIGHT_RED
    } else if distance_pct < 5.0 {
        Colors::BRIGHT_YELLOW
    } else if distance_pct < 15.0 {
        Colors::BRIGHT_GREEN
    } else {
        Colors::GRAY
    }
}

fn kind_color(kind: FvgKind) -> &'static str {
    match kind {
        FvgKind::Bullish => Colors::BRIGHT_GREEN,
        FvgKind::Bearish => Colors::BRIGHT_RED,
        FvgKind::Unknown => Colors::WHITE,
    }
}

fn row_state(record: &EventRecord) -> &'static str {
    if record.touched {
        "TOUCHING"
    } else if record.tested {
        "TESTED"
    } else {
        "UNTESTED"
    }
}

const TABLE_TOP: &str = "┌──────────────┬──────┬─────────┬────────────────┬────────────────┬────────────────┬─────────┬──────────────┬──────────────────┬───────┬──────────┬──────────┐";
const TABLE_MID: &str = "├──────────────┼──────┼─────────┼────────────────┼────────────────┼────────────────┼─────────┼──────────────┼──────────────────┼───────┼──────────┼──────────┤";
const TABLE_BOTTOM: &str = "└──────────────┴──────┴─────────┴────────────────┴────────────────┴────────────────┴─────────┴──────────────┴──────────────────┴───────┴──────────┴──────────┘";

const CSV_HEADER: &str = "pair,timeframe,type,gap_low,gap_high,current_price,distance_pct,volume_strength,volume_tier,unfilled_orders,strength,power_score,touched,tested,block,institutional,timestamp";

/// Turns a `DashboardView` into one complete frame of text.
#[derive(Debug, Clone)]
pub struct ViewFormatter {
    format: OutputFormat,
    colored: bool,
}

impl ViewFormatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn format_view(&self, view: &DashboardView, now: DateTime<Utc>) -> String {
        match self.format {
            OutputFormat::Table => self.format_table(view, now),
            OutputFormat::Csv => self.format_csv(view),
            OutputFormat::Json => self.format_json(view, now),
            OutputFormat::Minimal => self.format_minimal(view),
        }
    }

    pub fn format_status(&self, status: &str, message: &str) -> String {
        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "SCANNING" => (Colors::BRIGHT_BLUE, "~"),
            "DISCONNECTED" | "FAILED" | "ERROR" => (Colors::BRIGHT_RED, "X"),
            "RECONNECTING" => (Colors::BRIGHT_YELLOW, ">"),
            "STOPPING" | "OFFLINE" => (Colors::BRIGHT_MAGENTA, "!"),
            "PAUSED" => (Colors::BRIGHT_YELLOW, "="),
            _ => (Colors::WHITE, "-"),
        };

        if self.colored {
            format!(
                "{}{}[{}]{} {} {}{}{}",
                Colors::BOLD,
                color,
                status,
                Colors::RESET,
                symbol,
                Colors::WHITE,
                message,
                Colors::RESET
            )
        } else {
            format!("[{}] {} {}", status, symbol, message)
        }
    }

    pub fn format_alert(&self, alert: &Alert) -> String {
        let color = match alert.kind {
            AlertKind::Touch => Colors::BRIGHT_MAGENTA,
            AlertKind::Proximity => Colors::BRIGHT_YELLOW,
            AlertKind::Block => Colors::BRIGHT_CYAN,
        };
        let tag = format!("[ALERT {}]", alert.kind.label());
        format!("{} ! {}", self.paint_bold(color, &tag), alert.message)
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn paint_bold(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}{}", Colors::BOLD, color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn format_table(&self, view: &DashboardView, now: DateTime<Utc>) -> String {
        let mut out = String::new();
        let stats = &view.stats;

        let scan = match (&view.scan, &view.server_stats) {
            (Some(scan), _) if scan.total > 0 => format!(
                "scan {}/{} ({}%){}",
                scan.scanned,
                scan.total,
                scan_percent(scan.scanned, scan.total),
                if scan.scanning { " running" } else { "" }
            ),
            (_, Some(server)) => format!(
                "pairs {}/{} | server bull {} bear {} blocks {} touched {}",
                server.scanned_pairs,
                server.total_pairs,
                server.bullish,
                server.bearish,
                server.institutional_blocks,
                server.touched
            ),
            _ => "waiting for scanner statistics".to_string(),
        };
        let _ = writeln!(out, "{} {}", self.paint_bold(Colors::BRIGHT_CYAN, "FVG DASHBOARD"), scan);

        let _ = writeln!(
            out,
            "{} {}  {} {}  {} {}  near {}  blocks {}  institutional {}",
            self.paint(Colors::BRIGHT_GREEN, "bullish"),
            stats.bullish,
            self.paint(Colors::BRIGHT_RED, "bearish"),
            stats.bearish,
            self.paint(Colors::BRIGHT_MAGENTA, "touching"),
            stats.touching,
            stats.near,
            stats.blocks,
            stats.institutional
        );
        let _ = writeln!(
            out,
            "strength extreme {} strong {} medium {}  volume extreme {} high {}  avg power {}  unfilled {}",
            stats.extreme_strength,
            stats.strong_strength,
            stats.medium_strength,
            stats.extreme_volume,
            stats.high_volume,
            stats.avg_power_score,
            abbreviate(stats.total_unfilled)
        );

        let timeframes = match &view.filter.timeframes {
            Some(set) => set.iter().map(|tf| tf.as_str()).collect::<Vec<_>>().join(","),
            None => "all".to_string(),
        };
        let distance = match view.filter.max_distance {
            Some(max) => format!("<={}%", max),
            None => "any".to_string(),
        };
        let direction = match view.sort.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        let _ = writeln!(
            out,
            "{}",
            self.paint(
                Colors::GRAY,
                &format!(
                    "type={:?} tf={} distance={}{}{}{} | sort {:?} {} | showing {} of {} (log {})",
                    view.filter.type_filter,
                    timeframes,
                    distance,
                    if view.filter.proximity_only { " proximity" } else { "" },
                    if view.filter.blocks_only { " blocks" } else { "" },
                    if view.filter.touched_only { " touched" } else { "" },
                    view.sort.column,
                    direction,
                    view.rows.len(),
                    view.matched,
                    view.log_len
                )
            )
        );

        let _ = writeln!(out, "{}", self.paint(Colors::GRAY, TABLE_TOP));
        let bar = self.paint(Colors::GRAY, "│");
        let _ = writeln!(
            out,
            "{bar} {:<12} {bar} {:<4} {bar} {:<7} {bar} {:<14} {bar} {:<14} {bar} {:<14} {bar} {:<7} {bar} {:<12} {bar} {:<16} {bar} {:<5} {bar} {:<8} {bar} {:<8} {bar}",
            "PAIR", "TF", "TYPE", "GAP LOW", "GAP HIGH", "PRICE", "DIST", "VOLUME", "ORDERS", "POWER", "STATE", "AGE",
        );
        let _ = writeln!(out, "{}", self.paint(Colors::GRAY, TABLE_MID));

        if view.rows.is_empty() {
            let _ = writeln!(out, "{bar} {:<178} {bar}", "no gaps match the current filters");
        }
        for record in &view.rows {
            let _ = writeln!(out, "{}", self.table_row(view, record, &bar, now));
        }

        let _ = writeln!(out, "{}", self.paint(Colors::GRAY, TABLE_BOTTOM));
        out
    }

    fn table_row(
        &self,
        view: &DashboardView,
        record: &EventRecord,
        bar: &str,
        now: DateTime<Utc>,
    ) -> String {
        let pair = if record.is_block_member {
            format!("{}*", record.pair)
        } else {
            record.pair.clone()
        };
        let volume = format!(
            "{} {}",
            abbreviate(record.volume_strength),
            record.volume_tier().label()
        );
        let orders = format!(
            "{} {}",
            abbreviate(record.unfilled_orders),
            record.strength_level().label()
        );

        format!(
            "{bar} {} {bar} {:<4} {bar} {} {bar} {:<14} {bar} {:<14} {bar} {:<14} {bar} {} {bar} {:<12} {bar} {:<16} {bar} {:<5} {bar} {:<8} {bar} {:<8} {bar}",
            self.paint_bold(Colors::WHITE, &format!("{:<12}", pair)),
            record.timeframe.as_str(),
            self.paint(kind_color(record.kind), &format!("{:<7}", record.kind.as_str())),
            format_price(record.gap_low),
            format_price(record.gap_high),
            format_price(view.live_price(record)),
            self.paint(
                distance_color(record.distance_pct),
                &format!("{:<7}", format!("{:.2}%", record.distance_pct))
            ),
            volume,
            orders,
            record.power_score,
            row_state(record),
            format_relative_time(record.timestamp, now),
        )
    }

    fn format_csv(&self, view: &DashboardView) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", CSV_HEADER);
        for record in &view.rows {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{:.2},{},{},{},{},{},{},{},{},{},{}",
                record.pair,
                record.timeframe,
                record.kind.as_str(),
                format_price(record.gap_low),
                format_price(record.gap_high),
                format_price(view.live_price(record)),
                record.distance_pct,
                record.volume_strength,
                record.volume_tier().label(),
                record.unfilled_orders,
                record.strength_level().label(),
                record.power_score,
                record.touched,
                record.tested,
                record.is_block_member,
                record.institutional,
                record.timestamp.to_rfc3339()
            );
        }
        out
    }

    fn format_json(&self, view: &DashboardView, now: DateTime<Utc>) -> String {
        let rows: Vec<serde_json::Value> = view
            .rows
            .iter()
            .map(|record| {
                let mut value = serde_json::to_value(record.as_ref()).unwrap_or_default();
                if let Some(map) = value.as_object_mut() {
                    map.insert("live_price".into(), view.live_price(record).into());
                    map.insert("volume_tier".into(), record.volume_tier().label().into());
                    map.insert("strength".into(), record.strength_level().label().into());
                }
                value
            })
            .collect();

        let json_obj = serde_json::json!({
            "timestamp": now,
            "matched": view.matched,
            "log_len": view.log_len,
            "stats": view.stats,
            "server_stats": view.server_stats,
            "scan": view.scan,
            "filter": view.filter,
            "sort": view.sort,
            "rows": rows,
        });

        let mut line = serde_json::to_string(&json_obj).unwrap_or_default();
        line.push('\n');
        line
    }

    fn format_minimal(&self, view: &DashboardView) -> String {
        let mut out = String::new();
        for record in &view.rows {
            let arrow = match record.kind {
                FvgKind::Bullish => "↗",
                FvgKind::Bearish => "↘",
                FvgKind::Unknown => "·",
            };
            let _ = writeln!(
                out,
                "{:<12} {:<4} {} {:>7} {} P{}{}",
                record.pair,
                record.timeframe.as_str(),
                self.paint(kind_color(record.kind), arrow),
                format!("{:.2}%", record.distance_pct),
                format_price(view.live_price(record)),
                record.power_score,
                if record.touched { " TOUCH" } else { "" }
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PipelineConfig,
        normalize::normalize_event,
        pipeline::DataPipeline,
        render::CaptureRenderer,
        types::InboundMessage,
    };
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sample_view() -> DashboardView {
        let mut pipeline =
            DataPipeline::new(&PipelineConfig::default(), CaptureRenderer::default());
        pipeline.ingest(
            &json!({
                "pair": "BTCUSDT", "tf": "4h", "type": "Bullish",
                "gap_low": 63_000, "gap_high": 63_500, "current_price": 64_000,
                "distance_pct": 0.78, "volume_strength": 25_000_000, "unfilled_orders": 1_500_000,
                "power_score": 72
            }),
            now() - Duration::minutes(5),
        );
        pipeline.ingest(
            &json!({
                "pair": "PEPEUSDT", "tf": "1d", "type": "Bearish",
                "gap_low": 0.0000081, "gap_high": 0.0000085, "current_price": 0.0000079,
                "distance_pct": 2.5, "is_touching": true
            }),
            now(),
        );
        pipeline.view()
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate(1_500_000.0), "1.5M");
        assert_eq!(abbreviate(2_300.0), "2.3K");
        assert_eq!(abbreviate(7_260_000_000.0), "7.3B");
        assert_eq!(abbreviate(500.0), "500");
        assert_eq!(abbreviate(999.5), "999.5");
        assert_eq!(abbreviate(0.0), "0");
    }

    #[test]
    fn test_scan_progress_is_capped() {
        assert_eq!(scan_percent(120, 400), 30);
        assert_eq!(scan_percent(500, 450), 100);
        assert_eq!(scan_percent(u64::MAX, 5), 100);
        assert_eq!(scan_percent(3, 0), 0);

        let mut pipeline =
            DataPipeline::new(&PipelineConfig::default(), CaptureRenderer::default());
        let frame = r#"{"type":"scan_status","scanned":1e30,"total":5}"#;
        let status = match InboundMessage::decode(frame).unwrap() {
            InboundMessage::ScanStatus(status) => status,
            other => panic!("unexpected {other:?}"),
        };
        pipeline.apply_scan_status(status);

        let frame =
            ViewFormatter::new(OutputFormat::Table, false).format_view(&pipeline.view(), now());
        assert!(frame.starts_with("FVG DASHBOARD scan 5/5 (100%)"));
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(64_000.5), "64000.5000");
        assert_eq!(format_price(1.0), "1.0000");
        assert_eq!(format_price(0.00001234), "0.00001234");
    }

    #[test]
    fn test_format_relative_time() {
        let now = now();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now + Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time(now - Duration::minutes(59), now), "59m ago");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d ago");
    }

    #[test]
    fn test_table_frame() {
        let formatter = ViewFormatter::new(OutputFormat::Table, false);
        let frame = formatter.format_view(&sample_view(), now());

        assert!(frame.starts_with("FVG DASHBOARD"));
        assert!(frame.contains("BTCUSDT"));
        assert!(frame.contains("64000.0000"));
        assert!(frame.contains("0.00000790"));
        assert!(frame.contains("25.0M HIGH"));
        assert!(frame.contains("1.5M STRONG"));
        assert!(frame.contains("5m ago"));
        assert!(frame.contains("TOUCHING"));
        assert!(!frame.contains('\x1b'));

        // closest gap first
        let btc = frame.find("BTCUSDT").unwrap();
        let pepe = frame.find("PEPEUSDT").unwrap();
        assert!(btc < pepe);
    }

    #[test]
    fn test_csv_and_minimal_frames() {
        let view = sample_view();

        let csv = ViewFormatter::new(OutputFormat::Csv, false).format_view(&view, now());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("BTCUSDT,4h,Bullish,63000.0000,63500.0000,64000.0000,0.78,"));

        let minimal = ViewFormatter::new(OutputFormat::Minimal, false).format_view(&view, now());
        assert_eq!(minimal.lines().count(), 2);
        assert!(minimal.contains("PEPEUSDT"));
        assert!(minimal.contains("TOUCH"));
    }

    #[test]
    fn test_json_frame() {
        let view = sample_view();
        let frame = ViewFormatter::new(OutputFormat::Json, true).format_view(&view, now());
        let parsed: serde_json::Value = serde_json::from_str(frame.trim()).unwrap();

        assert_eq!(parsed["matched"], 2);
        assert_eq!(parsed["stats"]["bullish"], 1);
        assert_eq!(parsed["rows"][0]["pair"], "BTCUSDT");
        assert_eq!(parsed["rows"][0]["timeframe"], "4h");
        assert_eq!(parsed["rows"][0]["volume_tier"], "HIGH");
    }

    #[test]
    fn test_status_and_alert_lines() {
        let plain = ViewFormatter::new(OutputFormat::Table, false);
        assert_eq!(
            plain.format_status("CONNECTED", "ID: abc"),
            "[CONNECTED] + ID: abc"
        );

        let record = normalize_event(&json!({"pair": "ETHUSDT", "is_touching": true}), now());
        let alert = crate::alerts::evaluate(&record, 0.5).remove(0);
        assert_eq!(
            plain.format_alert(&alert),
            "[ALERT TOUCH] ! ETHUSDT 4h Unknown gap touched"
        );

        let colored = ViewFormatter::new(OutputFormat::Table, true);
        assert!(colored.format_status("ERROR", "boom").contains(Colors::BRIGHT_RED));
    }
}
