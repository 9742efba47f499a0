/// file: src/commands.rs
/// description: operator commands read line by line from stdin
use crate::{
    error::DashboardError,
    pipeline::{FilterChange, SortColumn, TypeFilter, parse_timeframes},
    types::ScanSettings,
};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Reconnect,
    StartScan,
    StopScan,
    Ping,
    UpdateSettings(ScanSettings),
    Clear,
    Filter(FilterChange),
    Sort(SortColumn),
    Online,
    Offline,
    Visible,
    Pause,
    Resume,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  reconnect | start | stop | ping | status | clear | help | quit
  settings key=value ...        push scanner settings
  type <filter>                 all, bullish, bearish, touching, historical, new,
                                tested, untested, extreme_orders, strong_orders,
                                institutional, blocks, extreme_blocks, strong_blocks
  tf 4h,12h,1d,1w|all           filter by timeframe
  distance <pct>|off            maximum distance to the gap
  proximity|blocks|touched|testdata on|off
  pause | resume                freeze the table while data keeps arriving
  sort pair|tf|type|distance|power|volume|unfilled|time
  online | offline | visible    simulate network and visibility changes";

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, DashboardError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(DashboardError::InvalidCommand("empty command".to_string()));
        };
        let args: Vec<&str> = words.collect();

        let command = match head.to_ascii_lowercase().as_str() {
            "reconnect" | "r" => ControlCommand::Reconnect,
            "start" => ControlCommand::StartScan,
            "stop" => ControlCommand::StopScan,
            "ping" => ControlCommand::Ping,
            "settings" | "set" => ControlCommand::UpdateSettings(parse_settings(&args)?),
            "clear" => ControlCommand::Clear,
            "type" => {
                let raw = single(head, &args)?;
                let filter = TypeFilter::parse(raw).ok_or_else(|| {
                    DashboardError::InvalidCommand(format!(
                        "unknown type filter '{raw}', expected one of {}",
                        TypeFilter::NAMES
                    ))
                })?;
                ControlCommand::Filter(FilterChange::Type(filter))
            }
            "tf" | "timeframes" => {
                let raw = args.join("");
                let timeframes = parse_timeframes(&raw)
                    .map_err(|e| DashboardError::InvalidCommand(e.to_string()))?;
                ControlCommand::Filter(FilterChange::Timeframes(timeframes))
            }
            "distance" | "dist" => {
                let raw = single(head, &args)?;
                let max = match raw.to_ascii_lowercase().as_str() {
                    "off" | "none" | "any" => None,
                    _ => Some(parse_distance(raw)?),
                };
                ControlCommand::Filter(FilterChange::MaxDistance(max))
            }
            "proximity" => ControlCommand::Filter(FilterChange::ProximityOnly(toggle(head, &args)?)),
            "blocks" => ControlCommand::Filter(FilterChange::BlocksOnly(toggle(head, &args)?)),
            "touched" => ControlCommand::Filter(FilterChange::TouchedOnly(toggle(head, &args)?)),
            "testdata" | "test_data" => {
                ControlCommand::Filter(FilterChange::ShowTestData(toggle(head, &args)?))
            }
            "pause" => ControlCommand::Pause,
            "resume" => ControlCommand::Resume,
            "sort" => {
                let raw = single(head, &args)?;
                let column = SortColumn::parse(raw).ok_or_else(|| {
                    DashboardError::InvalidCommand(format!("unknown sort column '{raw}'"))
                })?;
                ControlCommand::Sort(column)
            }
            "online" => ControlCommand::Online,
            "offline" => ControlCommand::Offline,
            "visible" => ControlCommand::Visible,
            "status" => ControlCommand::Status,
            "help" | "?" => ControlCommand::Help,
            "quit" | "exit" | "q" => ControlCommand::Quit,
            other => {
                return Err(DashboardError::InvalidCommand(format!(
                    "unknown command '{other}'"
                )));
            }
        };
        Ok(command)
    }
}

fn single<'a>(command: &str, args: &[&'a str]) -> Result<&'a str, DashboardError> {
    match args {
        [value] => Ok(*value),
        _ => Err(DashboardError::InvalidCommand(format!(
            "'{command}' takes exactly one argument"
        ))),
    }
}

fn toggle(command: &str, args: &[&str]) -> Result<bool, DashboardError> {
    match single(command, args)?.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(DashboardError::InvalidCommand(format!(
            "'{command}' expects on or off, got '{other}'"
        ))),
    }
}

fn parse_distance(raw: &str) -> Result<f64, DashboardError> {
    raw.trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| {
            DashboardError::InvalidCommand(format!("invalid distance '{raw}'"))
        })
}

// Values that read as JSON (numbers, booleans, arrays) keep their type; the rest are strings.
fn parse_settings(args: &[&str]) -> Result<ScanSettings, DashboardError> {
    if args.is_empty() {
        return Err(DashboardError::InvalidCommand(
            "settings needs at least one key=value pair".to_string(),
        ));
    }

    let mut settings = ScanSettings::new();
    for pair in args {
        let Some((key, raw)) = pair.split_once('=').filter(|(k, _)| !k.is_empty()) else {
            return Err(DashboardError::InvalidCommand(format!(
                "expected key=value, got '{pair}'"
            )));
        };
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        settings.insert(key.to_string(), value);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;
    use serde_json::json;

    #[test]
    fn test_connection_commands() {
        assert_eq!(ControlCommand::parse("reconnect").unwrap(), ControlCommand::Reconnect);
        assert_eq!(ControlCommand::parse("  START ").unwrap(), ControlCommand::StartScan);
        assert_eq!(ControlCommand::parse("stop").unwrap(), ControlCommand::StopScan);
        assert_eq!(ControlCommand::parse("ping").unwrap(), ControlCommand::Ping);
        assert_eq!(ControlCommand::parse("offline").unwrap(), ControlCommand::Offline);
        assert_eq!(ControlCommand::parse("q").unwrap(), ControlCommand::Quit);
        assert_eq!(ControlCommand::parse("pause").unwrap(), ControlCommand::Pause);
        assert_eq!(ControlCommand::parse("Resume").unwrap(), ControlCommand::Resume);
    }

    #[test]
    fn test_filter_commands() {
        assert_eq!(
            ControlCommand::parse("type bearish").unwrap(),
            ControlCommand::Filter(FilterChange::Type(TypeFilter::Bearish))
        );
        assert_eq!(
            ControlCommand::parse("tf 4h, 1d").unwrap(),
            ControlCommand::Filter(FilterChange::Timeframes(Some(
                [Timeframe::H4, Timeframe::D1].into_iter().collect()
            )))
        );
        assert_eq!(
            ControlCommand::parse("tf all").unwrap(),
            ControlCommand::Filter(FilterChange::Timeframes(None))
        );
        assert_eq!(
            ControlCommand::parse("distance 2.5%").unwrap(),
            ControlCommand::Filter(FilterChange::MaxDistance(Some(2.5)))
        );
        assert_eq!(
            ControlCommand::parse("distance off").unwrap(),
            ControlCommand::Filter(FilterChange::MaxDistance(None))
        );
        assert_eq!(
            ControlCommand::parse("touched on").unwrap(),
            ControlCommand::Filter(FilterChange::TouchedOnly(true))
        );
        assert_eq!(
            ControlCommand::parse("type extreme-blocks").unwrap(),
            ControlCommand::Filter(FilterChange::Type(TypeFilter::ExtremeBlocks))
        );
        assert_eq!(
            ControlCommand::parse("type untested").unwrap(),
            ControlCommand::Filter(FilterChange::Type(TypeFilter::Untested))
        );
        assert_eq!(
            ControlCommand::parse("testdata on").unwrap(),
            ControlCommand::Filter(FilterChange::ShowTestData(true))
        );
        assert_eq!(
            ControlCommand::parse("sort power").unwrap(),
            ControlCommand::Sort(SortColumn::Power)
        );
    }

    #[test]
    fn test_settings_values_keep_json_types() {
        let ControlCommand::UpdateSettings(settings) =
            ControlCommand::parse("settings min_volume=1000000 exchange=binance strict=true")
                .unwrap()
        else {
            panic!("expected settings command");
        };
        assert_eq!(settings["min_volume"], json!(1_000_000));
        assert_eq!(settings["exchange"], json!("binance"));
        assert_eq!(settings["strict"], json!(true));
    }

    #[test]
    fn test_invalid_commands() {
        for line in [
            "",
            "teleport",
            "type sideways",
            "distance -3",
            "distance",
            "blocks maybe",
            "sort colour",
            "tf ,",
            "settings",
            "settings =1",
            "settings novalue",
        ] {
            assert!(
                matches!(ControlCommand::parse(line), Err(DashboardError::InvalidCommand(_))),
                "{line:?} should be rejected"
            );
        }
    }
}
