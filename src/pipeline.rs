//! Bounded event log and the filter/sort/render pass.
//!
//! Every mutation (new event, stats, price, filter or sort change, clear)
//! ends with one full pass: filter the whole log, sort, derive display
//! statistics from the filtered set, truncate to the display cap and hand the
//! resulting view to the renderer. The pass reads nothing but pipeline state,
//! so running it twice without a mutation in between yields the same view.

use crate::{
    alerts::{Alert, AlertRules},
    config::PipelineConfig,
    error::DashboardError,
    normalize::normalize_event,
    render::Renderer,
    types::{
        BlockStrength, EventRecord, FvgKind, PriceUpdate, ScanStatus, Statistics, StrengthLevel,
        Timeframe, VolumeTier,
    },
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Arc,
};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Single-choice gap filter: a direction, a lifecycle state, an order
/// strength or a block class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    #[default]
    All,
    Bullish,
    Bearish,
    Touching,
    Historical,
    New,
    Tested,
    Untested,
    ExtremeOrders,
    StrongOrders,
    Institutional,
    Blocks,
    ExtremeBlocks,
    StrongBlocks,
}

impl TypeFilter {
    pub const NAMES: &'static str = "all, bullish, bearish, touching, historical, new, tested, \
untested, extreme_orders, strong_orders, institutional, blocks, extreme_blocks, strong_blocks";

    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw.trim().to_ascii_lowercase().replace('-', "_");
        match name.as_str() {
            "all" | "" => Some(TypeFilter::All),
            "bullish" | "bull" => Some(TypeFilter::Bullish),
            "bearish" | "bear" => Some(TypeFilter::Bearish),
            "touching" => Some(TypeFilter::Touching),
            "historical" => Some(TypeFilter::Historical),
            "new" => Some(TypeFilter::New),
            "tested" => Some(TypeFilter::Tested),
            "untested" => Some(TypeFilter::Untested),
            "extreme_orders" => Some(TypeFilter::ExtremeOrders),
            "strong_orders" => Some(TypeFilter::StrongOrders),
            "institutional" => Some(TypeFilter::Institutional),
            "blocks" => Some(TypeFilter::Blocks),
            "extreme_blocks" => Some(TypeFilter::ExtremeBlocks),
            "strong_blocks" => Some(TypeFilter::StrongBlocks),
            _ => None,
        }
    }

    pub fn accepts(&self, record: &EventRecord) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Bullish => record.kind == FvgKind::Bullish,
            TypeFilter::Bearish => record.kind == FvgKind::Bearish,
            TypeFilter::Touching => record.touched,
            TypeFilter::Historical => record.is_historical,
            TypeFilter::New => !record.is_historical,
            TypeFilter::Tested => record.tested,
            TypeFilter::Untested => !record.tested,
            TypeFilter::ExtremeOrders => record.strength_level() == StrengthLevel::Extreme,
            TypeFilter::StrongOrders => record.strength_level() == StrengthLevel::Strong,
            TypeFilter::Institutional => record.institutional,
            TypeFilter::Blocks => record.is_block_member,
            TypeFilter::ExtremeBlocks => {
                record.is_block_member && record.block_strength == BlockStrength::Extreme
            }
            TypeFilter::StrongBlocks => {
                record.is_block_member && record.block_strength == BlockStrength::Strong
            }
        }
    }
}

/// Operator-controlled filters. Each active predicate is ANDed with the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterState {
    pub type_filter: TypeFilter,
    /// `None` shows every timeframe, including ones the dashboard has no name for.
    pub timeframes: Option<BTreeSet<Timeframe>>,
    pub max_distance: Option<f64>,
    pub proximity_only: bool,
    pub blocks_only: bool,
    pub touched_only: bool,
    /// Records flagged `test_data` stay hidden unless this is set.
    pub show_test_data: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            type_filter: TypeFilter::All,
            timeframes: Some(Timeframe::DEFAULT_SET.into_iter().collect()),
            max_distance: Some(20.0),
            proximity_only: false,
            blocks_only: false,
            touched_only: false,
            show_test_data: false,
        }
    }
}

impl FilterState {
    pub fn matches(&self, record: &EventRecord) -> bool {
        if let Some(timeframes) = &self.timeframes
            && !timeframes.contains(&record.timeframe)
        {
            return false;
        }
        if !self.type_filter.accepts(record) {
            return false;
        }
        if record.test_data && !self.show_test_data {
            return false;
        }
        if let Some(max) = self.max_distance
            && record.distance_pct > max
        {
            return false;
        }
        (!self.proximity_only || record.within_proximity)
            && (!self.blocks_only || record.is_block_member)
            && (!self.touched_only || record.touched)
    }

    pub fn set_max_distance(&mut self, max: Option<f64>) -> Result<(), DashboardError> {
        if let Some(max) = max
            && (!max.is_finite() || max < 0.0)
        {
            return Err(DashboardError::InvalidConfig(format!(
                "max distance must be a non-negative number, got {max}"
            )));
        }
        self.max_distance = max;
        Ok(())
    }

    /// Accepts `all` or a comma separated list such as `4h,1d`.
    pub fn set_timeframes(&mut self, raw: &str) -> Result<(), DashboardError> {
        self.timeframes = parse_timeframes(raw)?;
        Ok(())
    }
}

pub fn parse_timeframes(raw: &str) -> Result<Option<BTreeSet<Timeframe>>, DashboardError> {
    if raw.trim().eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    let set: BTreeSet<Timeframe> = raw.split(',').filter_map(Timeframe::parse).collect();
    if set.is_empty() {
        return Err(DashboardError::InvalidConfig(format!(
            "no timeframes in '{raw}'"
        )));
    }
    Ok(Some(set))
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterChange {
    Type(TypeFilter),
    Timeframes(Option<BTreeSet<Timeframe>>),
    MaxDistance(Option<f64>),
    ProximityOnly(bool),
    BlocksOnly(bool),
    TouchedOnly(bool),
    ShowTestData(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Pair,
    Timeframe,
    Kind,
    Distance,
    Power,
    Volume,
    Unfilled,
    Time,
}

impl SortColumn {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pair" | "symbol" => Some(SortColumn::Pair),
            "tf" | "timeframe" => Some(SortColumn::Timeframe),
            "type" | "kind" => Some(SortColumn::Kind),
            "distance" | "distance_pct" => Some(SortColumn::Distance),
            "power" | "power_score" => Some(SortColumn::Power),
            "volume" | "volume_strength" => Some(SortColumn::Volume),
            "unfilled" | "unfilled_orders" | "orders" => Some(SortColumn::Unfilled),
            "time" | "timestamp" => Some(SortColumn::Time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortConfig {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            column: SortColumn::Distance,
            direction: SortDirection::Asc,
        }
    }
}

impl SortConfig {
    /// Same column flips direction; a new column starts ascending.
    pub fn select(&mut self, column: SortColumn) {
        if self.column == column {
            self.direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
        } else {
            self.column = column;
            self.direction = SortDirection::Asc;
        }
    }

    pub fn compare(&self, a: &EventRecord, b: &EventRecord) -> Ordering {
        let ordering = match self.column {
            SortColumn::Pair => a.pair.cmp(&b.pair),
            SortColumn::Timeframe => a
                .timeframe
                .rank()
                .cmp(&b.timeframe.rank())
                .then_with(|| a.timeframe.as_str().cmp(b.timeframe.as_str())),
            SortColumn::Kind => a.kind.as_str().cmp(b.kind.as_str()),
            SortColumn::Distance => a.distance_pct.total_cmp(&b.distance_pct),
            SortColumn::Power => a.power_score.cmp(&b.power_score),
            SortColumn::Volume => a.volume_strength.total_cmp(&b.volume_strength),
            SortColumn::Unfilled => a.unfilled_orders.total_cmp(&b.unfilled_orders),
            SortColumn::Time => a.timestamp.cmp(&b.timestamp),
        };
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Newest-first log with a hard capacity; the oldest records fall off the back.
#[derive(Debug, Clone)]
pub struct EventLog {
    records: VecDeque<Arc<EventRecord>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(4_096)),
            capacity: capacity.max(1),
        }
    }

    /// Inserts at the front and returns how many records were evicted.
    pub fn push(&mut self, record: Arc<EventRecord>) -> usize {
        self.records.push_front(record);
        let mut evicted = 0;
        while self.records.len() > self.capacity {
            self.records.pop_back();
            evicted += 1;
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EventRecord>> {
        self.records.iter()
    }

    pub fn newest(&self) -> Option<&Arc<EventRecord>> {
        self.records.front()
    }
}

/// Aggregates over the filtered set, recomputed on every pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayStats {
    pub total: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub touching: usize,
    pub near: usize,
    pub blocks: usize,
    pub institutional: usize,
    pub extreme_strength: usize,
    pub strong_strength: usize,
    pub medium_strength: usize,
    pub extreme_volume: usize,
    pub high_volume: usize,
    pub avg_power_score: u8,
    pub total_unfilled: f64,
}

impl DisplayStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut stats = DisplayStats::default();
        let mut power_sum = 0u64;

        for record in records {
            stats.total += 1;
            match record.kind {
                FvgKind::Bullish => stats.bullish += 1,
                FvgKind::Bearish => stats.bearish += 1,
                FvgKind::Unknown => {}
            }
            stats.touching += usize::from(record.touched);
            stats.near += usize::from(record.within_proximity);
            stats.blocks += usize::from(record.is_block_member);
            stats.institutional += usize::from(record.institutional);

            match record.strength_level() {
                StrengthLevel::Extreme => stats.extreme_strength += 1,
                StrengthLevel::Strong => stats.strong_strength += 1,
                StrengthLevel::Medium => stats.medium_strength += 1,
                StrengthLevel::Weak => {}
            }
            match record.volume_tier() {
                VolumeTier::Extreme => stats.extreme_volume += 1,
                VolumeTier::High => stats.high_volume += 1,
                _ => {}
            }

            power_sum += u64::from(record.power_score);
            stats.total_unfilled += record.unfilled_orders;
        }

        if stats.total > 0 {
            stats.avg_power_score = (power_sum as f64 / stats.total as f64).round() as u8;
        }
        stats
    }
}

/// Everything the renderer needs for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub rows: Vec<Arc<EventRecord>>,
    /// Records that passed the filter, before truncation.
    pub matched: usize,
    pub log_len: usize,
    pub stats: DisplayStats,
    pub server_stats: Option<Statistics>,
    pub scan: Option<ScanStatus>,
    /// Latest streamed price per pair shown in `rows`.
    pub live_prices: HashMap<String, f64>,
    pub filter: FilterState,
    pub sort: SortConfig,
}

impl DashboardView {
    pub fn live_price(&self, record: &EventRecord) -> f64 {
        self.live_prices
            .get(&record.pair)
            .copied()
            .unwrap_or(record.current_price)
    }
}

pub struct DataPipeline<R> {
    log: EventLog,
    filter: FilterState,
    sort: SortConfig,
    display_rows: usize,
    rules: AlertRules,
    server_stats: Option<Statistics>,
    scan: Option<ScanStatus>,
    live_prices: HashMap<String, f64>,
    paused: bool,
    renderer: R,
}

impl<R: Renderer> DataPipeline<R> {
    pub fn new(config: &PipelineConfig, renderer: R) -> Self {
        Self {
            log: EventLog::new(config.log_capacity),
            filter: config.initial_filter.clone(),
            sort: SortConfig::default(),
            display_rows: config.display_rows.max(1),
            rules: AlertRules::new(config.proximity_alert_pct),
            server_stats: None,
            scan: None,
            live_prices: HashMap::new(),
            paused: false,
            renderer,
        }
    }

    /// Normalizes and appends one detection, raises its alerts, then re-renders
    /// unless paused.
    pub fn ingest(&mut self, payload: &Value, received_at: DateTime<Utc>) -> Vec<Alert> {
        let record = Arc::new(normalize_event(payload, received_at));
        trace!(
            pair = %record.pair,
            timeframe = %record.timeframe,
            kind = record.kind.as_str(),
            distance = record.distance_pct,
            "normalized detection"
        );

        let alerts = self.rules.evaluate(&record);
        let evicted = self.log.push(record);
        if evicted > 0 {
            debug!("evicted {} record(s), log at capacity {}", evicted, self.log.capacity());
        }

        for alert in &alerts {
            self.renderer.alert(alert);
        }
        if !self.paused {
            self.refresh();
        }
        alerts
    }

    pub fn apply_stats(&mut self, stats: Statistics) {
        self.server_stats = Some(stats);
        self.refresh();
    }

    pub fn apply_price(&mut self, update: PriceUpdate) {
        self.live_prices.insert(update.pair, update.price);
        if !self.paused {
            self.refresh();
        }
    }

    pub fn apply_scan_status(&mut self, status: ScanStatus) {
        self.scan = Some(status);
        self.refresh();
    }

    pub fn set_filter(&mut self, change: FilterChange) {
        match change {
            FilterChange::Type(type_filter) => self.filter.type_filter = type_filter,
            FilterChange::Timeframes(timeframes) => self.filter.timeframes = timeframes,
            FilterChange::MaxDistance(max) => self.filter.max_distance = max,
            FilterChange::ProximityOnly(on) => self.filter.proximity_only = on,
            FilterChange::BlocksOnly(on) => self.filter.blocks_only = on,
            FilterChange::TouchedOnly(on) => self.filter.touched_only = on,
            FilterChange::ShowTestData(on) => self.filter.show_test_data = on,
        }
        self.refresh();
    }

    pub fn set_sort(&mut self, column: SortColumn) {
        self.sort.select(column);
        self.refresh();
    }

    /// Drops every record and streamed price; server statistics are kept.
    pub fn clear(&mut self) {
        self.log.clear();
        self.live_prices.clear();
        self.scan = None;
        self.refresh();
    }

    /// Keeps ingesting but stops redrawing for new data until `resume`.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.refresh();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Takes expired alerts off screen.
    pub fn dismiss_alerts(&mut self, now: Instant) {
        let dismissed = self.renderer.dismiss_expired(now);
        if dismissed > 0 && !self.paused {
            trace!("dismissed {} alert(s)", dismissed);
            self.refresh();
        }
    }

    pub fn view(&self) -> DashboardView {
        let mut matched: Vec<Arc<EventRecord>> = self
            .log
            .iter()
            .filter(|record| self.filter.matches(record))
            .cloned()
            .collect();

        matched.sort_by(|a, b| self.sort.compare(a, b));
        let stats = DisplayStats::from_records(matched.iter().map(|r| r.as_ref()));
        let matched_len = matched.len();
        matched.truncate(self.display_rows);

        let live_prices = matched
            .iter()
            .filter_map(|r| {
                self.live_prices
                    .get(&r.pair)
                    .map(|price| (r.pair.clone(), *price))
            })
            .collect();

        DashboardView {
            rows: matched,
            matched: matched_len,
            log_len: self.log.len(),
            stats,
            server_stats: self.server_stats.clone(),
            scan: self.scan.clone(),
            live_prices,
            filter: self.filter.clone(),
            sort: self.sort,
        }
    }

    pub fn refresh(&mut self) {
        let view = self.view();
        self.renderer.render(&view);
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
