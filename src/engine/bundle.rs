//! Per-tick result bundle handed to publishers.

use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;

use crate::alerts::AlertStats;
use crate::arbitrage::{CycleStrategy, RejectedSample, ValidatedOpportunity};
use crate::cache::CacheStats;
use crate::market::PriceSnapshot;

/// Whether a tick's results come from live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataSource {
    /// Fresh snapshot from the price feed.
    #[default]
    Live,
    /// Price feed failed; results are stale or empty and not authoritative.
    Degraded,
}

/// Detection figures for one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Tick sequence number, starting at 1.
    pub tick: u64,
    /// Wall-clock start of the tick.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Tick duration in milliseconds.
    pub duration_ms: f64,
    /// Tokens in the graph.
    pub vertex_count: usize,
    /// Directed edges in the graph.
    pub edge_count: usize,
    /// Quotes seen.
    pub total_quotes: usize,
    /// Quotes dropped as data errors.
    pub dropped_edges: usize,
    /// Percentage of usable quotes.
    pub data_quality_score: f64,
    /// Pairs quoted by two or more venues.
    pub pairs_scanned: usize,
    /// Largest cross-venue spread seen, in percent.
    pub max_observed_spread_pct: f64,
    /// Direct candidates that passed the scanner.
    pub direct_candidates: usize,
    /// Cycle candidates that passed the scanner.
    pub cycle_candidates: usize,
    /// Cycle search that ran.
    pub cycle_strategy: Option<CycleStrategy>,
    /// Closed cycles before filtering.
    pub raw_cycles: usize,
    /// Cycles collapsed by dedup.
    pub duplicates_collapsed: usize,
    /// Scanner rejections caused by implausible data.
    pub data_errors: usize,
    /// Net-profitable opportunities.
    pub profitable: usize,
    /// All rejections this tick.
    pub rejected: usize,
    /// Candidates dropped because evaluation failed.
    pub computation_errors: usize,
    /// Gas price used by the cost model, in gwei.
    pub gas_price_gwei: f64,
    /// True when the gas feed failed and the fallback price was used.
    pub gas_price_fallback: bool,
    /// Alerts emitted this tick.
    pub alerts_emitted: usize,
}

/// Everything a tick produced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBundle {
    /// Net-profitable opportunities, best first.
    pub opportunities: Vec<ValidatedOpportunity>,
    /// Bounded sample of rejections.
    pub rejected_sample: RejectedSample,
    /// Detection figures.
    pub scan_stats: ScanStats,
    /// Cache counters after the tick.
    pub cache_stats: CacheStats,
    /// Alert counters after the tick.
    pub alert_stats: AlertStats,
    /// Live or degraded.
    pub data_source: DataSource,
    /// Why the tick is degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl ResultBundle {
    /// Whether the results are authoritative.
    pub fn is_live(&self) -> bool {
        self.data_source == DataSource::Live
    }
}

/// Latest opportunities as stored in the cache for readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestOpportunities {
    /// Tick that produced them.
    pub tick: u64,
    /// Live or degraded.
    pub data_source: DataSource,
    /// Net-profitable opportunities, best first.
    pub opportunities: Vec<ValidatedOpportunity>,
}

/// Validated quotes of the last live tick, kept for degraded ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastGoodSnapshot {
    /// Start of the live tick that fetched the quotes.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    /// Quotes that passed graph validation.
    pub snapshot: PriceSnapshot,
}
