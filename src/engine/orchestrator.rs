//! Refresh orchestrator: the single loop driving every tick.
//!
//! A tick fetches the price snapshot and gas price concurrently, rebuilds
//! the market graph, runs both scanners and the validator, dispatches
//! alerts, refreshes the cache and publishes the result bundle. Nothing a
//! single quote, candidate or collaborator does can abort the loop.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::bundle::{DataSource, LastGoodSnapshot, LatestOpportunities, ResultBundle, ScanStats};
use super::execution::{ExecutionDescriptor, ExecutionSink};
use super::publish::{LogPublisher, Publisher};
use crate::alerts::{AlertDispatcher, AlertEvent, MarketStats};
use crate::arbitrage::{
    find_cycles, scan_direct, validate_all, CostModel, RejectedSample, ScannerConfig,
    ValidatedOpportunity,
};
use crate::cache::{Namespace, OpportunityCache};
use crate::config::Config;
use crate::feed::{wei_to_gwei, with_timeout, GasPriceFeed, PriceFeed};
use crate::market::{BuildReport, GraphConfig, MarketGraph, PriceSnapshot, VenueQuote};
use crate::metrics;

/// `marketSnapshots` key of the last snapshot fetched live.
pub const LAST_GOOD_SNAPSHOT_KEY: &str = "snapshot:last-good";

/// `marketSnapshots` key of the latest scan stats.
pub const LATEST_SCAN_STATS_KEY: &str = "scan-stats:latest";

/// `opportunities` key of the latest profitable set.
pub const LATEST_OPPORTUNITIES_KEY: &str = "latest";

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Graph construction settings.
    pub graph: GraphConfig,
    /// Scanner thresholds.
    pub scanner: ScannerConfig,
    /// Cost model.
    pub cost_model: CostModel,
    /// Per-call collaborator timeout.
    pub fetch_timeout: Duration,
    /// Time between tick starts.
    pub refresh_interval: Duration,
    /// Gas price used when the gas collaborator fails, in gwei.
    pub fallback_gas_price_gwei: f64,
    /// Rejections retained per tick.
    pub rejected_sample_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            scanner: ScannerConfig::default(),
            cost_model: CostModel::default(),
            fetch_timeout: Duration::from_secs(15),
            refresh_interval: Duration::from_secs(30),
            fallback_gas_price_gwei: 20.0,
            rejected_sample_size: 25,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            graph: GraphConfig::from(config),
            scanner: ScannerConfig::from(config),
            cost_model: CostModel::from(config),
            fetch_timeout: config.fetch_timeout(),
            refresh_interval: config.refresh_interval(),
            fallback_gas_price_gwei: config.fallback_gas_price_gwei,
            rejected_sample_size: config.rejected_sample_size,
        }
    }
}

/// Result of running detection over one snapshot.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Graph the scanners ran on.
    pub graph: MarketGraph,
    /// Graph build summary.
    pub report: BuildReport,
    /// Net-profitable opportunities, best first.
    pub opportunities: Vec<ValidatedOpportunity>,
    /// Bounded sample of every rejection.
    pub rejected_sample: RejectedSample,
    /// Detection figures. Tick-level fields are left for the caller.
    pub scan_stats: ScanStats,
}

impl Evaluation {
    fn empty(rejected_sample_size: usize, gas_price_gwei: f64) -> Self {
        Self {
            rejected_sample: RejectedSample::with_capacity(rejected_sample_size),
            scan_stats: ScanStats {
                gas_price_gwei,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Aggregate figures the alert dispatcher looks at.
    pub fn market_stats(&self) -> MarketStats {
        MarketStats {
            data_quality_score: self.scan_stats.data_quality_score,
            max_observed_spread_pct: self.scan_stats.max_observed_spread_pct,
            opportunity_count: self.opportunities.len(),
        }
    }
}

/// Build the graph, scan, and validate one snapshot. Pure apart from logging and metrics.
pub fn evaluate_snapshot(
    snapshot: &PriceSnapshot,
    gas_price_gwei: f64,
    config: &OrchestratorConfig,
) -> Evaluation {
    let (graph, report) = MarketGraph::build(snapshot, &config.graph);

    let direct = scan_direct(&graph, &config.scanner);
    let cycles = find_cycles(&graph, &config.scanner);

    let direct_candidates = direct.outcome.candidates.len();
    let cycle_candidates = cycles.outcome.candidates.len();
    metrics::add_candidates("direct", direct_candidates);
    metrics::add_candidates("triangular", cycle_candidates);

    let mut candidates = direct.outcome.candidates;
    candidates.extend(cycles.outcome.candidates);
    let validation = validate_all(&candidates, gas_price_gwei, &config.cost_model);
    metrics::add_profitable(validation.profitable.len());
    metrics::add_computation_errors(validation.errors);

    let mut rejected_sample = RejectedSample::with_capacity(config.rejected_sample_size);
    rejected_sample.extend(direct.outcome.rejected);
    rejected_sample.extend(cycles.outcome.rejected);
    rejected_sample.extend(validation.rejected);

    let scan_stats = ScanStats {
        vertex_count: report.vertex_count,
        edge_count: report.edge_count,
        total_quotes: report.total_quotes,
        dropped_edges: report.dropped_edges,
        data_quality_score: report.data_quality_score(),
        pairs_scanned: direct.pairs_scanned,
        max_observed_spread_pct: direct.max_spread_pct,
        direct_candidates,
        cycle_candidates,
        cycle_strategy: Some(cycles.strategy),
        raw_cycles: cycles.raw_cycles,
        duplicates_collapsed: cycles.duplicates_collapsed,
        data_errors: direct.outcome.data_errors + cycles.outcome.data_errors,
        profitable: validation.profitable.len(),
        rejected: rejected_sample.total,
        computation_errors: validation.errors,
        gas_price_gwei,
        ..Default::default()
    };

    Evaluation {
        graph,
        report,
        opportunities: validation.profitable,
        rejected_sample,
        scan_stats,
    }
}

/// Drives ticks against the collaborators and owns the per-process state.
pub struct RefreshOrchestrator {
    config: OrchestratorConfig,
    price_feed: Arc<dyn PriceFeed>,
    gas_feed: Arc<dyn GasPriceFeed>,
    cache: Arc<OpportunityCache>,
    alerts: AlertDispatcher,
    publisher: Arc<dyn Publisher>,
    execution: Option<Arc<dyn ExecutionSink>>,
    ticks: u64,
}

impl RefreshOrchestrator {
    /// Create an orchestrator that publishes to the log only.
    pub fn new(
        config: OrchestratorConfig,
        price_feed: Arc<dyn PriceFeed>,
        gas_feed: Arc<dyn GasPriceFeed>,
        cache: Arc<OpportunityCache>,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            config,
            price_feed,
            gas_feed,
            cache,
            alerts,
            publisher: Arc::new(LogPublisher),
            execution: None,
            ticks: 0,
        }
    }

    /// Replace the downstream publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Hand profitable live opportunities to an execution sink.
    pub fn with_execution_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.execution = Some(sink);
        self
    }

    /// Shared cache handle.
    pub fn cache(&self) -> &Arc<OpportunityCache> {
        &self.cache
    }

    /// Alert dispatcher state.
    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Run one tick. Always produces a bundle.
    #[instrument(skip(self), fields(tick = self.ticks + 1))]
    pub async fn tick(&mut self) -> Arc<ResultBundle> {
        let timer = metrics::timer_tick();
        self.ticks += 1;
        metrics::inc_ticks();
        let started_at = OffsetDateTime::now_utc();

        let timeout = self.config.fetch_timeout;
        let (snapshot, gas) = tokio::join!(
            with_timeout(self.price_feed.name(), timeout, self.price_feed.fetch_snapshot()),
            with_timeout(self.gas_feed.name(), timeout, self.gas_feed.gas_price_wei()),
        );

        let (gas_price_gwei, gas_price_fallback) = match gas {
            Ok(wei) => (wei_to_gwei(wei), false),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback_gwei = self.config.fallback_gas_price_gwei,
                    "Gas price unavailable, using fallback"
                );
                metrics::inc_fetch_failures("gas");
                (self.config.fallback_gas_price_gwei, true)
            }
        };

        let (snapshot, data_source, degraded_reason) = match snapshot {
            Ok(snapshot) => (
                Some(LastGoodSnapshot {
                    observed_at: started_at,
                    snapshot,
                }),
                DataSource::Live,
                None,
            ),
            Err(e) => {
                metrics::inc_fetch_failures("price");
                metrics::inc_degraded_ticks();
                let cached = self
                    .cache
                    .get_as::<LastGoodSnapshot>(Namespace::MarketSnapshots, LAST_GOOD_SNAPSHOT_KEY);
                let reason = match &cached {
                    Some(last) => format!(
                        "price feed failed: {}; using last good snapshot from {}",
                        e, last.observed_at
                    ),
                    None => {
                        metrics::inc_tick_failures();
                        format!("price feed failed: {}; no cached snapshot", e)
                    }
                };
                warn!(reason = %reason, "Tick running degraded");
                (cached, DataSource::Degraded, Some(reason))
            }
        };

        let mut evaluation = match &snapshot {
            Some(last) => {
                let mut evaluation = evaluate_snapshot(&last.snapshot, gas_price_gwei, &self.config);
                // opportunities are as old as the quotes they came from
                for opp in &mut evaluation.opportunities {
                    opp.detected_at = last.observed_at;
                }
                evaluation
            }
            None => Evaluation::empty(self.config.rejected_sample_size, gas_price_gwei),
        };
        metrics::set_data_quality(evaluation.scan_stats.data_quality_score);

        let live = data_source == DataSource::Live;

        // stale data never produces opportunity alerts
        let alert_input: &[ValidatedOpportunity] = if live {
            &evaluation.opportunities
        } else {
            &[]
        };
        let alerts = self.alerts.process(alert_input, &evaluation.market_stats());

        let mut scan_stats = std::mem::take(&mut evaluation.scan_stats);
        scan_stats.tick = self.ticks;
        scan_stats.started_at = Some(started_at);
        scan_stats.gas_price_fallback = gas_price_fallback;
        scan_stats.alerts_emitted = alerts.len();

        if live {
            self.refresh_market_cache(&evaluation.graph, started_at);
            self.hand_off(&evaluation.opportunities);
        }
        scan_stats.duration_ms = timer.elapsed_ms();
        self.refresh_opportunity_cache(data_source, &evaluation.opportunities, &scan_stats);

        let bundle = Arc::new(ResultBundle {
            opportunities: evaluation.opportunities,
            rejected_sample: evaluation.rejected_sample,
            scan_stats,
            cache_stats: self.cache.stats(),
            alert_stats: self.alerts.stats(),
            data_source,
            degraded_reason,
        });

        self.publish(Arc::clone(&bundle), &alerts).await;

        debug!(
            data_source = %bundle.data_source,
            profitable = bundle.opportunities.len(),
            alerts = alerts.len(),
            "Tick finished"
        );
        bundle
    }

    /// Cache per-pair prices, per-pool quotes and the validated snapshot.
    ///
    /// The fallback snapshot is rebuilt from graph edges so it never carries
    /// quotes that failed validation.
    fn refresh_market_cache(&self, graph: &MarketGraph, observed_at: OffsetDateTime) {
        let mut last_good = PriceSnapshot::new();

        for pair in graph.pairs() {
            let mut rates = serde_json::Map::with_capacity(pair.edges.len());
            for &idx in &pair.edges {
                let edge = graph.edge(idx);
                last_good.insert(
                    pair.pair.clone(),
                    edge.venue.clone(),
                    VenueQuote::with_metadata(edge.rate, edge.liquidity_usd, edge.volume_usd),
                );
                rates.insert(edge.venue.clone(), serde_json::json!(edge.rate));
                self.cache.set_value(
                    Namespace::Pools,
                    &format!("{}:{}", edge.venue, pair.pair),
                    serde_json::json!({
                        "pair": pair.pair,
                        "venue": edge.venue,
                        "rate": edge.rate,
                        "liquidityUSD": edge.liquidity_usd,
                        "volumeUSD": edge.volume_usd,
                    }),
                );
            }
            self.cache
                .set_value(Namespace::Prices, &pair.pair, serde_json::Value::Object(rates));
        }

        if last_good.is_empty() {
            debug!("No valid quotes this tick, keeping previous fallback snapshot");
            return;
        }
        let last_good = LastGoodSnapshot {
            observed_at,
            snapshot: last_good,
        };
        if let Err(e) = self
            .cache
            .set(Namespace::MarketSnapshots, LAST_GOOD_SNAPSHOT_KEY, &last_good)
        {
            warn!(error = %e, "Failed to cache snapshot");
        }
    }

    fn refresh_opportunity_cache(
        &self,
        data_source: DataSource,
        opportunities: &[ValidatedOpportunity],
        scan_stats: &ScanStats,
    ) {
        let latest = LatestOpportunities {
            tick: self.ticks,
            data_source,
            opportunities: opportunities.to_vec(),
        };
        let mut results = vec![
            self.cache
                .set(Namespace::Opportunities, LATEST_OPPORTUNITIES_KEY, &latest),
            self.cache
                .set(Namespace::MarketSnapshots, LATEST_SCAN_STATS_KEY, scan_stats),
        ];
        // per-id entries carry no data source, so only live results refresh them
        if data_source == DataSource::Live {
            results.extend(
                opportunities
                    .iter()
                    .map(|opp| self.cache.set(Namespace::Opportunities, &opp.id, opp)),
            );
        }

        for e in results.into_iter().filter_map(Result::err) {
            warn!(error = %e, "Failed to cache tick results");
        }
    }

    fn hand_off(&self, opportunities: &[ValidatedOpportunity]) {
        let Some(sink) = &self.execution else {
            return;
        };
        for opp in opportunities {
            let result = ExecutionDescriptor::try_from(opp)
                .map_err(|e| e.to_string())
                .and_then(|desc| sink.submit(desc).map_err(|e| e.to_string()));
            if let Err(e) = result {
                warn!(opportunity = %opp.id, error = %e, "Execution hand-off dropped");
            }
        }
    }

    async fn publish(&self, bundle: Arc<ResultBundle>, alerts: &[AlertEvent]) {
        if let Err(e) = self.publisher.publish_bundle(bundle).await {
            warn!(publisher = self.publisher.name(), error = %e, "Failed to publish bundle");
        }
        for alert in alerts {
            if let Err(e) = self.publisher.publish_alert(alert).await {
                warn!(publisher = self.publisher.name(), error = %e, "Failed to publish alert");
            }
        }
    }

    /// Tick on the refresh interval until `shutdown` turns true.
    ///
    /// Ticks never overlap. Shutdown is only observed between ticks, so an
    /// in-flight tick always finishes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.refresh_interval.as_secs(),
            price_feed = self.price_feed.name(),
            gas_feed = self.gas_feed.name(),
            "Refresh loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
        }

        info!(ticks = self.ticks, "Refresh loop stopped");
    }
}
