//! Prometheus metrics for tick latency and detection outcomes.
//!
//! This module provides metrics for:
//! - Tick duration and failures
//! - Graph construction data errors
//! - Candidate, opportunity and alert counts
//! - Collaborator fetch failures
//! - Cache hit ratio and evictions

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Tick duration metric name.
pub const METRIC_TICK_DURATION: &str = "tick_duration_ms";
/// Price feed fetch latency metric name.
pub const METRIC_FETCH_LATENCY: &str = "fetch_latency_ms";
/// Ticks run counter metric name.
pub const METRIC_TICKS: &str = "ticks_total";
/// Ticks that ended with no usable data.
pub const METRIC_TICK_FAILURES: &str = "tick_failures_total";
/// Degraded ticks counter metric name.
pub const METRIC_DEGRADED_TICKS: &str = "degraded_ticks_total";
/// Dropped quotes counter metric name.
pub const METRIC_EDGES_DROPPED: &str = "edges_dropped_total";
/// Scanner candidates counter metric name.
pub const METRIC_CANDIDATES: &str = "candidates_total";
/// Profitable opportunities counter metric name.
pub const METRIC_OPPORTUNITIES_PROFITABLE: &str = "opportunities_profitable_total";
/// Candidates dropped on evaluation failure.
pub const METRIC_COMPUTATION_ERRORS: &str = "computation_errors_total";
/// Collaborator fetch failures counter metric name.
pub const METRIC_FETCH_FAILURES: &str = "fetch_failures_total";
/// Emitted alerts counter metric name.
pub const METRIC_ALERTS_EMITTED: &str = "alerts_emitted_total";
/// Alerts suppressed by cooldown.
pub const METRIC_ALERTS_SUPPRESSED: &str = "alerts_suppressed_total";
/// Cache hits counter metric name.
pub const METRIC_CACHE_HITS: &str = "cache_hits_total";
/// Cache misses counter metric name.
pub const METRIC_CACHE_MISSES: &str = "cache_misses_total";
/// Cache evictions counter metric name.
pub const METRIC_CACHE_EVICTIONS: &str = "cache_evictions_total";
/// Data quality gauge metric name.
pub const METRIC_DATA_QUALITY: &str = "data_quality_score";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(METRIC_TICK_DURATION, "Full refresh tick duration in milliseconds");
    describe_histogram!(
        METRIC_FETCH_LATENCY,
        "Price feed snapshot fetch latency in milliseconds"
    );

    // Counters
    describe_counter!(METRIC_TICKS, "Total number of refresh ticks run");
    describe_counter!(
        METRIC_TICK_FAILURES,
        "Total number of ticks that produced no usable market data"
    );
    describe_counter!(
        METRIC_DEGRADED_TICKS,
        "Total number of ticks published in degraded mode"
    );
    describe_counter!(
        METRIC_EDGES_DROPPED,
        "Total number of quotes dropped as invalid"
    );
    describe_counter!(METRIC_CANDIDATES, "Total number of scanner candidates by kind");
    describe_counter!(
        METRIC_OPPORTUNITIES_PROFITABLE,
        "Total number of net-profitable opportunities"
    );
    describe_counter!(
        METRIC_COMPUTATION_ERRORS,
        "Total number of candidates dropped on evaluation failure"
    );
    describe_counter!(
        METRIC_FETCH_FAILURES,
        "Total number of failed collaborator calls by source"
    );
    describe_counter!(METRIC_ALERTS_EMITTED, "Total number of alerts emitted by type");
    describe_counter!(
        METRIC_ALERTS_SUPPRESSED,
        "Total number of alerts suppressed by cooldown"
    );
    describe_counter!(METRIC_CACHE_HITS, "Total number of cache hits");
    describe_counter!(METRIC_CACHE_MISSES, "Total number of cache misses");
    describe_counter!(
        METRIC_CACHE_EVICTIONS,
        "Total number of cache entries evicted under capacity pressure"
    );

    describe_gauge!(METRIC_DATA_QUALITY, "Share of valid quotes in the last snapshot");

    debug!("Metrics initialized");
}

/// Record price feed fetch latency.
pub fn record_fetch_latency(start: Instant, source: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_FETCH_LATENCY, "source" => source.to_string()).record(latency_ms);
}

/// Increment ticks counter.
pub fn inc_ticks() {
    counter!(METRIC_TICKS).increment(1);
}

/// Increment tick failures counter.
pub fn inc_tick_failures() {
    counter!(METRIC_TICK_FAILURES).increment(1);
}

/// Increment degraded ticks counter.
pub fn inc_degraded_ticks() {
    counter!(METRIC_DEGRADED_TICKS).increment(1);
}

/// Increment dropped quotes counter.
pub fn inc_edges_dropped() {
    counter!(METRIC_EDGES_DROPPED).increment(1);
}

/// Add scanner candidates of one kind.
pub fn add_candidates(kind: &'static str, count: usize) {
    counter!(METRIC_CANDIDATES, "kind" => kind).increment(count as u64);
}

/// Add profitable opportunities.
pub fn add_profitable(count: usize) {
    counter!(METRIC_OPPORTUNITIES_PROFITABLE).increment(count as u64);
}

/// Add candidates dropped on evaluation failure.
pub fn add_computation_errors(count: usize) {
    counter!(METRIC_COMPUTATION_ERRORS).increment(count as u64);
}

/// Increment fetch failures for a collaborator.
pub fn inc_fetch_failures(source: &'static str) {
    counter!(METRIC_FETCH_FAILURES, "source" => source).increment(1);
}

/// Increment emitted alerts of one type.
pub fn inc_alerts_emitted(alert_type: &str) {
    counter!(METRIC_ALERTS_EMITTED, "type" => alert_type.to_string()).increment(1);
}

/// Increment suppressed alerts counter.
pub fn inc_alerts_suppressed() {
    counter!(METRIC_ALERTS_SUPPRESSED).increment(1);
}

/// Increment cache hits counter.
pub fn inc_cache_hits() {
    counter!(METRIC_CACHE_HITS).increment(1);
}

/// Increment cache misses counter.
pub fn inc_cache_misses() {
    counter!(METRIC_CACHE_MISSES).increment(1);
}

/// Increment cache evictions counter.
pub fn inc_cache_evictions() {
    counter!(METRIC_CACHE_EVICTIONS).increment(1);
}

/// Set the data quality gauge.
pub fn set_data_quality(score: f64) {
    gauge!(METRIC_DATA_QUALITY).set(score);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a full tick.
pub fn timer_tick() -> LatencyTimer {
    LatencyTimer::new(METRIC_TICK_DURATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_tick();
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 9.0);
    }

    #[test]
    fn counters_without_recorder_are_noops() {
        inc_ticks();
        add_candidates("direct", 3);
        inc_alerts_emitted("HIGH_PROFIT");
        set_data_quality(87.5);
    }
}
