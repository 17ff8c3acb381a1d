//! Pairwise cross-venue spread detection.

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::scanner::{ScanOutcome, ScannerConfig};
use super::types::{
    OpportunityCandidate, OpportunityKind, QualityTier, RejectedCandidate, RejectionReason,
};
use crate::error::DataError;
use crate::market::{MarketGraph, PairQuotes};
use crate::utils::pct_change;

/// Result of a direct scan over every pair.
#[derive(Debug, Clone, Default)]
pub struct DirectScanOutcome {
    /// Candidates and rejections.
    pub outcome: ScanOutcome,
    /// Pairs quoted by at least two venues.
    pub pairs_scanned: usize,
    /// Largest spread observed, including spreads rejected as data errors.
    pub max_spread_pct: f64,
}

/// Relative spread `(max - min) / min * 100`.
pub fn spread_pct(min_rate: f64, max_rate: f64) -> f64 {
    pct_change(min_rate, max_rate)
}

/// Provisional tier for a direct spread.
pub fn direct_quality(spread_pct: f64) -> QualityTier {
    if spread_pct <= 5.0 {
        QualityTier::High
    } else if spread_pct <= 10.0 {
        QualityTier::Medium
    } else {
        QualityTier::Low
    }
}

/// Scan every pair quoted by two or more venues for cross-venue spreads.
#[instrument(skip_all, fields(pairs = graph.pairs().len()))]
pub fn scan_direct(graph: &MarketGraph, config: &ScannerConfig) -> DirectScanOutcome {
    let mut result = DirectScanOutcome::default();
    let now = OffsetDateTime::now_utc();

    for pair in graph.pairs() {
        if pair.edges.len() < 2 {
            continue;
        }
        result.pairs_scanned += 1;

        let Some(candidate) = pair_candidate(graph, pair, now) else {
            continue;
        };
        let spread = candidate.gross_profit_pct;
        result.max_spread_pct = result.max_spread_pct.max(spread);

        match check_spread(spread, config) {
            Ok(()) => {
                debug!(
                    pair = %pair.pair,
                    spread_pct = spread,
                    "Direct candidate"
                );
                result.outcome.candidates.push(candidate);
            }
            Err(reason) => {
                if reason.is_data_error() {
                    result.outcome.data_errors += 1;
                    let err = DataError::UnrealisticSpread {
                        pair: pair.pair.clone(),
                        spread_pct: spread,
                    };
                    warn!(error = %err, "Spread rejected as data error");
                }
                result
                    .outcome
                    .rejected
                    .push(RejectedCandidate::from_candidate(&candidate, reason));
            }
        }
    }

    debug!(
        scanned = result.pairs_scanned,
        accepted = result.outcome.candidates.len(),
        rejected = result.outcome.rejected.len(),
        max_spread_pct = result.max_spread_pct,
        "Direct scan complete"
    );

    result
}

/// Apply the spread filters in order; first match wins.
fn check_spread(spread: f64, config: &ScannerConfig) -> Result<(), RejectionReason> {
    if spread > config.max_realistic_spread_pct {
        return Err(RejectionReason::UnrealisticSpread);
    }
    if spread < config.min_spread_threshold_pct {
        return Err(RejectionReason::BelowNoiseFloor);
    }
    if spread < config.min_profit_pct {
        return Err(RejectionReason::BelowProfitFloor);
    }
    Ok(())
}

/// Build the candidate between the cheapest and dearest venue of a pair.
fn pair_candidate(
    graph: &MarketGraph,
    pair: &PairQuotes,
    now: OffsetDateTime,
) -> Option<OpportunityCandidate> {
    let by_rate = |a: &&usize, b: &&usize| graph.edge(**a).rate.total_cmp(&graph.edge(**b).rate);
    let low = graph.edge(*pair.edges.iter().min_by(by_rate)?);
    let high = graph.edge(*pair.edges.iter().max_by(by_rate)?);

    let spread = spread_pct(low.rate, high.rate);
    if !spread.is_finite() {
        return None;
    }

    Some(OpportunityCandidate {
        kind: OpportunityKind::Direct {
            pair: pair.pair.clone(),
            buy_venue: low.venue.clone(),
            sell_venue: high.venue.clone(),
            buy_rate: low.rate,
            sell_rate: high.rate,
            spread_pct: spread,
        },
        gross_profit_pct: spread,
        min_liquidity_usd: low.liquidity_usd.min(high.liquidity_usd),
        quality_tier: direct_quality(spread),
        timestamp: now,
    })
}
