//! Cost-adjusted profitability validation.
//!
//! [`validate`] is a pure function of the candidate, the gas price and the
//! cost model: no clock reads, no shared state, no logging.

use tracing::error;

use super::types::{
    CostBreakdown, OpportunityCandidate, RejectedCandidate, RejectionReason, ValidatedOpportunity,
};
use crate::config::Config;
use crate::error::ComputationError;

const GWEI_TO_ETH: f64 = 1e-9;

/// Execution cost model.
#[derive(Debug, Clone)]
pub struct CostModel {
    /// Fixed gas per execution.
    pub base_gas_units: u64,
    /// Additional gas per swap.
    pub per_hop_gas_units: u64,
    /// ETH price used to convert gas into USD.
    pub eth_price_usd: f64,
    /// Trade size the percentages are relative to.
    pub trade_notional_usd: f64,
    /// Protocol fee per swap (percent).
    pub protocol_fee_pct_per_hop: f64,
    /// Slippage budget (percent).
    pub max_slippage_pct: f64,
    /// Net profit must exceed this (percent).
    pub min_net_profit_pct: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            base_gas_units: 100_000,
            per_hop_gas_units: 50_000,
            eth_price_usd: 2_500.0,
            trade_notional_usd: 10_000.0,
            protocol_fee_pct_per_hop: 0.3,
            max_slippage_pct: 0.2,
            min_net_profit_pct: 0.1,
        }
    }
}

impl From<&Config> for CostModel {
    fn from(config: &Config) -> Self {
        Self {
            base_gas_units: config.base_gas_units,
            per_hop_gas_units: config.per_hop_gas_units,
            eth_price_usd: config.eth_price_usd,
            trade_notional_usd: config.trade_notional_usd,
            protocol_fee_pct_per_hop: config.protocol_fee_pct_per_hop,
            max_slippage_pct: config.max_slippage_pct,
            min_net_profit_pct: config.min_net_profit_pct,
        }
    }
}

impl CostModel {
    /// Gas cost for a route of `hops` swaps, in percent of notional.
    pub fn gas_cost_pct(&self, hops: usize, gas_price_gwei: f64) -> f64 {
        let gas_units = self.base_gas_units as f64 + self.per_hop_gas_units as f64 * hops as f64;
        let cost_usd = gas_units * gas_price_gwei * GWEI_TO_ETH * self.eth_price_usd;
        cost_usd / self.trade_notional_usd * 100.0
    }

    /// Full cost breakdown for a route of `hops` swaps.
    pub fn costs(&self, hops: usize, gas_price_gwei: f64) -> CostBreakdown {
        CostBreakdown {
            gas_cost_pct: self.gas_cost_pct(hops, gas_price_gwei),
            protocol_fees_pct: self.protocol_fee_pct_per_hop * hops as f64,
            slippage_pct: self.max_slippage_pct,
        }
    }
}

/// Stable identifier for a route: kind, route and venue set.
pub fn opportunity_id(candidate: &OpportunityCandidate) -> String {
    format!(
        "{}:{}:{}",
        candidate.kind.label(),
        candidate.route_id(),
        candidate.kind.venues().join(",")
    )
}

/// Apply the cost model to one candidate.
pub fn validate(
    candidate: &OpportunityCandidate,
    gas_price_gwei: f64,
    model: &CostModel,
) -> Result<ValidatedOpportunity, ComputationError> {
    let hops = candidate.kind.hop_count();
    if hops == 0 {
        return Err(ComputationError::EmptyRoute(candidate.kind.describe()));
    }

    let cost_breakdown = model.costs(hops, gas_price_gwei);
    let net_profit_pct = candidate.gross_profit_pct - cost_breakdown.total();

    let route = || candidate.kind.describe();
    for (field, value) in [
        ("gross_profit_pct", candidate.gross_profit_pct),
        ("gas_cost_pct", cost_breakdown.gas_cost_pct),
        ("net_profit_pct", net_profit_pct),
    ] {
        if !value.is_finite() {
            return Err(ComputationError::NonFinite {
                route: route(),
                field,
            });
        }
    }

    let is_profitable = net_profit_pct > model.min_net_profit_pct;
    let profitability_score = if is_profitable && candidate.gross_profit_pct > 0.0 {
        net_profit_pct / candidate.gross_profit_pct
    } else {
        0.0
    };

    Ok(ValidatedOpportunity {
        id: opportunity_id(candidate),
        kind: candidate.kind.clone(),
        gross_profit_pct: candidate.gross_profit_pct,
        cost_breakdown,
        net_profit_pct,
        is_profitable,
        profitability_score,
        quality_tier: candidate.quality_tier,
        min_liquidity_usd: candidate.min_liquidity_usd,
        gas_price_gwei,
        rejection_reason: (!is_profitable).then_some(RejectionReason::NetProfitBelowFloor),
        detected_at: candidate.timestamp,
    })
}

/// Validated candidates partitioned by outcome.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Net-profitable opportunities, best first.
    pub profitable: Vec<ValidatedOpportunity>,
    /// Opportunities eaten by costs.
    pub rejected: Vec<RejectedCandidate>,
    /// Candidates dropped because evaluation failed.
    pub errors: usize,
}

/// Validate every candidate, dropping the ones that fail to evaluate.
pub fn validate_all(
    candidates: &[OpportunityCandidate],
    gas_price_gwei: f64,
    model: &CostModel,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for candidate in candidates {
        match validate(candidate, gas_price_gwei, model) {
            Ok(opp) if opp.is_profitable => outcome.profitable.push(opp),
            Ok(opp) => outcome.rejected.push(RejectedCandidate::from_validated(&opp)),
            Err(e) => {
                error!(error = %e, "Dropping candidate");
                outcome.errors += 1;
            }
        }
    }

    outcome
        .profitable
        .sort_by(|a, b| b.net_profit_pct.total_cmp(&a.net_profit_pct));

    outcome
}
