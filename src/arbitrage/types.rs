//! Opportunity types shared by the scanners, validator and alerting.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Coarse opportunity classification by profit and liquidity depth.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QualityTier {
    /// Strong, deep opportunity.
    High,
    /// Moderate opportunity.
    Medium,
    /// Marginal opportunity.
    Low,
}

/// One hop of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleLeg {
    /// Token sold on this hop.
    pub from: String,
    /// Token bought on this hop.
    pub to: String,
    /// Venue executing the hop.
    pub venue: String,
    /// Units of `to` per unit of `from`.
    pub rate: f64,
    /// Pool liquidity in USD.
    pub liquidity_usd: f64,
}

/// What kind of route an opportunity trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OpportunityKind {
    /// Same pair, bought on one venue and sold on another.
    Direct {
        /// Pair key.
        pair: String,
        /// Venue with the lower price.
        buy_venue: String,
        /// Venue with the higher price.
        sell_venue: String,
        /// Price on the buy venue.
        buy_rate: f64,
        /// Price on the sell venue.
        sell_rate: f64,
        /// Relative spread in percent.
        spread_pct: f64,
    },
    /// Closed multi-hop conversion returning to its start token.
    Triangular {
        /// Tokens visited, starting and ending with the same token.
        token_path: Vec<String>,
        /// Venue used by each hop.
        venue_path: Vec<String>,
        /// Hop details.
        edges: Vec<CycleLeg>,
    },
}

impl OpportunityKind {
    /// Number of swaps needed to execute the route.
    pub fn hop_count(&self) -> usize {
        match self {
            OpportunityKind::Direct { .. } => 2,
            OpportunityKind::Triangular { edges, .. } => edges.len(),
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            OpportunityKind::Direct { .. } => "direct",
            OpportunityKind::Triangular { .. } => "triangular",
        }
    }

    /// Normalized route identifier: the pair, or the sorted token set.
    pub fn route_id(&self) -> String {
        match self {
            OpportunityKind::Direct { pair, .. } => pair.clone(),
            OpportunityKind::Triangular { token_path, .. } => {
                let mut tokens: Vec<&str> = token_path.iter().map(String::as_str).collect();
                tokens.sort_unstable();
                tokens.dedup();
                tokens.join("-")
            }
        }
    }

    /// Distinct venues touched by the route, sorted.
    pub fn venues(&self) -> Vec<String> {
        let mut venues: Vec<String> = match self {
            OpportunityKind::Direct {
                buy_venue,
                sell_venue,
                ..
            } => vec![buy_venue.clone(), sell_venue.clone()],
            OpportunityKind::Triangular { venue_path, .. } => venue_path.clone(),
        };
        venues.sort_unstable();
        venues.dedup();
        venues
    }

    /// Human-readable route.
    pub fn describe(&self) -> String {
        match self {
            OpportunityKind::Direct {
                pair,
                buy_venue,
                sell_venue,
                ..
            } => format!("{} buy@{} sell@{}", pair, buy_venue, sell_venue),
            OpportunityKind::Triangular {
                token_path,
                venue_path,
                ..
            } => format!("{} via {}", token_path.join(" -> "), venue_path.join(",")),
        }
    }
}

/// Raw opportunity produced by a scanner, before costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityCandidate {
    /// Route details.
    pub kind: OpportunityKind,
    /// Raw return in percent.
    pub gross_profit_pct: f64,
    /// Shallowest liquidity along the route, in USD.
    pub min_liquidity_usd: f64,
    /// Provisional tier assigned by the scanner.
    pub quality_tier: QualityTier,
    /// When the candidate was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl OpportunityCandidate {
    /// Route identifier.
    pub fn route_id(&self) -> String {
        self.kind.route_id()
    }

    /// Dedup signature: sorted token set plus sorted venue set.
    pub fn signature(&self) -> String {
        format!("{}|{}", self.kind.route_id(), self.kind.venues().join(","))
    }
}

/// Modeled execution costs, all in percent of trade notional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    /// Gas cost.
    pub gas_cost_pct: f64,
    /// Protocol swap fees.
    pub protocol_fees_pct: f64,
    /// Slippage budget.
    pub slippage_pct: f64,
}

impl CostBreakdown {
    /// Sum of all cost components.
    pub fn total(&self) -> f64 {
        self.gas_cost_pct + self.protocol_fees_pct + self.slippage_pct
    }
}

/// Why a candidate was filtered out.
///
/// These are expected filtering outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Route loses money before costs.
    #[strum(serialize = "non-positive profit")]
    NonPositiveProfit,
    /// Gross profit under the configured floor.
    #[strum(serialize = "below profit floor")]
    BelowProfitFloor,
    /// Gross profit too large to be real; treated as a data problem.
    #[strum(serialize = "unrealistic profit")]
    UnrealisticProfit,
    /// Some hop is too shallow.
    #[strum(serialize = "insufficient liquidity")]
    InsufficientLiquidity,
    /// Cycle never leaves one venue.
    #[strum(serialize = "single-venue cycle, not economically meaningful as cross-venue arbitrage")]
    SingleVenueCycle,
    /// Spread is indistinguishable from noise.
    #[strum(serialize = "spread below noise floor")]
    BelowNoiseFloor,
    /// Spread too large to be real; treated as a data problem.
    #[strum(serialize = "unrealistic spread")]
    UnrealisticSpread,
    /// Costs eat the profit.
    #[strum(serialize = "net profit below floor")]
    NetProfitBelowFloor,
}

impl RejectionReason {
    /// Whether the rejection signals bad upstream data rather than a weak route.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            RejectionReason::UnrealisticProfit | RejectionReason::UnrealisticSpread
        )
    }
}

/// Candidate after applying the cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedOpportunity {
    /// Stable identifier: kind, route and venues.
    pub id: String,
    /// Route details.
    pub kind: OpportunityKind,
    /// Raw return in percent.
    pub gross_profit_pct: f64,
    /// Modeled costs.
    pub cost_breakdown: CostBreakdown,
    /// `gross_profit_pct - cost_breakdown.total()`.
    pub net_profit_pct: f64,
    /// `net_profit_pct > min_net_profit_pct`.
    pub is_profitable: bool,
    /// Share of gross profit that survives costs; 0 when unprofitable.
    pub profitability_score: f64,
    /// Quality tier.
    pub quality_tier: QualityTier,
    /// Shallowest liquidity along the route, in USD.
    pub min_liquidity_usd: f64,
    /// Gas price the costs were computed with, in gwei.
    pub gas_price_gwei: f64,
    /// Present iff not profitable.
    pub rejection_reason: Option<RejectionReason>,
    /// When the underlying candidate was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl ValidatedOpportunity {
    /// Normalized route identifier.
    pub fn route_id(&self) -> String {
        self.kind.route_id()
    }
}

/// A filtered-out candidate retained for operator visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedCandidate {
    /// `direct` or `triangular`.
    pub kind: String,
    /// Human-readable route.
    pub route: String,
    /// Raw return in percent.
    pub gross_profit_pct: f64,
    /// Net return, when the cost model ran.
    pub net_profit_pct: Option<f64>,
    /// Machine-readable reason.
    pub reason: RejectionReason,
    /// Human-readable reason.
    pub reason_text: String,
}

impl RejectedCandidate {
    /// Rejection from a scanner filter.
    pub fn from_candidate(candidate: &OpportunityCandidate, reason: RejectionReason) -> Self {
        Self::new(&candidate.kind, candidate.gross_profit_pct, None, reason)
    }

    /// Rejection from the cost model.
    pub fn from_validated(opp: &ValidatedOpportunity) -> Self {
        Self::new(
            &opp.kind,
            opp.gross_profit_pct,
            Some(opp.net_profit_pct),
            opp.rejection_reason
                .unwrap_or(RejectionReason::NetProfitBelowFloor),
        )
    }

    fn new(
        kind: &OpportunityKind,
        gross_profit_pct: f64,
        net_profit_pct: Option<f64>,
        reason: RejectionReason,
    ) -> Self {
        Self {
            kind: kind.label().to_string(),
            route: kind.describe(),
            gross_profit_pct,
            net_profit_pct,
            reason,
            reason_text: reason.to_string(),
        }
    }
}

/// Bounded sample of rejections plus a total count.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedSample {
    /// Retained rejections, oldest first.
    pub items: Vec<RejectedCandidate>,
    /// All rejections seen, retained or not.
    pub total: usize,
    #[serde(skip)]
    capacity: usize,
}

impl RejectedSample {
    /// Create a sample keeping at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(64)),
            total: 0,
            capacity,
        }
    }

    /// Record a rejection.
    pub fn push(&mut self, rejected: RejectedCandidate) {
        self.total += 1;
        if self.items.len() < self.capacity {
            self.items.push(rejected);
        }
    }

    /// Record several rejections.
    pub fn extend(&mut self, rejected: impl IntoIterator<Item = RejectedCandidate>) {
        for r in rejected {
            self.push(r);
        }
    }
}
