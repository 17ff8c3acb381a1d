//! Scanner settings and the outcome shape shared by both scanners.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::types::{OpportunityCandidate, RejectedCandidate};
use crate::config::Config;

/// Which cycle search to run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CycleStrategy {
    /// Exhaustive below the vertex limit, bounded above it.
    #[default]
    Auto,
    /// Every ordered triple of vertices.
    Exhaustive,
    /// Depth-first search from the base tokens.
    Bounded,
}

/// Thresholds shared by the direct scanner and the cycle finder.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Spreads below this are noise (percent).
    pub min_spread_threshold_pct: f64,
    /// Spreads above this are data errors (percent).
    pub max_realistic_spread_pct: f64,
    /// Minimum gross profit (percent).
    pub min_profit_pct: f64,
    /// Cycle profits above this are data errors (percent).
    pub max_realistic_profit_pct: f64,
    /// Minimum liquidity along a cycle, in USD.
    pub min_liquidity_usd: f64,
    /// Accept cycles confined to one venue.
    pub allow_single_venue_cycles: bool,
    /// Cycle search strategy.
    pub strategy: CycleStrategy,
    /// Auto mode runs exhaustive search below this many vertices.
    pub exhaustive_vertex_limit: usize,
    /// Maximum hops in the bounded search.
    pub max_depth: usize,
    /// Seed tokens for the bounded search, uppercase.
    pub base_tokens: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_spread_threshold_pct: 0.01,
            max_realistic_spread_pct: 5.0,
            min_profit_pct: 0.1,
            max_realistic_profit_pct: 10.0,
            min_liquidity_usd: 50_000.0,
            allow_single_venue_cycles: false,
            strategy: CycleStrategy::Auto,
            exhaustive_vertex_limit: 50,
            max_depth: 3,
            base_tokens: ["USDC", "USDT", "DAI", "WETH", "WBTC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl From<&Config> for ScannerConfig {
    fn from(config: &Config) -> Self {
        Self {
            min_spread_threshold_pct: config.min_spread_threshold_pct,
            max_realistic_spread_pct: config.max_realistic_spread_pct,
            min_profit_pct: config.min_profit_pct,
            max_realistic_profit_pct: config.max_realistic_profit_pct,
            min_liquidity_usd: config.min_liquidity_usd,
            allow_single_venue_cycles: config.allow_single_venue_cycles,
            strategy: CycleStrategy::from_str(&config.cycle_strategy).unwrap_or_default(),
            exhaustive_vertex_limit: config.exhaustive_vertex_limit,
            max_depth: config.max_cycle_depth,
            base_tokens: config.base_tokens_upper(),
        }
    }
}

/// Candidates and rejections from one scanner pass.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Candidates that passed every filter.
    pub candidates: Vec<OpportunityCandidate>,
    /// Candidates that failed a filter.
    pub rejected: Vec<RejectedCandidate>,
    /// Rejections that indicate bad upstream data.
    pub data_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!(CycleStrategy::from_str("auto").unwrap(), CycleStrategy::Auto);
        assert_eq!(
            CycleStrategy::from_str("Bounded").unwrap(),
            CycleStrategy::Bounded
        );
        assert!(CycleStrategy::from_str("bfs").is_err());
    }

    #[test]
    fn scanner_config_from_app_config() {
        let config = Config {
            cycle_strategy: "exhaustive".to_string(),
            base_tokens: vec!["weth".to_string()],
            ..Default::default()
        };
        let scanner = ScannerConfig::from(&config);
        assert_eq!(scanner.strategy, CycleStrategy::Exhaustive);
        assert_eq!(scanner.base_tokens, vec!["WETH"]);
    }
}
