//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::arbitrage::CycleStrategy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Refresh Loop ===
    /// Seconds between refresh ticks.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Per-call timeout for collaborator requests, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    // === Collaborators ===
    /// HTTP endpoint serving the price snapshot JSON.
    #[serde(default)]
    pub price_feed_url: Option<String>,

    /// Local file holding a price snapshot (used when no URL is set).
    #[serde(default)]
    pub price_feed_file: Option<String>,

    /// JSON-RPC endpoint queried with `eth_gasPrice`.
    #[serde(default)]
    pub gas_rpc_url: Option<String>,

    /// Webhook receiving result bundles and alert events.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Post every tick bundle to the webhook, not just alerts.
    #[serde(default = "default_webhook_bundles")]
    pub webhook_bundles: bool,

    /// Hand profitable opportunities to the execution collaborator.
    #[serde(default)]
    pub execution_enabled: bool,

    // === Market Graph ===
    /// Rates above this ceiling are treated as corrupt data.
    #[serde(default = "default_max_sane_rate")]
    pub max_sane_rate: f64,

    /// Liquidity assumed for quotes that carry no liquidity metadata.
    #[serde(default = "default_liquidity")]
    pub default_liquidity_usd: f64,

    // === Scanners ===
    /// Spreads below this are noise (percent).
    #[serde(default = "default_min_spread")]
    pub min_spread_threshold_pct: f64,

    /// Spreads above this are data errors (percent).
    #[serde(default = "default_max_spread")]
    pub max_realistic_spread_pct: f64,

    /// Minimum gross profit for a candidate (percent).
    #[serde(default = "default_min_profit")]
    pub min_profit_pct: f64,

    /// Cycle profits above this are data errors (percent).
    #[serde(default = "default_max_profit")]
    pub max_realistic_profit_pct: f64,

    /// Minimum liquidity along a cycle, in USD.
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity_usd: f64,

    /// Accept cycles that only touch one venue.
    #[serde(default)]
    pub allow_single_venue_cycles: bool,

    /// Cycle search strategy: auto, exhaustive or bounded.
    #[serde(default = "default_cycle_strategy")]
    pub cycle_strategy: String,

    /// Graphs with fewer vertices use exhaustive search in auto mode.
    #[serde(default = "default_exhaustive_limit")]
    pub exhaustive_vertex_limit: usize,

    /// Maximum hops in the bounded-depth search.
    #[serde(default = "default_max_depth")]
    pub max_cycle_depth: usize,

    /// Seed tokens for the bounded-depth search.
    #[serde(default = "default_base_tokens")]
    pub base_tokens: Vec<String>,

    // === Cost Model ===
    /// Fixed gas units per execution.
    #[serde(default = "default_base_gas")]
    pub base_gas_units: u64,

    /// Additional gas units per hop.
    #[serde(default = "default_per_hop_gas")]
    pub per_hop_gas_units: u64,

    /// Gas price used when the gas collaborator is unavailable (gwei).
    #[serde(default = "default_gas_price")]
    pub fallback_gas_price_gwei: f64,

    /// Native token price used to convert gas into USD.
    #[serde(default = "default_eth_price")]
    pub eth_price_usd: f64,

    /// Notional trade size the percentages are computed against.
    #[serde(default = "default_notional")]
    pub trade_notional_usd: f64,

    /// Protocol fee charged per hop (percent).
    #[serde(default = "default_fee_per_hop")]
    pub protocol_fee_pct_per_hop: f64,

    /// Slippage budget applied to every trade (percent).
    #[serde(default = "default_slippage")]
    pub max_slippage_pct: f64,

    /// Net profit an opportunity must exceed (percent).
    #[serde(default = "default_min_net_profit")]
    pub min_net_profit_pct: f64,

    // === Cache ===
    /// TTL of the `prices` namespace, in seconds.
    #[serde(default = "default_prices_ttl")]
    pub cache_prices_ttl_secs: u64,

    /// TTL of the `pools` namespace, in seconds.
    #[serde(default = "default_pools_ttl")]
    pub cache_pools_ttl_secs: u64,

    /// TTL of the `opportunities` namespace, in seconds.
    #[serde(default = "default_opportunities_ttl")]
    pub cache_opportunities_ttl_secs: u64,

    /// TTL of the `marketSnapshots` namespace, in seconds.
    #[serde(default = "default_snapshots_ttl")]
    pub cache_snapshots_ttl_secs: u64,

    /// Capacity of the `prices` namespace.
    #[serde(default = "default_prices_capacity")]
    pub cache_prices_capacity: usize,

    /// Capacity of the `pools` namespace.
    #[serde(default = "default_pools_capacity")]
    pub cache_pools_capacity: usize,

    /// Capacity of the `opportunities` namespace.
    #[serde(default = "default_opportunities_capacity")]
    pub cache_opportunities_capacity: usize,

    /// Capacity of the `marketSnapshots` namespace.
    #[serde(default = "default_snapshots_capacity")]
    pub cache_snapshots_capacity: usize,

    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    // === Alerts ===
    /// Seconds before the same route may alert again.
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,

    /// Minimum gross profit for an alert (percent).
    #[serde(default = "default_min_profit")]
    pub alert_min_profit_pct: f64,

    /// Maximum spread a direct opportunity may alert on (percent).
    #[serde(default = "default_max_spread")]
    pub alert_max_spread_pct: f64,

    /// Minimum cycle liquidity for an alert, in USD.
    #[serde(default = "default_min_liquidity")]
    pub alert_min_liquidity_usd: f64,

    /// Data-quality score below which a system alert fires.
    #[serde(default = "default_quality_floor")]
    pub data_quality_floor: f64,

    /// Opportunity count per tick above which a system alert fires.
    #[serde(default = "default_flood_threshold")]
    pub max_opportunities_per_tick: usize,

    /// Observed spread above which a system alert fires (percent).
    #[serde(default = "default_extreme_spread")]
    pub extreme_spread_pct: f64,

    /// Hours of alert history kept for stats.
    #[serde(default = "default_history_hours")]
    pub alert_history_hours: u64,

    /// Rejected candidates retained per tick for diagnostics.
    #[serde(default = "default_rejected_sample")]
    pub rejected_sample_size: usize,

    // === Server Configuration ===
    /// HTTP server port for the query API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_webhook_bundles() -> bool {
    true
}

fn default_max_sane_rate() -> f64 {
    1_000_000.0
}

fn default_liquidity() -> f64 {
    100_000.0
}

fn default_min_spread() -> f64 {
    0.01
}

fn default_max_spread() -> f64 {
    5.0
}

fn default_min_profit() -> f64 {
    0.1
}

fn default_max_profit() -> f64 {
    10.0
}

fn default_min_liquidity() -> f64 {
    50_000.0
}

fn default_cycle_strategy() -> String {
    "auto".to_string()
}

fn default_exhaustive_limit() -> usize {
    50
}

fn default_max_depth() -> usize {
    3
}

fn default_base_tokens() -> Vec<String> {
    ["USDC", "USDT", "DAI", "WETH", "WBTC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_base_gas() -> u64 {
    100_000
}

fn default_per_hop_gas() -> u64 {
    50_000
}

fn default_gas_price() -> f64 {
    20.0
}

fn default_eth_price() -> f64 {
    2_500.0
}

fn default_notional() -> f64 {
    10_000.0
}

fn default_fee_per_hop() -> f64 {
    0.3
}

fn default_slippage() -> f64 {
    0.2
}

fn default_min_net_profit() -> f64 {
    0.1
}

fn default_prices_ttl() -> u64 {
    15
}

fn default_pools_ttl() -> u64 {
    30
}

fn default_opportunities_ttl() -> u64 {
    30
}

fn default_snapshots_ttl() -> u64 {
    60
}

fn default_prices_capacity() -> usize {
    500
}

fn default_pools_capacity() -> usize {
    200
}

fn default_opportunities_capacity() -> usize {
    200
}

fn default_snapshots_capacity() -> usize {
    100
}

fn default_sweep_interval() -> u64 {
    120
}

fn default_alert_cooldown() -> u64 {
    60
}

fn default_quality_floor() -> f64 {
    20.0
}

fn default_flood_threshold() -> usize {
    50
}

fn default_extreme_spread() -> f64 {
    100.0
}

fn default_history_hours() -> u64 {
    24
}

fn default_rejected_sample() -> usize {
    25
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            price_feed_url: None,
            price_feed_file: None,
            gas_rpc_url: None,
            webhook_url: None,
            webhook_bundles: default_webhook_bundles(),
            execution_enabled: false,
            max_sane_rate: default_max_sane_rate(),
            default_liquidity_usd: default_liquidity(),
            min_spread_threshold_pct: default_min_spread(),
            max_realistic_spread_pct: default_max_spread(),
            min_profit_pct: default_min_profit(),
            max_realistic_profit_pct: default_max_profit(),
            min_liquidity_usd: default_min_liquidity(),
            allow_single_venue_cycles: false,
            cycle_strategy: default_cycle_strategy(),
            exhaustive_vertex_limit: default_exhaustive_limit(),
            max_cycle_depth: default_max_depth(),
            base_tokens: default_base_tokens(),
            base_gas_units: default_base_gas(),
            per_hop_gas_units: default_per_hop_gas(),
            fallback_gas_price_gwei: default_gas_price(),
            eth_price_usd: default_eth_price(),
            trade_notional_usd: default_notional(),
            protocol_fee_pct_per_hop: default_fee_per_hop(),
            max_slippage_pct: default_slippage(),
            min_net_profit_pct: default_min_net_profit(),
            cache_prices_ttl_secs: default_prices_ttl(),
            cache_pools_ttl_secs: default_pools_ttl(),
            cache_opportunities_ttl_secs: default_opportunities_ttl(),
            cache_snapshots_ttl_secs: default_snapshots_ttl(),
            cache_prices_capacity: default_prices_capacity(),
            cache_pools_capacity: default_pools_capacity(),
            cache_opportunities_capacity: default_opportunities_capacity(),
            cache_snapshots_capacity: default_snapshots_capacity(),
            cache_sweep_interval_secs: default_sweep_interval(),
            alert_cooldown_secs: default_alert_cooldown(),
            alert_min_profit_pct: default_min_profit(),
            alert_max_spread_pct: default_max_spread(),
            alert_min_liquidity_usd: default_min_liquidity(),
            data_quality_floor: default_quality_floor(),
            max_opportunities_per_tick: default_flood_threshold(),
            extreme_spread_pct: default_extreme_spread(),
            alert_history_hours: default_history_hours(),
            rejected_sample_size: default_rejected_sample(),
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval_secs == 0 {
            return Err("REFRESH_INTERVAL_SECS must be greater than 0".to_string());
        }

        if self.fetch_timeout_secs == 0 {
            return Err("FETCH_TIMEOUT_SECS must be greater than 0".to_string());
        }

        if self.min_profit_pct >= self.max_realistic_profit_pct {
            return Err("MIN_PROFIT_PCT must be below MAX_REALISTIC_PROFIT_PCT".to_string());
        }

        if self.min_spread_threshold_pct > self.max_realistic_spread_pct {
            return Err(
                "MIN_SPREAD_THRESHOLD_PCT must not exceed MAX_REALISTIC_SPREAD_PCT".to_string(),
            );
        }

        if !(3..=6).contains(&self.max_cycle_depth) {
            return Err("MAX_CYCLE_DEPTH must be between 3 and 6".to_string());
        }

        if self.base_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err("BASE_TOKENS must name at least one token".to_string());
        }

        if self.max_sane_rate <= 0.0 || !self.max_sane_rate.is_finite() {
            return Err("MAX_SANE_RATE must be a positive finite number".to_string());
        }

        if self.trade_notional_usd <= 0.0 {
            return Err("TRADE_NOTIONAL_USD must be positive".to_string());
        }

        let capacities = [
            self.cache_prices_capacity,
            self.cache_pools_capacity,
            self.cache_opportunities_capacity,
            self.cache_snapshots_capacity,
        ];
        if capacities.contains(&0) {
            return Err("cache capacities must be greater than 0".to_string());
        }

        let ttls = [
            self.cache_prices_ttl_secs,
            self.cache_pools_ttl_secs,
            self.cache_opportunities_ttl_secs,
            self.cache_snapshots_ttl_secs,
        ];
        if ttls.contains(&0) {
            return Err("cache TTLs must be greater than 0".to_string());
        }

        if CycleStrategy::from_str(&self.cycle_strategy).is_err() {
            return Err(format!(
                "CYCLE_STRATEGY must be auto, exhaustive or bounded (got {})",
                self.cycle_strategy
            ));
        }

        for (name, value) in [
            ("PRICE_FEED_URL", &self.price_feed_url),
            ("GAS_RPC_URL", &self.gas_rpc_url),
            ("WEBHOOK_URL", &self.webhook_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw).map_err(|e| format!("{} is not a valid URL: {}", name, e))?;
            }
        }

        Ok(())
    }

    /// Interval between refresh ticks.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Timeout applied to each collaborator call.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Seed tokens, normalized to uppercase.
    pub fn base_tokens_upper(&self) -> Vec<String> {
        self.base_tokens
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert_eq!(config.refresh_interval_secs, 30);
        assert_eq!(config.max_realistic_spread_pct, 5.0);
        assert_eq!(config.max_realistic_profit_pct, 10.0);
        assert_eq!(config.alert_cooldown_secs, 60);
        assert_eq!(config.base_tokens_upper()[0], "USDC");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_profit_bounds() {
        let config = Config {
            min_profit_pct: 12.0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_depth() {
        let config = Config {
            max_cycle_depth: 2,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_strategy() {
        let config = Config {
            cycle_strategy: "bellman-ford".to_string(),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_url() {
        let config = Config {
            price_feed_url: Some("not a url".to_string()),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_iter_uses_defaults() {
        let config: Config = envy::from_iter(vec![
            ("REFRESH_INTERVAL_SECS".to_string(), "5".to_string()),
            ("BASE_TOKENS".to_string(), "usdc,weth".to_string()),
        ])
        .unwrap();

        assert_eq!(config.refresh_interval_secs, 5);
        assert_eq!(config.base_tokens_upper(), vec!["USDC", "WETH"]);
        assert_eq!(config.min_profit_pct, 0.1);
        assert!(config.webhook_bundles);
    }

    #[test]
    fn webhook_bundles_can_be_disabled() {
        let config: Config = envy::from_iter(vec![
            ("WEBHOOK_URL".to_string(), "http://localhost:9000/hook".to_string()),
            ("WEBHOOK_BUNDLES".to_string(), "false".to_string()),
        ])
        .unwrap();

        assert!(!config.webhook_bundles);
        assert!(config.validate().is_ok());
    }
}
