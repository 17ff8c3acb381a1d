//! Alert records, classification and settings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::arbitrage::ValidatedOpportunity;
use crate::config::Config;

/// Alert classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// Net profit of at least 2%.
    HighProfit,
    /// Net profit of at least 1%.
    MediumProfit,
    /// High quality tier.
    HighQuality,
    /// Any other qualifying opportunity.
    Standard,
    /// Too many quotes were invalid this tick.
    LowDataQuality,
    /// Suspiciously many opportunities in one tick.
    OpportunityFlood,
    /// Suspiciously large spread observed.
    ExtremeSpread,
}

impl AlertType {
    /// Whether this is a system-health alert rather than an opportunity.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            AlertType::LowDataQuality | AlertType::OpportunityFlood | AlertType::ExtremeSpread
        )
    }

    /// Default severity for the type.
    pub fn severity(&self) -> Severity {
        match self {
            AlertType::HighProfit | AlertType::LowDataQuality => Severity::High,
            AlertType::MediumProfit
            | AlertType::HighQuality
            | AlertType::OpportunityFlood
            | AlertType::ExtremeSpread => Severity::Medium,
            AlertType::Standard => Severity::Low,
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth a look.
    Medium,
    /// Act now.
    High,
}

/// One emitted alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// Unique alert identifier.
    pub id: String,
    /// Opportunity the alert refers to; absent for system alerts.
    pub opportunity_id: Option<String>,
    /// Classification.
    pub alert_type: AlertType,
    /// Severity.
    pub severity: Severity,
    /// Key used for cooldown suppression.
    pub cooldown_key: String,
    /// Human-readable summary.
    pub message: String,
    /// When the alert was emitted.
    #[serde(with = "time::serde::rfc3339")]
    pub emitted_at: OffsetDateTime,
}

/// An alert plus the opportunity that triggered it, for publishing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    /// The alert.
    pub record: AlertRecord,
    /// Triggering opportunity; absent for system alerts.
    pub opportunity: Option<ValidatedOpportunity>,
}

/// Aggregate market figures for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    /// Percentage of quotes that were usable.
    pub data_quality_score: f64,
    /// Largest cross-venue spread seen, in percent.
    pub max_observed_spread_pct: f64,
    /// Profitable opportunities this tick.
    pub opportunity_count: usize,
}

/// Dispatcher counters over the history window.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    /// Alerts in the history window.
    pub total: usize,
    /// Alerts in the window by type.
    pub by_type: BTreeMap<String, usize>,
    /// Alerts in the window by severity.
    pub by_severity: BTreeMap<String, usize>,
    /// Alerts suppressed by cooldown since start.
    pub suppressed: u64,
    /// Cooldown keys currently blocking.
    pub active_cooldowns: usize,
    /// Most recent alert.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_alert_at: Option<OffsetDateTime>,
}

/// Alert settings.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Minimum time between alerts sharing a cooldown key.
    pub cooldown: Duration,
    /// Minimum net profit (percent).
    pub min_net_profit_pct: f64,
    /// Minimum gross profit (percent).
    pub min_profit_pct: f64,
    /// Maximum spread for direct alerts (percent).
    pub max_spread_pct: f64,
    /// Minimum cycle liquidity, in USD.
    pub min_liquidity_usd: f64,
    /// Net profit for HIGH_PROFIT (percent).
    pub high_profit_pct: f64,
    /// Net profit for MEDIUM_PROFIT (percent).
    pub medium_profit_pct: f64,
    /// Data-quality score floor.
    pub data_quality_floor: f64,
    /// Opportunity count above which a flood alert fires.
    pub max_opportunities_per_tick: usize,
    /// Spread above which an extreme-spread alert fires (percent).
    pub extreme_spread_pct: f64,
    /// History retention.
    pub history_window: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            min_net_profit_pct: 0.1,
            min_profit_pct: 0.1,
            max_spread_pct: 5.0,
            min_liquidity_usd: 50_000.0,
            high_profit_pct: 2.0,
            medium_profit_pct: 1.0,
            data_quality_floor: 20.0,
            max_opportunities_per_tick: 50,
            extreme_spread_pct: 100.0,
            history_window: Duration::from_secs(24 * 3600),
        }
    }
}

impl From<&Config> for AlertConfig {
    fn from(config: &Config) -> Self {
        Self {
            cooldown: Duration::from_secs(config.alert_cooldown_secs),
            min_net_profit_pct: config.min_net_profit_pct,
            min_profit_pct: config.alert_min_profit_pct,
            max_spread_pct: config.alert_max_spread_pct,
            min_liquidity_usd: config.alert_min_liquidity_usd,
            data_quality_floor: config.data_quality_floor,
            max_opportunities_per_tick: config.max_opportunities_per_tick,
            extreme_spread_pct: config.extreme_spread_pct,
            history_window: Duration::from_secs(config.alert_history_hours * 3600),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_wire_names() {
        assert_eq!(AlertType::HighProfit.to_string(), "HIGH_PROFIT");
        assert_eq!(
            serde_json::to_value(AlertType::OpportunityFlood).unwrap(),
            "OPPORTUNITY_FLOOD"
        );
    }

    #[test]
    fn system_types_are_flagged() {
        assert!(AlertType::ExtremeSpread.is_system());
        assert!(!AlertType::Standard.is_system());
        assert_eq!(AlertType::LowDataQuality.severity(), Severity::High);
    }
}
