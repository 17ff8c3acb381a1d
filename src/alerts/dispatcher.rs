//! Cooldown-gated alert emission.
//!
//! The dispatcher is owned by the orchestrator and only touched from the tick,
//! so its cooldown map and history need no synchronization.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::types::{AlertConfig, AlertEvent, AlertRecord, AlertStats, AlertType, MarketStats, Severity};
use crate::arbitrage::{OpportunityKind, QualityTier, ValidatedOpportunity};
use crate::metrics;

/// Emits alerts for qualifying opportunities and unhealthy market data.
#[derive(Debug)]
pub struct AlertDispatcher {
    config: AlertConfig,
    cooldowns: HashMap<String, Instant>,
    history: VecDeque<(Instant, AlertRecord)>,
    suppressed: u64,
    sequence: u64,
}

impl AlertDispatcher {
    /// Create a dispatcher with empty history.
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            cooldowns: HashMap::new(),
            history: VecDeque::new(),
            suppressed: 0,
            sequence: 0,
        }
    }

    /// Whether an opportunity is worth alerting on at all.
    pub fn should_alert(&self, opp: &ValidatedOpportunity) -> bool {
        if !opp.is_profitable || opp.net_profit_pct < self.config.min_net_profit_pct {
            return false;
        }
        if opp.gross_profit_pct < self.config.min_profit_pct {
            return false;
        }
        match &opp.kind {
            OpportunityKind::Direct { spread_pct, .. } => *spread_pct <= self.config.max_spread_pct,
            OpportunityKind::Triangular { .. } => {
                opp.min_liquidity_usd >= self.config.min_liquidity_usd
            }
        }
    }

    /// Alert type for an opportunity.
    pub fn classify(&self, opp: &ValidatedOpportunity) -> AlertType {
        if opp.net_profit_pct >= self.config.high_profit_pct {
            AlertType::HighProfit
        } else if opp.net_profit_pct >= self.config.medium_profit_pct {
            AlertType::MediumProfit
        } else if opp.quality_tier == QualityTier::High {
            AlertType::HighQuality
        } else {
            AlertType::Standard
        }
    }

    /// Process one tick's profitable opportunities and market stats.
    pub fn process(
        &mut self,
        opportunities: &[ValidatedOpportunity],
        stats: &MarketStats,
    ) -> Vec<AlertEvent> {
        self.process_at(opportunities, stats, Instant::now())
    }

    /// Process as of `now`.
    pub fn process_at(
        &mut self,
        opportunities: &[ValidatedOpportunity],
        stats: &MarketStats,
        now: Instant,
    ) -> Vec<AlertEvent> {
        self.prune(now);

        let mut events = Vec::new();

        for opp in opportunities {
            if !self.should_alert(opp) {
                continue;
            }
            let alert_type = self.classify(opp);
            let key = format!("{}:{}", alert_type, opp.route_id());
            let message = format!(
                "{} {}: net {:.2}% (gross {:.2}%, {} tier)",
                opp.kind.label(),
                opp.kind.describe(),
                opp.net_profit_pct,
                opp.gross_profit_pct,
                opp.quality_tier
            );
            if let Some(record) = self.emit(alert_type, key, message, Some(opp.id.clone()), now) {
                events.push(AlertEvent {
                    record,
                    opportunity: Some(opp.clone()),
                });
            }
        }

        for (alert_type, message) in self.system_conditions(stats) {
            let key = alert_type.to_string();
            if let Some(record) = self.emit(alert_type, key, message, None, now) {
                events.push(AlertEvent {
                    record,
                    opportunity: None,
                });
            }
        }

        events
    }

    fn system_conditions(&self, stats: &MarketStats) -> Vec<(AlertType, String)> {
        let mut conditions = Vec::new();
        if stats.data_quality_score < self.config.data_quality_floor {
            conditions.push((
                AlertType::LowDataQuality,
                format!(
                    "data quality score {:.1} below floor {:.1}",
                    stats.data_quality_score, self.config.data_quality_floor
                ),
            ));
        }
        if stats.opportunity_count > self.config.max_opportunities_per_tick {
            conditions.push((
                AlertType::OpportunityFlood,
                format!(
                    "{} opportunities in one tick exceeds {}, upstream data suspect",
                    stats.opportunity_count, self.config.max_opportunities_per_tick
                ),
            ));
        }
        if stats.max_observed_spread_pct > self.config.extreme_spread_pct {
            conditions.push((
                AlertType::ExtremeSpread,
                format!(
                    "max observed spread {:.2}% exceeds {:.2}%, upstream data suspect",
                    stats.max_observed_spread_pct, self.config.extreme_spread_pct
                ),
            ));
        }
        conditions
    }

    fn emit(
        &mut self,
        alert_type: AlertType,
        cooldown_key: String,
        message: String,
        opportunity_id: Option<String>,
        now: Instant,
    ) -> Option<AlertRecord> {
        if let Some(last) = self.cooldowns.get(&cooldown_key) {
            if now.saturating_duration_since(*last) < self.config.cooldown {
                self.suppressed += 1;
                metrics::inc_alerts_suppressed();
                debug!(key = %cooldown_key, "Alert suppressed by cooldown");
                return None;
            }
        }

        self.sequence += 1;
        let emitted_at = OffsetDateTime::now_utc();
        let severity = alert_type.severity();
        let record = AlertRecord {
            id: format!("alert-{}-{}", emitted_at.unix_timestamp(), self.sequence),
            opportunity_id,
            alert_type,
            severity,
            cooldown_key: cooldown_key.clone(),
            message,
            emitted_at,
        };

        match severity {
            Severity::High => warn!(alert_type = %alert_type, message = %record.message, "Alert"),
            _ => info!(alert_type = %alert_type, message = %record.message, "Alert"),
        }
        metrics::inc_alerts_emitted(&alert_type.to_string());

        self.cooldowns.insert(cooldown_key, now);
        self.history.push_back((now, record.clone()));
        Some(record)
    }

    fn prune(&mut self, now: Instant) {
        let window = self.config.history_window;
        while let Some((at, _)) = self.history.front() {
            if now.saturating_duration_since(*at) >= window {
                self.history.pop_front();
            } else {
                break;
            }
        }

        let cooldown = self.config.cooldown;
        self.cooldowns
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
    }

    /// Most recent alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        self.history
            .iter()
            .rev()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Counters over the history window.
    pub fn stats(&self) -> AlertStats {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
        for (_, record) in &self.history {
            *by_type.entry(record.alert_type.to_string()).or_default() += 1;
            *by_severity.entry(record.severity.to_string()).or_default() += 1;
        }

        AlertStats {
            total: self.history.len(),
            by_type,
            by_severity,
            suppressed: self.suppressed,
            active_cooldowns: self.cooldowns.len(),
            last_alert_at: self.history.back().map(|(_, r)| r.emitted_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{CostBreakdown, CycleLeg};
    use std::time::Duration;

    fn direct(net: f64, spread: f64) -> ValidatedOpportunity {
        ValidatedOpportunity {
            id: "direct:USDC/WETH:sushi,uniswap".to_string(),
            kind: OpportunityKind::Direct {
                pair: "USDC/WETH".to_string(),
                buy_venue: "sushi".to_string(),
                sell_venue: "uniswap".to_string(),
                buy_rate: 0.00025,
                sell_rate: 0.00026,
                spread_pct: spread,
            },
            gross_profit_pct: spread,
            cost_breakdown: CostBreakdown::default(),
            net_profit_pct: net,
            is_profitable: true,
            profitability_score: net / spread,
            quality_tier: QualityTier::High,
            min_liquidity_usd: 100_000.0,
            gas_price_gwei: 20.0,
            rejection_reason: None,
            detected_at: OffsetDateTime::now_utc(),
        }
    }

    fn triangle(net: f64, liquidity: f64) -> ValidatedOpportunity {
        let leg = |from: &str, to: &str, venue: &str| CycleLeg {
            from: from.to_string(),
            to: to.to_string(),
            venue: venue.to_string(),
            rate: 1.0,
            liquidity_usd: liquidity,
        };
        ValidatedOpportunity {
            id: "triangular:DAI-USDC-WETH:curve,uniswap".to_string(),
            kind: OpportunityKind::Triangular {
                token_path: ["WETH", "USDC", "DAI", "WETH"].map(String::from).to_vec(),
                venue_path: ["uniswap", "curve", "uniswap"].map(String::from).to_vec(),
                edges: vec![
                    leg("WETH", "USDC", "uniswap"),
                    leg("USDC", "DAI", "curve"),
                    leg("DAI", "WETH", "uniswap"),
                ],
            },
            gross_profit_pct: net + 1.5,
            cost_breakdown: CostBreakdown::default(),
            net_profit_pct: net,
            is_profitable: true,
            profitability_score: 0.5,
            quality_tier: QualityTier::Low,
            min_liquidity_usd: liquidity,
            gas_price_gwei: 20.0,
            rejection_reason: None,
            detected_at: OffsetDateTime::now_utc(),
        }
    }

    fn healthy() -> MarketStats {
        MarketStats {
            data_quality_score: 100.0,
            max_observed_spread_pct: 4.0,
            opportunity_count: 1,
        }
    }

    #[test]
    fn cooldown_suppresses_repeat_then_releases() {
        let mut dispatcher = AlertDispatcher::new(AlertConfig::default());
        let opp = direct(3.1, 4.0);
        let start = Instant::now();

        let first = dispatcher.process_at(&[opp.clone()], &healthy(), start);
        let second =
            dispatcher.process_at(&[opp.clone()], &healthy(), start + Duration::from_secs(30));
        let third =
            dispatcher.process_at(&[opp], &healthy(), start + Duration::from_secs(61));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(third.len(), 1);
        assert_ne!(first[0].record.id, third[0].record.id);
        assert_eq!(first[0].record.cooldown_key, "HIGH_PROFIT:USDC/WETH");
        assert_eq!(dispatcher.stats().suppressed, 1);
        assert_eq!(dispatcher.stats().total, 2);
    }

    #[test]
    fn classification_by_net_profit_then_quality() {
        let dispatcher = AlertDispatcher::new(AlertConfig::default());

        assert_eq!(dispatcher.classify(&direct(2.5, 4.0)), AlertType::HighProfit);
        assert_eq!(dispatcher.classify(&direct(1.2, 4.0)), AlertType::MediumProfit);
        assert_eq!(dispatcher.classify(&direct(0.5, 4.0)), AlertType::HighQuality);
        assert_eq!(dispatcher.classify(&triangle(0.5, 80_000.0)), AlertType::Standard);
    }

    #[test]
    fn should_alert_applies_kind_specific_bounds() {
        let dispatcher = AlertDispatcher::new(AlertConfig::default());

        assert!(dispatcher.should_alert(&direct(1.0, 4.0)));
        assert!(!dispatcher.should_alert(&direct(1.0, 6.0)));
        assert!(!dispatcher.should_alert(&direct(0.05, 4.0)));

        assert!(dispatcher.should_alert(&triangle(1.0, 60_000.0)));
        assert!(!dispatcher.should_alert(&triangle(1.0, 20_000.0)));

        let mut unprofitable = direct(1.0, 4.0);
        unprofitable.is_profitable = false;
        assert!(!dispatcher.should_alert(&unprofitable));
    }

    #[test]
    fn system_alerts_fire_on_bad_data() {
        let mut dispatcher = AlertDispatcher::new(AlertConfig::default());
        let stats = MarketStats {
            data_quality_score: 10.0,
            max_observed_spread_pct: 250.0,
            opportunity_count: 80,
        };

        let events = dispatcher.process_at(&[], &stats, Instant::now());
        let types: Vec<AlertType> = events.iter().map(|e| e.record.alert_type).collect();

        assert_eq!(
            types,
            vec![
                AlertType::LowDataQuality,
                AlertType::OpportunityFlood,
                AlertType::ExtremeSpread
            ]
        );
        assert!(events.iter().all(|e| e.opportunity.is_none()));
    }

    #[test]
    fn system_alerts_share_cooldown() {
        let mut dispatcher = AlertDispatcher::new(AlertConfig::default());
        let stats = MarketStats {
            data_quality_score: 5.0,
            ..healthy()
        };
        let start = Instant::now();

        assert_eq!(dispatcher.process_at(&[], &stats, start).len(), 1);
        assert!(dispatcher
            .process_at(&[], &stats, start + Duration::from_secs(10))
            .is_empty());
    }

    #[test]
    fn history_is_pruned_after_window() {
        let config = AlertConfig {
            history_window: Duration::from_secs(3600),
            ..Default::default()
        };
        let mut dispatcher = AlertDispatcher::new(config);
        let start = Instant::now();

        dispatcher.process_at(&[direct(3.0, 4.0)], &healthy(), start);
        assert_eq!(dispatcher.recent(10).len(), 1);

        dispatcher.process_at(&[], &healthy(), start + Duration::from_secs(3601));
        assert!(dispatcher.recent(10).is_empty());
        assert_eq!(dispatcher.stats().active_cooldowns, 0);
    }
}
