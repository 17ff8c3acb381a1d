//! Integration tests for the arbitrage engine.
//!
//! Each test drives whole ticks through the orchestrator with mock
//! collaborators; nothing touches the network.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use dex_arb_engine::alerts::{AlertConfig, AlertDispatcher, AlertType};
use dex_arb_engine::api::{create_router, AppState};
use dex_arb_engine::arbitrage::{OpportunityKind, QualityTier, RejectionReason};
use dex_arb_engine::cache::{CacheConfig, Namespace, OpportunityCache};
use dex_arb_engine::engine::{
    evaluate_snapshot, BroadcastPublisher, DataSource, LatestOpportunities, OrchestratorConfig,
    PublishedEvent, RefreshOrchestrator, LAST_GOOD_SNAPSHOT_KEY, LATEST_OPPORTUNITIES_KEY,
};
use dex_arb_engine::feed::{MockGasFeed, MockPriceFeed};
use dex_arb_engine::market::{GraphConfig, MarketGraph, PriceSnapshot, VenueQuote};
use dex_arb_engine::utils::approx_eq;

fn usdc_weth() -> PriceSnapshot {
    PriceSnapshot::new()
        .with_rate("USDC/WETH", "venueA", 0.00026)
        .with_rate("USDC/WETH", "venueB", 0.00025)
}

fn deep(rate: f64) -> VenueQuote {
    VenueQuote::with_metadata(rate, 300_000.0, 50_000.0)
}

fn triangle(rates: [f64; 3]) -> PriceSnapshot {
    PriceSnapshot::new()
        .with_quote("AAA/BBB", "uniswap", deep(rates[0]))
        .with_quote("BBB/CCC", "sushiswap", deep(rates[1]))
        .with_quote("CCC/AAA", "curve", deep(rates[2]))
}

struct Harness {
    feed: MockPriceFeed,
    gas: MockGasFeed,
    orchestrator: RefreshOrchestrator,
    events: tokio::sync::broadcast::Receiver<PublishedEvent>,
}

fn harness(snapshot: PriceSnapshot, alerts: AlertConfig) -> Harness {
    let feed = MockPriceFeed::new(snapshot);
    let gas = MockGasFeed::from_gwei(20.0);
    let broadcast = BroadcastPublisher::new(64);
    let events = broadcast.subscribe();

    let orchestrator = RefreshOrchestrator::new(
        OrchestratorConfig {
            fetch_timeout: Duration::from_millis(250),
            ..Default::default()
        },
        Arc::new(feed.clone()),
        Arc::new(gas.clone()),
        Arc::new(OpportunityCache::new(CacheConfig::default())),
        AlertDispatcher::new(alerts),
    )
    .with_publisher(Arc::new(broadcast));

    Harness {
        feed,
        gas,
        orchestrator,
        events,
    }
}

fn drain_alerts(rx: &mut tokio::sync::broadcast::Receiver<PublishedEvent>) -> Vec<AlertType> {
    let mut alerts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PublishedEvent::Alert(alert) = event {
            alerts.push(alert.record.alert_type);
        }
    }
    alerts
}

#[tokio::test]
async fn usdc_weth_spread_survives_costs() {
    let mut h = harness(usdc_weth(), AlertConfig::default());

    let bundle = h.orchestrator.tick().await;

    assert_eq!(bundle.data_source, DataSource::Live);
    assert_eq!(bundle.opportunities.len(), 1);

    let opp = &bundle.opportunities[0];
    match &opp.kind {
        OpportunityKind::Direct {
            buy_venue,
            sell_venue,
            ..
        } => {
            assert_eq!(buy_venue, "venueB");
            assert_eq!(sell_venue, "venueA");
        }
        other => panic!("expected a direct opportunity, got {:?}", other),
    }
    assert!((3.85..=4.0 + 1e-9).contains(&opp.gross_profit_pct));
    assert!((opp.cost_breakdown.total() - 0.9).abs() < 1e-9);
    assert!((opp.net_profit_pct - 3.1).abs() < 1e-6);
    assert!(opp.is_profitable);
    assert!(matches!(opp.quality_tier, QualityTier::High | QualityTier::Medium));

    assert_eq!(drain_alerts(&mut h.events), vec![AlertType::HighProfit]);
}

#[tokio::test]
async fn reverse_pairs_describe_one_spread() {
    let snapshot = usdc_weth()
        .with_rate("WETH/USDC", "venueA", 1.0 / 0.00026)
        .with_rate("WETH/USDC", "venueB", 1.0 / 0.00025);
    let mut h = harness(snapshot, AlertConfig::default());

    let bundle = h.orchestrator.tick().await;

    assert_eq!(bundle.opportunities.len(), 1);
    let opp = &bundle.opportunities[0];
    assert_eq!(opp.route_id(), "USDC/WETH");
    match &opp.kind {
        OpportunityKind::Direct {
            buy_venue,
            sell_venue,
            ..
        } => {
            assert_eq!(buy_venue, "venueB");
            assert_eq!(sell_venue, "venueA");
        }
        other => panic!("expected a direct opportunity, got {:?}", other),
    }
    assert!((3.85..=4.0 + 1e-9).contains(&opp.gross_profit_pct));
    assert!((opp.net_profit_pct - 3.1).abs() < 1e-6);

    assert_eq!(drain_alerts(&mut h.events), vec![AlertType::HighProfit]);
}

#[tokio::test]
async fn profitable_triangle_is_accepted_with_costs() {
    let mut h = harness(triangle([2.0, 3.0, 0.18]), AlertConfig::default());

    let bundle = h.orchestrator.tick().await;

    assert_eq!(bundle.opportunities.len(), 1);
    let opp = &bundle.opportunities[0];
    assert!(matches!(opp.kind, OpportunityKind::Triangular { .. }));
    assert_eq!(opp.kind.hop_count(), 3);
    assert!((opp.gross_profit_pct - 8.0).abs() < 1e-6);
    // 3 hops: gas 0.125% + fees 0.9% + slippage 0.2%
    assert!((opp.net_profit_pct - (8.0 - 1.225)).abs() < 1e-6);
    assert_eq!(opp.quality_tier, QualityTier::High);

    // the reverse direction loses money
    assert!(bundle
        .rejected_sample
        .items
        .iter()
        .any(|r| r.reason == RejectionReason::NonPositiveProfit));
}

#[tokio::test]
async fn losing_triangle_is_rejected() {
    let mut h = harness(triangle([0.5, 2.1, 0.95]), AlertConfig::default());

    let bundle = h.orchestrator.tick().await;

    assert!(bundle.opportunities.is_empty());
    let reasons: Vec<_> = bundle.rejected_sample.items.iter().map(|r| r.reason).collect();
    assert!(reasons.contains(&RejectionReason::NonPositiveProfit));
    let losing = bundle
        .rejected_sample
        .items
        .iter()
        .find(|r| r.reason == RejectionReason::NonPositiveProfit)
        .unwrap();
    assert!((losing.gross_profit_pct + 0.25).abs() < 1e-6);
    assert_eq!(losing.reason_text, "non-positive profit");
}

#[test]
fn graph_never_holds_invalid_edges() {
    let snapshot = PriceSnapshot::new()
        .with_rate("USDC/WETH", "good", 0.00026)
        .with_rate("USDC/WETH", "nan", f64::NAN)
        .with_rate("USDC/WETH", "zero", 0.0)
        .with_rate("USDC/WETH", "negative", -1.0)
        .with_rate("USDC/WETH", "infinite", f64::INFINITY)
        .with_rate("DAI/USDC", "huge", 5e6)
        .with_rate("nonsense", "good", 1.0);

    let (graph, report) = MarketGraph::build(&snapshot, &GraphConfig::default());

    assert_eq!(report.total_quotes, 7);
    assert_eq!(report.dropped_edges, 6);
    assert_eq!(graph.edge_count(), 2);
    assert!(graph
        .edges()
        .iter()
        .all(|e| e.rate.is_finite() && e.rate > 0.0));

    let forward = graph.edges().iter().find(|e| !e.inverse).unwrap();
    let inverse = graph
        .edges()
        .iter()
        .find(|e| e.inverse && e.venue == forward.venue)
        .unwrap();
    assert_eq!((inverse.from, inverse.to), (forward.to, forward.from));
    assert!(approx_eq(inverse.rate, 1.0 / forward.rate, 1e-12));
}

#[test]
fn direct_spread_is_deterministic() {
    let snapshot = PriceSnapshot::new()
        .with_rate("DAI/USDC", "low", 100.0)
        .with_rate("DAI/USDC", "high", 105.0);
    let mut config = OrchestratorConfig::default();
    config.scanner.max_realistic_spread_pct = 10.0;

    let accepted = evaluate_snapshot(&snapshot, 20.0, &config);
    assert_eq!(accepted.scan_stats.direct_candidates, 1);
    assert!((accepted.scan_stats.max_observed_spread_pct - 5.0).abs() < 1e-6);

    config.scanner.min_profit_pct = 5.5;
    config.scanner.max_realistic_profit_pct = 20.0;
    let rejected = evaluate_snapshot(&snapshot, 20.0, &config);
    assert_eq!(rejected.scan_stats.direct_candidates, 0);
    assert_eq!(
        rejected.rejected_sample.items[0].reason,
        RejectionReason::BelowProfitFloor
    );
}

#[tokio::test]
async fn feed_failure_without_cache_is_degraded_and_empty() {
    let mut h = harness(usdc_weth(), AlertConfig::default());
    h.feed.set_failing(true);

    let bundle = h.orchestrator.tick().await;

    assert_eq!(bundle.data_source, DataSource::Degraded);
    assert!(bundle.opportunities.is_empty());
    assert!(bundle.degraded_reason.is_some());

    let json = serde_json::to_value(&*bundle).unwrap();
    assert_eq!(json["dataSource"], "degraded");

    // only system alerts may fire on a degraded tick
    let alerts = drain_alerts(&mut h.events);
    assert!(alerts.iter().all(AlertType::is_system));
    assert!(alerts.contains(&AlertType::LowDataQuality));
}

#[tokio::test]
async fn feed_failure_reuses_last_good_snapshot() {
    let mut h = harness(usdc_weth(), AlertConfig::default());
    h.orchestrator.tick().await;
    assert!(h
        .orchestrator
        .cache()
        .get(Namespace::MarketSnapshots, LAST_GOOD_SNAPSHOT_KEY)
        .is_some());

    h.feed.set_latency(Duration::from_secs(2));
    let bundle = h.orchestrator.tick().await;

    assert_eq!(bundle.data_source, DataSource::Degraded);
    assert_eq!(bundle.opportunities.len(), 1);
    assert!(bundle.degraded_reason.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn gas_failure_falls_back_and_stays_live() {
    let mut h = harness(usdc_weth(), AlertConfig::default());
    h.gas.set_failing(true);

    let bundle = h.orchestrator.tick().await;

    assert!(bundle.is_live());
    assert!(bundle.scan_stats.gas_price_fallback);
    assert_eq!(bundle.scan_stats.gas_price_gwei, 20.0);
    assert_eq!(bundle.opportunities.len(), 1);
}

#[tokio::test]
async fn gas_price_moves_net_profit() {
    let mut h = harness(usdc_weth(), AlertConfig::default());
    h.gas.set_gwei(100.0);

    let bundle = h.orchestrator.tick().await;

    // 200k gas at 100 gwei and $2,500 ETH on $10,000 is 0.5%
    let opp = &bundle.opportunities[0];
    assert!((opp.cost_breakdown.gas_cost_pct - 0.5).abs() < 1e-9);
    assert!((opp.net_profit_pct - 2.7).abs() < 1e-6);
    assert!(!bundle.scan_stats.gas_price_fallback);
}

#[tokio::test]
async fn alert_cooldown_spans_ticks() {
    let mut h = harness(
        usdc_weth(),
        AlertConfig {
            cooldown: Duration::from_millis(150),
            ..Default::default()
        },
    );

    h.orchestrator.tick().await;
    h.orchestrator.tick().await;
    assert_eq!(drain_alerts(&mut h.events), vec![AlertType::HighProfit]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    h.orchestrator.tick().await;
    assert_eq!(drain_alerts(&mut h.events), vec![AlertType::HighProfit]);

    let stats = h.orchestrator.alerts().stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.suppressed, 1);

    let ids: Vec<String> = h
        .orchestrator
        .alerts()
        .recent(2)
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn api_serves_latest_tick() {
    let mut h = harness(usdc_weth(), AlertConfig::default());
    let state = AppState::new(Arc::clone(h.orchestrator.cache()));

    h.orchestrator.tick().await;
    while let Ok(event) = h.events.try_recv() {
        state.apply(event).await;
    }

    let cached: LatestOpportunities = h
        .orchestrator
        .cache()
        .get_as(Namespace::Opportunities, LATEST_OPPORTUNITIES_KEY)
        .unwrap();
    assert_eq!(cached.opportunities.len(), 1);

    let app = create_router(state);
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/opportunities")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["dataSource"], "live");
    assert_eq!(json["opportunities"][0]["kind"]["type"], "direct");
}
