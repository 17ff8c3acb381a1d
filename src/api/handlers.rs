//! HTTP API handlers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::alerts::{AlertRecord, AlertStats};
use crate::cache::{CacheStats, Namespace, OpportunityCache};
use crate::engine::{
    DataSource, LatestOpportunities, PublishedEvent, ResultBundle, ScanStats,
    LATEST_OPPORTUNITIES_KEY, LATEST_SCAN_STATS_KEY,
};

/// Alerts kept for the alerts endpoint.
const MAX_RECENT_ALERTS: usize = 200;

const DEFAULT_ALERT_LIMIT: usize = 50;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the first tick has completed.
    pub ready: Arc<AtomicBool>,
    /// Cache written by the orchestrator.
    pub cache: Arc<OpportunityCache>,
    /// Most recent tick bundle.
    pub latest: Arc<RwLock<Option<Arc<ResultBundle>>>>,
    /// Recent alerts, newest first.
    pub alerts: Arc<RwLock<VecDeque<AlertRecord>>>,
    /// Prometheus renderer, when the exporter is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state over a shared cache.
    pub fn new(cache: Arc<OpportunityCache>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            cache,
            latest: Arc::new(RwLock::new(None)),
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Fold one published event into the state.
    pub async fn apply(&self, event: PublishedEvent) {
        match event {
            PublishedEvent::Bundle(bundle) => {
                *self.latest.write().await = Some(bundle);
                self.set_ready(true);
            }
            PublishedEvent::Alert(alert) => {
                let mut alerts = self.alerts.write().await;
                alerts.push_front(alert.record);
                alerts.truncate(MAX_RECENT_ALERTS);
            }
        }
    }

    /// Keep the state current from the publisher's broadcast channel.
    pub fn spawn_updater(&self, mut rx: broadcast::Receiver<PublishedEvent>) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => state.apply(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "API state updater lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("API state updater stopped");
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    /// Whether a tick has completed.
    pub ready: bool,
    /// Last completed tick.
    pub last_tick: Option<u64>,
}

/// Status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Live or degraded, from the last tick.
    pub data_source: Option<DataSource>,
    /// Why the last tick was degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    /// Last tick's scan stats.
    pub scan_stats: Option<ScanStats>,
    /// Current cache counters.
    pub cache_stats: CacheStats,
    /// Alert counters as of the last tick.
    pub alert_stats: Option<AlertStats>,
}

/// Query parameters for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Maximum items returned.
    pub limit: Option<usize>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 once a tick has completed, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let last_tick = state
        .latest
        .read()
        .await
        .as_ref()
        .map(|b| b.scan_stats.tick);

    let response = ReadyResponse {
        ready: is_ready,
        last_tick,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns the last tick's figures.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let latest = state.latest.read().await.clone();
    let status = if state.is_ready() { "running" } else { "starting" };

    let scan_stats = latest
        .as_ref()
        .map(|b| b.scan_stats.clone())
        .or_else(|| {
            state
                .cache
                .get_as(Namespace::MarketSnapshots, LATEST_SCAN_STATS_KEY)
        });

    Json(StatusResponse {
        status,
        data_source: latest.as_ref().map(|b| b.data_source),
        degraded_reason: latest.as_ref().and_then(|b| b.degraded_reason.clone()),
        scan_stats,
        cache_stats: state.cache.stats(),
        alert_stats: latest.as_ref().map(|b| b.alert_stats.clone()),
    })
}

/// Opportunities handler - latest profitable set, best first.
pub async fn opportunities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let cached: Option<LatestOpportunities> = state
        .cache
        .get_as(Namespace::Opportunities, LATEST_OPPORTUNITIES_KEY);

    let mut latest = match cached {
        Some(latest) => latest,
        None => match state.latest.read().await.as_ref() {
            Some(bundle) => LatestOpportunities {
                tick: bundle.scan_stats.tick,
                data_source: bundle.data_source,
                opportunities: bundle.opportunities.clone(),
            },
            None => LatestOpportunities::default(),
        },
    };

    if let Some(limit) = query.limit {
        latest.opportunities.truncate(limit);
    }
    Json(latest)
}

/// Alerts handler - recent alerts, newest first.
pub async fn alerts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    let alerts: Vec<AlertRecord> = state.alerts.read().await.iter().take(limit).cloned().collect();
    Json(alerts)
}

/// Prometheus metrics handler.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics exporter not installed".to_string(),
        ),
    }
}
