//! Downstream publishing of result bundles and alert events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::bundle::ResultBundle;
use crate::alerts::AlertEvent;
use crate::config::Config;
use crate::error::PublishError;

/// Receives each tick's bundle and every emitted alert.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Publish a tick's results.
    async fn publish_bundle(&self, bundle: Arc<ResultBundle>) -> Result<(), PublishError>;

    /// Publish one alert.
    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(), PublishError>;
}

/// Event delivered to in-process subscribers.
#[derive(Debug, Clone)]
pub enum PublishedEvent {
    /// A tick finished.
    Bundle(Arc<ResultBundle>),
    /// An alert fired.
    Alert(AlertEvent),
}

/// Fans events out on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    /// Create a channel buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: PublishedEvent) {
        // no subscribers is not an error
        if self.tx.send(event).is_err() {
            debug!("No broadcast subscribers");
        }
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn publish_bundle(&self, bundle: Arc<ResultBundle>) -> Result<(), PublishError> {
        self.send(PublishedEvent::Bundle(bundle));
        Ok(())
    }

    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(), PublishError> {
        self.send(PublishedEvent::Alert(alert.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
enum WebhookBody<'a> {
    Bundle(&'a ResultBundle),
    Alert(&'a AlertEvent),
}

/// POSTs JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    http: reqwest::Client,
    url: String,
    send_bundles: bool,
}

impl WebhookPublisher {
    /// Create a publisher posting alerts to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            send_bundles: false,
        })
    }

    /// Also post every tick bundle.
    pub fn with_bundles(mut self, send_bundles: bool) -> Self {
        self.send_bundles = send_bundles;
        self
    }

    /// Publisher for the configured webhook, if any.
    pub fn from_config(config: &Config) -> Result<Option<Self>, PublishError> {
        let Some(url) = &config.webhook_url else {
            return Ok(None);
        };
        let publisher =
            Self::new(url.clone(), config.fetch_timeout())?.with_bundles(config.webhook_bundles);
        Ok(Some(publisher))
    }

    /// Whether tick bundles are posted.
    pub fn sends_bundles(&self) -> bool {
        self.send_bundles
    }

    async fn post(&self, body: &WebhookBody<'_>) -> Result<(), PublishError> {
        let response = self.http.post(&self.url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(url = %self.url))]
    async fn publish_bundle(&self, bundle: Arc<ResultBundle>) -> Result<(), PublishError> {
        if !self.send_bundles {
            return Ok(());
        }
        self.post(&WebhookBody::Bundle(&bundle)).await
    }

    #[instrument(skip_all, fields(url = %self.url))]
    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(), PublishError> {
        self.post(&WebhookBody::Alert(alert)).await
    }
}

/// Logs a one-line summary per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish_bundle(&self, bundle: Arc<ResultBundle>) -> Result<(), PublishError> {
        let stats = &bundle.scan_stats;
        info!(
            tick = stats.tick,
            data_source = %bundle.data_source,
            vertices = stats.vertex_count,
            edges = stats.edge_count,
            dropped = stats.dropped_edges,
            profitable = stats.profitable,
            rejected = stats.rejected,
            gas_gwei = stats.gas_price_gwei,
            duration_ms = stats.duration_ms,
            "Tick complete"
        );
        if let Some(best) = bundle.opportunities.first() {
            info!(
                route = %best.kind.describe(),
                net_profit_pct = best.net_profit_pct,
                tier = %best.quality_tier,
                "Best opportunity"
            );
        }
        Ok(())
    }

    async fn publish_alert(&self, _alert: &AlertEvent) -> Result<(), PublishError> {
        // the dispatcher already logs every alert
        Ok(())
    }
}

/// Publishes to several publishers concurrently. Never fails.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn Publisher>>,
}

impl FanoutPublisher {
    /// Create an empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a publisher.
    pub fn with(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Number of publishers.
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// Whether there are no publishers.
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    fn report(&self, what: &str, results: Vec<Result<(), PublishError>>) {
        for (publisher, result) in self.publishers.iter().zip(results) {
            if let Err(e) = result {
                warn!(publisher = publisher.name(), error = %e, "Failed to publish {}", what);
            }
        }
    }
}

#[async_trait]
impl Publisher for FanoutPublisher {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn publish_bundle(&self, bundle: Arc<ResultBundle>) -> Result<(), PublishError> {
        let results = join_all(
            self.publishers
                .iter()
                .map(|p| p.publish_bundle(Arc::clone(&bundle))),
        )
        .await;
        self.report("bundle", results);
        Ok(())
    }

    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(), PublishError> {
        let results = join_all(self.publishers.iter().map(|p| p.publish_alert(alert))).await;
        self.report("alert", results);
        Ok(())
    }
}
