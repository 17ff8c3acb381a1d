//! Mock collaborators for testing.
//!
//! These return canned data without making network requests. Latency and
//! failure can be toggled between calls to script partial-failure ticks.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{GasPriceFeed, PriceFeed, WEI_PER_GWEI};
use crate::error::FeedError;
use crate::market::PriceSnapshot;

/// Shared behaviour switches for a mock collaborator.
#[derive(Debug, Default)]
struct MockBehaviour {
    fail: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicUsize,
}

impl MockBehaviour {
    async fn enter(&self, what: &str) -> Result<(), FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency_ms = self.latency_ms.load(Ordering::SeqCst);
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable(format!("mock {} failure", what)));
        }
        Ok(())
    }
}

/// Mock price feed returning a configurable snapshot.
#[derive(Debug, Clone, Default)]
pub struct MockPriceFeed {
    snapshot: Arc<Mutex<PriceSnapshot>>,
    behaviour: Arc<MockBehaviour>,
}

impl MockPriceFeed {
    /// Create a feed serving `snapshot`.
    pub fn new(snapshot: PriceSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
            behaviour: Arc::default(),
        }
    }

    /// Replace the served snapshot.
    pub fn set_snapshot(&self, snapshot: PriceSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Make subsequent fetches fail or succeed.
    pub fn set_failing(&self, fail: bool) {
        self.behaviour.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay every fetch.
    pub fn set_latency(&self, latency: Duration) {
        self.behaviour
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.behaviour.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_snapshot(&self) -> Result<PriceSnapshot, FeedError> {
        self.behaviour.enter("price feed").await?;
        let snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if snapshot.is_empty() {
            return Err(FeedError::EmptySnapshot);
        }
        Ok(snapshot)
    }
}

/// Mock gas feed returning a configurable price.
#[derive(Debug, Clone)]
pub struct MockGasFeed {
    wei: Arc<AtomicU64>,
    behaviour: Arc<MockBehaviour>,
}

impl MockGasFeed {
    /// Create a feed serving `gwei`.
    pub fn from_gwei(gwei: f64) -> Self {
        Self {
            wei: Arc::new(AtomicU64::new((gwei * WEI_PER_GWEI) as u64)),
            behaviour: Arc::default(),
        }
    }

    /// Change the served price.
    pub fn set_gwei(&self, gwei: f64) {
        self.wei.store((gwei * WEI_PER_GWEI) as u64, Ordering::SeqCst);
    }

    /// Make subsequent calls fail or succeed.
    pub fn set_failing(&self, fail: bool) {
        self.behaviour.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay every call.
    pub fn set_latency(&self, latency: Duration) {
        self.behaviour
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.behaviour.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GasPriceFeed for MockGasFeed {
    fn name(&self) -> &str {
        "mock"
    }

    async fn gas_price_wei(&self) -> Result<u128, FeedError> {
        self.behaviour.enter("gas feed").await?;
        Ok(self.wei.load(Ordering::SeqCst) as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::wei_to_gwei;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn mock_price_feed_serves_snapshot() {
        let feed = MockPriceFeed::new(PriceSnapshot::new().with_rate("USDC/WETH", "uniswap", 0.00026));

        let snapshot = feed.fetch_snapshot().await.unwrap();

        assert_eq!(snapshot.quote_count(), 1);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn mock_price_feed_failure_toggles() {
        let feed = MockPriceFeed::new(PriceSnapshot::new().with_rate("USDC/WETH", "uniswap", 0.00026));

        feed.set_failing(true);
        assert_err!(feed.fetch_snapshot().await);

        feed.set_failing(false);
        assert_ok!(feed.fetch_snapshot().await);
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test]
    async fn empty_mock_snapshot_is_an_error() {
        let feed = MockPriceFeed::default();
        assert!(matches!(
            feed.fetch_snapshot().await,
            Err(FeedError::EmptySnapshot)
        ));
    }

    #[tokio::test]
    async fn mock_gas_feed_serves_price() {
        let feed = MockGasFeed::from_gwei(35.0);
        let wei = assert_ok!(feed.gas_price_wei().await);
        assert_eq!(wei_to_gwei(wei), 35.0);

        feed.set_gwei(12.0);
        assert_eq!(wei_to_gwei(feed.gas_price_wei().await.unwrap()), 12.0);

        feed.set_failing(true);
        assert_err!(feed.gas_price_wei().await);
        assert_eq!(feed.calls(), 3);
    }
}
