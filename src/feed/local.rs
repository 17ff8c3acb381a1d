//! Offline collaborators: a snapshot file and a constant gas price.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{GasPriceFeed, PriceFeed, WEI_PER_GWEI};
use crate::error::FeedError;
use crate::market::PriceSnapshot;

/// Price feed reading a JSON snapshot from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FilePriceFeed {
    path: PathBuf,
}

impl FilePriceFeed {
    /// Create a feed for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceFeed for FilePriceFeed {
    fn name(&self) -> &str {
        "file"
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch_snapshot(&self) -> Result<PriceSnapshot, FeedError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let snapshot = PriceSnapshot::from_json(&text)
            .map_err(|e| FeedError::Parse(format!("{}: {}", self.path.display(), e)))?;

        if snapshot.is_empty() {
            return Err(FeedError::EmptySnapshot);
        }

        debug!(pairs = snapshot.pair_count(), "Loaded price snapshot");
        Ok(snapshot)
    }
}

/// Gas feed returning a constant price.
#[derive(Debug, Clone, Copy)]
pub struct FixedGasFeed {
    wei: u128,
}

impl FixedGasFeed {
    /// Constant price in gwei.
    pub fn from_gwei(gwei: f64) -> Self {
        Self {
            wei: (gwei.max(0.0) * WEI_PER_GWEI).round() as u128,
        }
    }
}

#[async_trait]
impl GasPriceFeed for FixedGasFeed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn gas_price_wei(&self) -> Result<u128, FeedError> {
        Ok(self.wei)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::wei_to_gwei;

    #[tokio::test]
    async fn reads_snapshot_file() {
        let path = std::env::temp_dir().join(format!("dex-arb-snapshot-{}.json", std::process::id()));
        tokio::fs::write(
            &path,
            r#"{"USDC/WETH": {"uniswap": 0.00026, "sushi": {"rate": 0.00025, "liquidityUSD": 250000}}}"#,
        )
        .await
        .unwrap();

        let snapshot = FilePriceFeed::new(&path).fetch_snapshot().await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(snapshot.pair_count(), 1);
        assert_eq!(snapshot.quote_count(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let feed = FilePriceFeed::new("/nonexistent/dex-arb/prices.json");
        assert!(matches!(feed.fetch_snapshot().await, Err(FeedError::Io(_))));
    }

    #[tokio::test]
    async fn fixed_gas_round_trips_gwei() {
        let wei = FixedGasFeed::from_gwei(20.0).gas_price_wei().await.unwrap();
        assert_eq!(wei_to_gwei(wei), 20.0);
    }
}
