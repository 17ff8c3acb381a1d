//! Price and gas collaborators.
//!
//! The orchestrator only sees the [`PriceFeed`] and [`GasPriceFeed`] traits;
//! HTTP, file and mock implementations live in the submodules.

pub mod http;
pub mod local;
pub mod mock;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::market::PriceSnapshot;

pub use http::{parse_hex_quantity, HttpPriceFeed, JsonRpcGasFeed};
pub use local::{FilePriceFeed, FixedGasFeed};
pub use mock::{MockGasFeed, MockPriceFeed};

/// Wei per gwei.
pub const WEI_PER_GWEI: f64 = 1e9;

/// Source of per-tick price snapshots.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Fetch the latest snapshot. Venues that failed upstream may be absent.
    async fn fetch_snapshot(&self) -> Result<PriceSnapshot, FeedError>;
}

/// Source of the current network gas price.
#[async_trait]
pub trait GasPriceFeed: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Current gas price in wei.
    async fn gas_price_wei(&self) -> Result<u128, FeedError>;
}

/// Convert wei to gwei.
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI
}

/// Await a collaborator call, mapping an elapsed timeout to [`FeedError::Timeout`].
pub async fn with_timeout<T, F>(source_name: &str, timeout: Duration, call: F) -> Result<T, FeedError>
where
    F: Future<Output = Result<T, FeedError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(FeedError::Timeout {
            source_name: source_name.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_converts_to_gwei() {
        assert_eq!(wei_to_gwei(20_000_000_000), 20.0);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let result: Result<(), FeedError> = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(FeedError::Timeout { .. })));
    }
}
