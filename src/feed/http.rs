//! HTTP collaborators: a JSON price indexer and an `eth_gasPrice` RPC endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{GasPriceFeed, PriceFeed};
use crate::error::FeedError;
use crate::market::PriceSnapshot;
use crate::metrics;

fn build_client(timeout: Duration) -> Result<reqwest::Client, FeedError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;
    Ok(client)
}

/// Price feed that GETs a JSON snapshot.
///
/// Body shape: `{"USDC/WETH": {"uniswap": 0.00026, "sushi": {"rate": 0.00025,
/// "liquidityUSD": 1.2e6, "volumeUSD": 3.4e5}}}`.
#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    http: reqwest::Client,
    url: String,
}

impl HttpPriceFeed {
    /// Create a feed for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            http: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_snapshot(&self) -> Result<PriceSnapshot, FeedError> {
        let start = Instant::now();
        let response = self.http.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                source_name: self.name().to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        let snapshot = PriceSnapshot::from_json(&body)
            .map_err(|e| FeedError::Parse(format!("price snapshot: {}", e)))?;
        metrics::record_fetch_latency(start, self.name());

        if snapshot.is_empty() {
            return Err(FeedError::EmptySnapshot);
        }

        debug!(
            pairs = snapshot.pair_count(),
            quotes = snapshot.quote_count(),
            "Fetched price snapshot"
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Gas feed calling `eth_gasPrice` on a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct JsonRpcGasFeed {
    http: reqwest::Client,
    url: String,
}

impl JsonRpcGasFeed {
    /// Create a feed for the node at `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            http: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl GasPriceFeed for JsonRpcGasFeed {
    fn name(&self) -> &str {
        "json-rpc"
    }

    #[instrument(skip(self))]
    async fn gas_price_wei(&self) -> Result<u128, FeedError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_gasPrice",
            "params": [],
        });

        let response = self.http.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status {
                source_name: self.name().to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(format!("eth_gasPrice response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(FeedError::Unavailable(format!(
                "eth_gasPrice error {}: {}",
                err.code, err.message
            )));
        }

        let raw = body
            .result
            .ok_or_else(|| FeedError::Parse("eth_gasPrice returned no result".to_string()))?;
        let wei = parse_hex_quantity(&raw)?;
        debug!(wei = %wei, "Fetched gas price");
        Ok(wei)
    }
}

/// Parse a JSON-RPC hex quantity such as `"0x4a817c800"`.
pub fn parse_hex_quantity(raw: &str) -> Result<u128, FeedError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| FeedError::Parse(format!("quantity {:?} lacks 0x prefix", raw)))?;
    if digits.is_empty() {
        return Err(FeedError::Parse("empty hex quantity".to_string()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| FeedError::Parse(format!("quantity {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_hex_quantity("0x4a817c800").unwrap(), 20_000_000_000);
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert!(parse_hex_quantity("4a817c800").is_err());
        assert!(parse_hex_quantity("0x").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn rpc_error_body_deserializes() {
        let body: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"busy"}}"#,
        )
        .unwrap();
        assert!(body.result.is_none());
        assert_eq!(body.error.unwrap().code, -32000);
    }

    #[tokio::test]
    async fn unreachable_feed_fails() {
        let feed = HttpPriceFeed::new("http://127.0.0.1:9/prices", Duration::from_millis(500)).unwrap();
        assert!(feed.fetch_snapshot().await.is_err());
    }
}
