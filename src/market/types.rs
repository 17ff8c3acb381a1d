//! Market data types: tokens, venue quotes and per-tick price snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::DataError;

/// Well-known mainnet tokens: (symbol, address, decimals).
const WELL_KNOWN_TOKENS: &[(&str, &str, u8)] = &[
    ("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
    ("USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
    ("DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18),
    ("WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18),
    ("WBTC", "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599", 8),
];

/// Decimals assumed for tokens missing from the registry.
pub const DEFAULT_DECIMALS: u8 = 18;

/// A token seen in the price feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Uppercase ticker symbol.
    pub symbol: String,
    /// Canonical on-chain address, when known.
    pub address: Option<String>,
    /// Decimal precision.
    pub decimals: u8,
}

impl Token {
    /// Resolve a token by symbol, filling in registry metadata when known.
    pub fn from_symbol(symbol: &str) -> Self {
        let symbol = symbol.trim().to_uppercase();
        match WELL_KNOWN_TOKENS.iter().find(|(s, _, _)| *s == symbol) {
            Some((_, address, decimals)) => Self {
                symbol,
                address: Some(address.to_string()),
                decimals: *decimals,
            },
            None => Self {
                symbol,
                address: None,
                decimals: DEFAULT_DECIMALS,
            },
        }
    }
}

/// One venue's quote for a pair, as delivered by the price feed.
///
/// The wire format accepts either a bare rate or an object carrying
/// liquidity and volume metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "QuoteWire")]
pub struct VenueQuote {
    /// Units of quote token per unit of base token.
    pub rate: f64,
    /// Pool liquidity in USD.
    #[serde(rename = "liquidityUSD", skip_serializing_if = "Option::is_none")]
    pub liquidity_usd: Option<f64>,
    /// Recent volume in USD.
    #[serde(rename = "volumeUSD", skip_serializing_if = "Option::is_none")]
    pub volume_usd: Option<f64>,
}

impl VenueQuote {
    /// Quote with a rate only.
    pub fn rate(rate: f64) -> Self {
        Self {
            rate,
            liquidity_usd: None,
            volume_usd: None,
        }
    }

    /// Quote with liquidity and volume metadata.
    pub fn with_metadata(rate: f64, liquidity_usd: f64, volume_usd: f64) -> Self {
        Self {
            rate,
            liquidity_usd: Some(liquidity_usd),
            volume_usd: Some(volume_usd),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuoteWire {
    Bare(f64),
    Detailed {
        rate: f64,
        #[serde(default, rename = "liquidityUSD", alias = "liquidity_usd", alias = "liquidity")]
        liquidity_usd: Option<f64>,
        #[serde(default, rename = "volumeUSD", alias = "volume_usd", alias = "volume")]
        volume_usd: Option<f64>,
    },
}

impl From<QuoteWire> for VenueQuote {
    fn from(wire: QuoteWire) -> Self {
        match wire {
            QuoteWire::Bare(rate) => VenueQuote::rate(rate),
            QuoteWire::Detailed {
                rate,
                liquidity_usd,
                volume_usd,
            } => VenueQuote {
                rate,
                liquidity_usd,
                volume_usd,
            },
        }
    }
}

/// A single observed exchange rate. Created fresh every tick, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    /// Pair key as received from the feed.
    pub pair: String,
    /// Base token symbol.
    pub base: String,
    /// Quote token symbol.
    pub quote: String,
    /// Venue tag.
    pub venue: String,
    /// Units of quote per unit of base.
    pub rate: f64,
    /// Pool liquidity in USD, when reported.
    pub liquidity_usd: Option<f64>,
    /// Recent volume in USD, when reported.
    pub volume_usd: Option<f64>,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

/// Snapshot of `pairKey -> {venue -> quote}` returned by the price feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSnapshot {
    /// Quotes keyed by pair, then venue. Ordered for deterministic scans.
    pub pairs: BTreeMap<String, BTreeMap<String, VenueQuote>>,
}

impl PriceSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Insert or replace a venue quote for a pair.
    pub fn insert(&mut self, pair: impl Into<String>, venue: impl Into<String>, quote: VenueQuote) {
        self.pairs
            .entry(pair.into())
            .or_default()
            .insert(venue.into(), quote);
    }

    /// Builder-style insert of a bare rate.
    pub fn with_rate(mut self, pair: &str, venue: &str, rate: f64) -> Self {
        self.insert(pair, venue, VenueQuote::rate(rate));
        self
    }

    /// Builder-style insert of a quote with metadata.
    pub fn with_quote(mut self, pair: &str, venue: &str, quote: VenueQuote) -> Self {
        self.insert(pair, venue, quote);
        self
    }

    /// Number of pairs.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Total number of venue quotes across all pairs.
    pub fn quote_count(&self) -> usize {
        self.pairs.values().map(|venues| venues.len()).sum()
    }

    /// Whether the snapshot holds no quotes.
    pub fn is_empty(&self) -> bool {
        self.quote_count() == 0
    }

    /// Flatten into one price point per venue quote.
    ///
    /// Every quote under a malformed pair key yields the key's parse error.
    pub fn price_points(
        &self,
        observed_at: OffsetDateTime,
    ) -> impl Iterator<Item = Result<PricePoint, DataError>> + '_ {
        self.pairs.iter().flat_map(move |(pair, venues)| {
            let tokens = parse_pair_key(pair);
            venues.iter().map(move |(venue, q)| {
                let (base, quote) = tokens.clone()?;
                Ok(PricePoint {
                    pair: pair.clone(),
                    base,
                    quote,
                    venue: venue.clone(),
                    rate: q.rate,
                    liquidity_usd: q.liquidity_usd,
                    volume_usd: q.volume_usd,
                    observed_at,
                })
            })
        })
    }
}

/// Split a pair key such as `USDC/WETH` into uppercase (base, quote).
pub fn parse_pair_key(key: &str) -> Result<(String, String), DataError> {
    let (base, quote) = key
        .split_once('/')
        .or_else(|| key.split_once('-'))
        .ok_or_else(|| DataError::MalformedPair(key.to_string()))?;

    let base = base.trim().to_uppercase();
    let quote = quote.trim().to_uppercase();

    if base.is_empty() || quote.is_empty() || base == quote || quote.contains('/') {
        return Err(DataError::MalformedPair(key.to_string()));
    }

    Ok((base, quote))
}
