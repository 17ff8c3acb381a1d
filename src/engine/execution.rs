//! Hand-off of profitable opportunities to the execution collaborator.
//!
//! The engine never waits on execution. Sinks must return immediately; a
//! sink that cannot accept a descriptor reports an error which the caller
//! logs and drops.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::arbitrage::{OpportunityKind, ValidatedOpportunity};
use crate::error::{DataError, PublishError};
use crate::market::parse_pair_key;

/// Structured route description for on-chain execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDescriptor {
    /// Opportunity identifier.
    pub opportunity_id: String,
    /// `direct` or `triangular`.
    pub kind: String,
    /// Tokens visited, starting and ending with the same token.
    pub token_path: Vec<String>,
    /// Venue used by each hop. One shorter than `token_path`.
    pub venue_path: Vec<String>,
    /// Expected rate of each hop.
    pub expected_rates: Vec<f64>,
    /// Modeled net profit in percent.
    pub net_profit_pct: f64,
    /// Shallowest liquidity along the route, in USD.
    pub min_liquidity_usd: f64,
    /// When the opportunity was detected.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl TryFrom<&ValidatedOpportunity> for ExecutionDescriptor {
    type Error = DataError;

    fn try_from(opp: &ValidatedOpportunity) -> Result<Self, Self::Error> {
        let (token_path, venue_path, expected_rates) = match &opp.kind {
            // spend quote on the cheap venue, sell base back on the dear one
            OpportunityKind::Direct {
                pair,
                buy_venue,
                sell_venue,
                buy_rate,
                sell_rate,
                ..
            } => {
                let (base, quote) = parse_pair_key(pair)?;
                (
                    vec![quote.clone(), base, quote],
                    vec![buy_venue.clone(), sell_venue.clone()],
                    vec![1.0 / buy_rate, *sell_rate],
                )
            }
            OpportunityKind::Triangular {
                token_path,
                venue_path,
                edges,
            } => (
                token_path.clone(),
                venue_path.clone(),
                edges.iter().map(|leg| leg.rate).collect(),
            ),
        };

        Ok(Self {
            opportunity_id: opp.id.clone(),
            kind: opp.kind.label().to_string(),
            token_path,
            venue_path,
            expected_rates,
            net_profit_pct: opp.net_profit_pct,
            min_liquidity_usd: opp.min_liquidity_usd,
            detected_at: opp.detected_at,
        })
    }
}

/// Receives execution descriptors without blocking the caller.
pub trait ExecutionSink: Send + Sync {
    /// Submit one descriptor. Must not wait for the outcome.
    fn submit(&self, descriptor: ExecutionDescriptor) -> Result<(), PublishError>;
}

/// Sink backed by a bounded mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelExecutionSink {
    tx: mpsc::Sender<ExecutionDescriptor>,
}

impl ChannelExecutionSink {
    /// Create a sink and the receiver an executor drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ExecutionDescriptor>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ExecutionSink for ChannelExecutionSink {
    fn submit(&self, descriptor: ExecutionDescriptor) -> Result<(), PublishError> {
        self.tx.try_send(descriptor).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::ChannelClosed,
        })
    }
}
