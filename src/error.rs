//! Unified error types for the arbitrage engine.

use thiserror::Error;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Collaborator fetch error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Downstream publish error.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An individual quote or spread that is outside sane bounds.
///
/// Always dropped with a diagnostic counter increment, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Rate is NaN, infinite, zero or negative.
    #[error("invalid rate {rate} for {pair} on {venue}")]
    InvalidRate {
        /// Pair key as received.
        pair: String,
        /// Venue tag.
        venue: String,
        /// Offending rate.
        rate: f64,
    },

    /// Rate is above the configured sanity ceiling.
    #[error("rate {rate} for {pair} on {venue} exceeds ceiling {ceiling}")]
    RateAboveCeiling {
        /// Pair key as received.
        pair: String,
        /// Venue tag.
        venue: String,
        /// Offending rate.
        rate: f64,
        /// Configured ceiling.
        ceiling: f64,
    },

    /// Pair key could not be split into two tokens.
    #[error("malformed pair key: {0}")]
    MalformedPair(String),

    /// Cross-venue spread too large to be a real price difference.
    #[error("unrealistic spread {spread_pct:.4}% on {pair}")]
    UnrealisticSpread {
        /// Pair key.
        pair: String,
        /// Observed spread in percent.
        spread_pct: f64,
    },
}

/// A collaborator call failed or timed out.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The call exceeded its timeout.
    #[error("{source_name} timed out after {timeout_secs}s")]
    Timeout {
        /// Which collaborator timed out.
        source_name: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("{source_name} returned status {status}")]
    Status {
        /// Which collaborator answered.
        source_name: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be interpreted.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Snapshot contained no quotes at all.
    #[error("price snapshot is empty")]
    EmptySnapshot,

    /// Collaborator is not available.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// IO error reading a local snapshot.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unexpected fault while evaluating one candidate.
///
/// The candidate is dropped and logged; the tick continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    /// A computed value came out NaN or infinite.
    #[error("non-finite {field} while evaluating {route}")]
    NonFinite {
        /// Route identifier of the candidate.
        route: String,
        /// Which quantity was not finite.
        field: &'static str,
    },

    /// Candidate has no hops to price.
    #[error("candidate {0} has no hops")]
    EmptyRoute(String),
}

/// Failure handing results to a downstream consumer.
#[derive(Error, Debug)]
pub enum PublishError {
    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("webhook returned status {0}")]
    Status(u16),

    /// No receiver is listening.
    #[error("channel closed")]
    ChannelClosed,

    /// Receiver is not keeping up.
    #[error("channel full")]
    ChannelFull,
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;
