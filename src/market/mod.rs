//! Market module for per-tick price data.
//!
//! This module handles:
//! - Token, quote and snapshot types
//! - Pair key parsing
//! - Market graph construction

pub mod graph;
pub mod types;

pub use graph::{BuildReport, Edge, GraphConfig, MarketGraph, PairQuotes};
pub use types::{parse_pair_key, PricePoint, PriceSnapshot, Token, VenueQuote};
