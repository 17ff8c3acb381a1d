//! Cross-venue DEX arbitrage detection engine.
//!
//! Every tick the engine pulls a snapshot of venue quotes, turns it into a
//! directed token multigraph, and looks for two kinds of opportunity:
//!
//! ```text
//! Direct:      USDC/WETH  sushi 0.00025  uniswap 0.00026  ->  spread 4.0%
//! Triangular:  WETH -> USDC -> DAI -> WETH, rate product 1.012  ->  1.2%
//! ```
//!
//! Candidates are priced against a gas/fee/slippage cost model, alerted on
//! with per-route cooldowns, cached for readers and published downstream.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Price snapshots and the market graph
//! - [`feed`]: Price and gas collaborators
//! - [`arbitrage`]: Scanners, cycle finder and validator
//! - [`cache`]: Namespaced TTL/LRU cache
//! - [`alerts`]: Cooldown-gated alert dispatcher
//! - [`engine`]: Refresh orchestrator, publishing and execution hand-off
//! - [`api`]: HTTP API for health, queries and metrics
//! - [`utils`]: Utility functions

pub mod alerts;
pub mod api;
pub mod arbitrage;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod market;
pub mod metrics;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, Result};
