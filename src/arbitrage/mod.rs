//! Arbitrage module for detecting and validating opportunities.
//!
//! This module handles:
//! - Cross-venue spread detection per pair
//! - Triangular and multi-hop cycle search
//! - Cost-adjusted profitability validation

pub mod cycles;
pub mod direct;
pub mod scanner;
pub mod types;
pub mod validator;

pub use cycles::{find_cycles, CycleScanOutcome};
pub use direct::{scan_direct, DirectScanOutcome};
pub use scanner::{CycleStrategy, ScanOutcome, ScannerConfig};
pub use types::{
    CostBreakdown, CycleLeg, OpportunityCandidate, OpportunityKind, QualityTier,
    RejectedCandidate, RejectedSample, RejectionReason, ValidatedOpportunity,
};
pub use validator::{validate, validate_all, CostModel, ValidationOutcome};
