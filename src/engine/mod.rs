//! Engine module tying the components into a refresh loop.
//!
//! This module handles:
//! - The per-tick refresh orchestrator
//! - Result bundles and scan statistics
//! - Publishing to downstream consumers
//! - Execution hand-off

pub mod bundle;
pub mod execution;
pub mod orchestrator;
pub mod publish;

pub use bundle::{DataSource, LastGoodSnapshot, LatestOpportunities, ResultBundle, ScanStats};
pub use execution::{ChannelExecutionSink, ExecutionDescriptor, ExecutionSink};
pub use orchestrator::{
    evaluate_snapshot, Evaluation, OrchestratorConfig, RefreshOrchestrator,
    LAST_GOOD_SNAPSHOT_KEY, LATEST_OPPORTUNITIES_KEY, LATEST_SCAN_STATS_KEY,
};
pub use publish::{
    BroadcastPublisher, FanoutPublisher, LogPublisher, PublishedEvent, Publisher,
    WebhookPublisher,
};
