//! Alert classification, cooldown suppression and system-health alerts.

mod dispatcher;
mod types;

pub use dispatcher::AlertDispatcher;
pub use types::{
    AlertConfig, AlertEvent, AlertRecord, AlertStats, AlertType, MarketStats, Severity,
};
