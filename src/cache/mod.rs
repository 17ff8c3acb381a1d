//! Namespaced TTL cache for prices, pools, opportunities and market snapshots.
//!
//! Each namespace has its own TTL and capacity. Reads are lock-free with
//! respect to writers; writes take a per-namespace lock, so a write to one
//! namespace never blocks reads or writes of another.

mod store;

use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumString};

use crate::config::Config;

pub use store::{CacheEntry, CacheStats, NamespaceStats, OpportunityCache};

/// Cache namespace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Namespace {
    /// Raw price points.
    Prices,
    /// Pool metadata.
    Pools,
    /// Validated opportunities.
    Opportunities,
    /// Whole market snapshots.
    MarketSnapshots,
}

impl Namespace {
    /// All namespaces in storage order.
    pub const ALL: [Namespace; 4] = [
        Namespace::Prices,
        Namespace::Pools,
        Namespace::Opportunities,
        Namespace::MarketSnapshots,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            Namespace::Prices => 0,
            Namespace::Pools => 1,
            Namespace::Opportunities => 2,
            Namespace::MarketSnapshots => 3,
        }
    }
}

/// TTL and capacity of one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespacePolicy {
    /// Entries are visible while younger than this.
    pub ttl: Duration,
    /// Maximum entries before LRU eviction.
    pub capacity: usize,
}

impl NamespacePolicy {
    /// Create a policy.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { ttl, capacity }
    }
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Policies indexed by namespace.
    pub policies: [NamespacePolicy; 4],
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Policy for a namespace.
    pub fn policy(&self, ns: Namespace) -> NamespacePolicy {
        self.policies[ns.slot()]
    }

    /// Override the policy for one namespace.
    pub fn with_policy(mut self, ns: Namespace, policy: NamespacePolicy) -> Self {
        self.policies[ns.slot()] = policy;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policies: [
                NamespacePolicy::new(Duration::from_secs(15), 500),
                NamespacePolicy::new(Duration::from_secs(30), 200),
                NamespacePolicy::new(Duration::from_secs(30), 200),
                NamespacePolicy::new(Duration::from_secs(60), 100),
            ],
            sweep_interval: Duration::from_secs(120),
        }
    }
}

impl From<&Config> for CacheConfig {
    fn from(config: &Config) -> Self {
        Self {
            policies: [
                NamespacePolicy::new(
                    Duration::from_secs(config.cache_prices_ttl_secs),
                    config.cache_prices_capacity,
                ),
                NamespacePolicy::new(
                    Duration::from_secs(config.cache_pools_ttl_secs),
                    config.cache_pools_capacity,
                ),
                NamespacePolicy::new(
                    Duration::from_secs(config.cache_opportunities_ttl_secs),
                    config.cache_opportunities_capacity,
                ),
                NamespacePolicy::new(
                    Duration::from_secs(config.cache_snapshots_ttl_secs),
                    config.cache_snapshots_capacity,
                ),
            ],
            sweep_interval: Duration::from_secs(config.cache_sweep_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn namespace_names_are_camel_case() {
        assert_eq!(Namespace::MarketSnapshots.to_string(), "marketSnapshots");
        assert_eq!(
            Namespace::from_str("opportunities").unwrap(),
            Namespace::Opportunities
        );
    }

    #[test]
    fn config_maps_each_namespace() {
        let config = Config {
            cache_pools_ttl_secs: 45,
            cache_snapshots_capacity: 7,
            ..Default::default()
        };
        let cache = CacheConfig::from(&config);

        assert_eq!(cache.policy(Namespace::Pools).ttl, Duration::from_secs(45));
        assert_eq!(cache.policy(Namespace::MarketSnapshots).capacity, 7);
        assert_eq!(cache.policy(Namespace::Prices).ttl, Duration::from_secs(15));
    }
}
