//! Session configuration.
//!
//! An [`OptimizerConfig`] is passed explicitly to every optimization session. It is
//! serde-deserializable with defaults for every field, so a partial JSON document
//! such as `{"test_mode": true}` is a complete configuration.

use crate::properties::DistributionSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Upper bound on transformation rule applications during exploration.
    pub max_rule_applications: usize,
    /// Exploration stops adding alternatives once the memo has this many groups.
    pub max_memo_groups: usize,
    /// Wall-clock limit for exploration. Ignored in `test_mode`.
    pub max_search_time_ms: u64,
    /// Deterministic mode: no wall-clock cutoff, so the same input always yields
    /// the same plan.
    pub test_mode: bool,
    /// Attach global runtime filters to shuffle hash joins. Broadcast hash joins
    /// always get a local runtime filter.
    pub enable_global_runtime_filter: bool,
    /// Threads used to apply transformation rules within one batch. `1` applies
    /// rules on the calling thread.
    pub parallel_workers: usize,
    /// Selects an additional connector-specific rule set.
    pub source_type: Option<String>,
    /// Distribution the final plan must deliver to the coordinator.
    pub required_root_distribution: DistributionSpec,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_rule_applications: 100_000,
            max_memo_groups: 10_000,
            max_search_time_ms: 3_000,
            test_mode: false,
            enable_global_runtime_filter: false,
            parallel_workers: 1,
            source_type: None,
            required_root_distribution: DistributionSpec::Singleton,
        }
    }
}

impl OptimizerConfig {
    /// Deterministic configuration for tests.
    pub fn for_tests() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    /// Exploration deadline, or `None` when the wall clock must not influence
    /// the result.
    pub fn search_time_limit(&self) -> Option<Duration> {
        (!self.test_mode).then(|| Duration::from_millis(self.max_search_time_ms))
    }

    /// The exploration limits of this configuration.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            max_memo_groups: self.max_memo_groups,
            max_iterations: self.max_rule_applications,
            time_limit: self.search_time_limit(),
            parallel_workers: self.parallel_workers.max(1),
            source_type: self.source_type.clone(),
        }
    }
}

/// Configuration knobs for the search algorithm.
///
/// These limits prevent runaway optimization for pathologically large queries.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Upper bound on the number of groups the memo may contain.
    pub max_memo_groups: usize,
    /// Upper bound on the number of transformation rule applications.
    pub max_iterations: usize,
    pub time_limit: Option<Duration>,
    pub parallel_workers: usize,
    /// Optional connector/source type name used to select connector-specific rules.
    pub source_type: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        OptimizerConfig::default().search_config()
    }
}
