//! Session entry point.
//!
//! An [`Optimizer`] holds what is shared between sessions: the rule registry, the
//! cost model, the catalog and the configuration. Each call to
//! [`Optimizer::optimize`] builds a fresh memo, so concurrent sessions share no
//! mutable state and one `Optimizer` can serve many threads.

use crate::catalog::Catalog;
use crate::config::OptimizerConfig;
use crate::cost::{Cost, CostModel, DefaultCostModel};
use crate::error::{Diagnostics, Result};
use crate::expr::{JoinDistribution, JoinType, PhysicalOp};
use crate::logical::LogicalPlan;
use crate::memo::{Memo, PlanNode, RuntimeFilter};
use crate::properties::PhysicalPropertySet;
use crate::rule::RuleRegistry;
use crate::search::CascadesSearch;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Result of an optimization session.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizedPlan {
    pub plan: PlanNode,
    pub cost: Cost,
    pub diagnostics: Diagnostics,
}

pub struct Optimizer {
    registry: Arc<RuleRegistry>,
    cost_model: Arc<dyn CostModel>,
    catalog: Arc<dyn Catalog>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(registry: Arc<RuleRegistry>, catalog: Arc<dyn Catalog>, config: OptimizerConfig) -> Self {
        Self {
            registry,
            cost_model: Arc::new(DefaultCostModel::default()),
            catalog,
            config,
        }
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize a logical plan into the cheapest physical plan that delivers the
    /// configured root distribution.
    pub fn optimize(&self, plan: &LogicalPlan) -> Result<OptimizedPlan> {
        debug!("optimizing plan:\n{}", plan.explain());

        let mut memo = Memo::new();
        let root = memo.insert_plan(plan)?;
        let mut search = CascadesSearch::new(
            memo,
            Arc::clone(&self.registry),
            Arc::clone(&self.cost_model),
            Arc::clone(&self.catalog),
            self.config.search_config(),
        );
        let required = PhysicalPropertySet::with_distribution(self.config.required_root_distribution.clone());
        let (mut plan, cost) = search.optimize(root, &required)?;
        attach_runtime_filters(&mut plan, self.config.enable_global_runtime_filter);

        debug!(
            "optimized plan (cost={:.1}, groups={}, rule_applications={}):\n{}",
            cost.total,
            search.diagnostics.memo_groups,
            search.diagnostics.rule_applications,
            plan.display(0)
        );
        Ok(OptimizedPlan {
            plan,
            cost,
            diagnostics: search.diagnostics,
        })
    }
}

/// Mark hash joins whose build side can prune the probe side at runtime.
///
/// Only joins that drop probe rows without a match qualify. A broadcast join builds
/// the full filter on every node; a shuffle join only sees its partition of the
/// build side, so its filter must be merged across nodes first.
pub fn attach_runtime_filters(plan: &mut PlanNode, enable_global: bool) {
    if let PhysicalOp::HashJoin {
        join_type: JoinType::Inner | JoinType::Semi | JoinType::Right,
        distribution,
        ..
    } = &plan.op
    {
        plan.runtime_filter = match distribution {
            JoinDistribution::Broadcast => Some(RuntimeFilter::Local),
            JoinDistribution::Shuffle if enable_global => Some(RuntimeFilter::Global),
            JoinDistribution::Shuffle => None,
        };
    }
    for child in &mut plan.children {
        attach_runtime_filters(child, enable_global);
    }
}
