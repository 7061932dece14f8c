//! # Cascades Search Algorithm
//!
//! This module implements the core Cascades-style query optimization search.
//! The Cascades framework (originally proposed by Goetz Graefe) is a cost-based optimizer
//! that uses memoization to efficiently explore the space of equivalent query plans.
//!
//! ## How It Works
//!
//! 1. **Explore**: the [`ExplorationEngine`] applies transformation rules to the whole
//!    memo until a fixed point or the session budget. For example, join commutativity
//!    adds `B JOIN A` to the group of `A JOIN B`.
//!
//! 2. **Optimize top-down**: `optimize_group(group, required)` finds the cheapest
//!    physical plan of a group that delivers the required properties:
//!    - derive the group's statistics if they are missing;
//!    - apply implementation rules to each logical expression, once;
//!    - for every physical expression and every child requirement alternative it
//!      offers, optimize the children, compute the delivered properties and the
//!      cost, and keep the best candidate that satisfies `required`;
//!    - consider each enforcer that can establish `required`, costed over the same
//!      group optimized for weaker properties.
//!
//! The best candidate is stored as the group's [`Winner`] for `required`, so each
//! (group, properties) subproblem is solved once.
//!
//! ## Cost Comparison
//!
//! A candidate's cost is its local cost plus the costs of its child winners. Ties
//! are broken by the number of exchanges in the subtree, then by discovery order,
//! so that a session is deterministic.
//!
//! ## Recursion Guard
//!
//! A subproblem that is reached again while it is being solved (through an enforcer
//! whose input is its own group) yields no candidate instead of recursing forever.

use crate::catalog::Catalog;
use crate::config::SearchConfig;
use crate::cost::{Cost, CostModel};
use crate::derive::StatsDeriver;
use crate::enforcer::{child_requirements, delivered_properties, enforcers_for};
use crate::engine::{insert_rule_result, ExplorationEngine};
use crate::error::{Diagnostics, OptimizerError, Result};
use crate::expr::*;
use crate::memo::{BestPlan, ExprId, GroupId, Memo, PlanNode, Winner};
use crate::pattern::matches;
use crate::properties::PhysicalPropertySet;
use crate::rule::{OptContext, RuleRegistry};
use crate::stats::Statistics;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// The Cascades search engine.
///
/// Owns the memo table and orchestrates exploration and costing. One instance
/// serves one optimization session.
pub struct CascadesSearch {
    /// The memo table storing all groups and expressions in the search space.
    pub memo: Memo,
    /// Registry of transformation and implementation rules to apply.
    pub rule_registry: Arc<RuleRegistry>,
    /// Cost model used to estimate the expense of physical operators.
    pub cost_model: Arc<dyn CostModel>,
    /// Catalog providing table metadata and statistics.
    pub catalog: Arc<dyn Catalog>,
    /// Configuration limits for the search.
    pub config: SearchConfig,
    /// Warnings and counters of this session.
    pub diagnostics: Diagnostics,
    in_progress: HashSet<(GroupId, PhysicalPropertySet)>,
    /// Discovery counter for candidates.
    seq: u64,
}

impl CascadesSearch {
    pub fn new(
        memo: Memo,
        rule_registry: Arc<RuleRegistry>,
        cost_model: Arc<dyn CostModel>,
        catalog: Arc<dyn Catalog>,
        config: SearchConfig,
    ) -> Self {
        Self {
            memo,
            rule_registry,
            cost_model,
            catalog,
            config,
            diagnostics: Diagnostics::default(),
            in_progress: HashSet::new(),
            seq: 0,
        }
    }

    /// Run the Cascades optimization starting from the root group.
    pub fn optimize(&mut self, root_group: GroupId, required_props: &PhysicalPropertySet) -> Result<(PlanNode, Cost)> {
        debug!(
            "Starting Cascades optimization: root_group={}, groups={}, exprs={}",
            root_group,
            self.memo.num_groups(),
            self.memo.num_exprs()
        );

        let registry = Arc::clone(&self.rule_registry);
        let catalog = Arc::clone(&self.catalog);
        ExplorationEngine::new(&registry, catalog.as_ref(), &self.config)
            .explore(&mut self.memo, &mut self.diagnostics)?;

        let root = self.memo.find(root_group);
        self.optimize_group(root, required_props)?;

        self.diagnostics.memo_groups = self.memo.num_groups();
        self.diagnostics.memo_exprs = self.memo.num_exprs();

        match self.memo.get_best_plan(root, required_props) {
            BestPlan::Found(plan, cost) => {
                debug!(
                    "Optimization complete: cost={:.1}, rule_applications={}",
                    cost.total, self.diagnostics.rule_applications
                );
                Ok((plan, cost))
            }
            BestPlan::NotDerived => {
                debug!("Optimization failed: no valid plan found");
                Err(OptimizerError::NoPlanFound {
                    group: root,
                    required: required_props.to_string(),
                })
            }
        }
    }

    /// Best plan of a group under `required`, solving the subproblem on first use.
    ///
    /// Returns `None` when no physical alternative can deliver `required`, or when the
    /// subproblem is already being solved further up the recursion.
    fn optimize_group(&mut self, group_id: GroupId, required: &PhysicalPropertySet) -> Result<Option<Winner>> {
        let group_id = self.memo.find(group_id);
        if let Some(winner) = self.memo.group(group_id).winners.get(required) {
            return Ok(Some(winner.clone()));
        }

        let key = (group_id, required.clone());
        if !self.in_progress.insert(key.clone()) {
            return Ok(None);
        }
        let result = self.solve(group_id, required);
        self.in_progress.remove(&key);
        result
    }

    fn solve(&mut self, group_id: GroupId, required: &PhysicalPropertySet) -> Result<Option<Winner>> {
        self.group_stats(group_id);
        self.implement_group(group_id)?;
        let group_id = self.memo.find(group_id);

        let mut best: Option<Winner> = None;
        let physical: Vec<ExprId> = self.memo.group(group_id).physical_exprs.clone();
        for expr_id in physical {
            let expr = self.memo.expr(expr_id).clone();
            let Operator::Physical(op) = &expr.op else {
                continue;
            };
            // Enforcers are only considered for the requirement they establish.
            if op.is_enforcer() {
                continue;
            }

            let child_columns: Vec<Vec<ColumnRef>> = expr
                .children
                .iter()
                .map(|c| self.memo.group(*c).logical_props.output_columns.clone())
                .collect();
            for alternative in child_requirements(op, required, &child_columns) {
                let Some(candidate) = self.cost_candidate(group_id, expr_id, op, &expr.children, alternative)? else {
                    continue;
                };
                if required.satisfied_by(&candidate.delivered) && best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        }

        for (enforcer, relaxed) in enforcers_for(required) {
            let expr_id = self
                .memo
                .add_expr_to_group(group_id, Operator::Physical(enforcer.clone()), vec![group_id])?;
            let Some(candidate) = self.cost_candidate(group_id, expr_id, &enforcer, &[group_id], vec![relaxed])? else {
                continue;
            };
            if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }

        if let Some(ref winner) = best {
            trace!(
                "New best for group {} with props {}: expr={}, cost={:.1}",
                group_id,
                required,
                winner.expr_id,
                winner.cost.total
            );
            self.memo
                .group_mut(group_id)
                .winners
                .insert(required.clone(), winner.clone());
        }
        Ok(best)
    }

    /// Apply implementation rules to every logical expression of a group that has
    /// not been implemented yet. The rule bitmap makes this idempotent.
    fn implement_group(&mut self, group_id: GroupId) -> Result<()> {
        let registry = Arc::clone(&self.rule_registry);
        let catalog = Arc::clone(&self.catalog);
        let rules = registry.implementation_rules(self.config.source_type.as_deref());
        let ctx = OptContext {
            catalog: catalog.as_ref(),
        };

        let logical_exprs = self.memo.group(group_id).logical_exprs.clone();
        for expr_id in logical_exprs {
            for (rule_id, rule) in &rules {
                if self.memo.rule_applied(expr_id, *rule_id) || !matches(&self.memo, expr_id, &rule.pattern()) {
                    continue;
                }
                trace!("Applying implementation rule '{}' to expr {}", rule.name(), expr_id);
                let results = rule.apply(self.memo.expr(expr_id), &self.memo, &ctx);
                self.memo.mark_rule_applied(expr_id, *rule_id);
                for result in results {
                    insert_rule_result(&mut self.memo, group_id, result)?;
                }
            }
        }
        Ok(())
    }

    /// Cost one physical expression under one child requirement vector.
    fn cost_candidate(
        &mut self,
        group_id: GroupId,
        expr_id: ExprId,
        op: &PhysicalOp,
        children: &[GroupId],
        child_props: Vec<PhysicalPropertySet>,
    ) -> Result<Option<Winner>> {
        let mut child_costs = Vec::with_capacity(children.len());
        let mut child_stats = Vec::with_capacity(children.len());
        let mut child_delivered = Vec::with_capacity(children.len());
        let mut exchanges = 0;

        for (child, props) in children.iter().zip(&child_props) {
            let Some(winner) = self.optimize_group(*child, props)? else {
                return Ok(None);
            };
            child_costs.push(winner.cost);
            child_delivered.push(winner.delivered);
            exchanges += winner.exchanges;
            child_stats.push(self.group_stats(*child));
        }

        let output = self.group_stats(group_id);
        let stats_refs: Vec<&Statistics> = child_stats.iter().map(|s| s.as_ref()).collect();
        let cost = self.cost_model.compute_cost(op, &output, &stats_refs, &child_costs);

        let scan_distribution = match op {
            PhysicalOp::SeqScan { table, .. } => self.catalog.get_table_distribution(table),
            _ => None,
        };
        let delivered = delivered_properties(op, &child_delivered, scan_distribution.as_ref());
        if op.is_exchange() {
            exchanges += 1;
        }

        self.seq += 1;
        Ok(Some(Winner {
            expr_id,
            cost,
            child_props,
            delivered,
            exchanges,
            seq: self.seq,
        }))
    }

    fn group_stats(&mut self, group_id: GroupId) -> Arc<Statistics> {
        StatsDeriver::new(self.catalog.as_ref(), &mut self.diagnostics).group_stats(&mut self.memo, group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::cost::DefaultCostModel;
    use crate::logical::LogicalPlan;
    use crate::memo::MemoExpr;
    use crate::pattern::Pattern;
    use crate::properties::{DistributionSpec, OrderSpec};
    use crate::rule::{Rule, RuleResult, RuleType};

    struct ImplScan;

    impl Rule for ImplScan {
        fn name(&self) -> &str {
            "impl_scan"
        }
        fn rule_type(&self) -> RuleType {
            RuleType::Implementation
        }
        fn pattern(&self) -> Pattern {
            Pattern::scan()
        }
        fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
            match &expr.op {
                Operator::Logical(LogicalOp::Scan {
                    table,
                    columns,
                    predicate,
                }) => vec![RuleResult::Substitution(
                    Operator::Physical(PhysicalOp::SeqScan {
                        table: table.clone(),
                        columns: columns.clone(),
                        predicate: predicate.clone(),
                    }),
                    vec![],
                )],
                _ => vec![],
            }
        }
    }

    fn search_for(plan: &LogicalPlan) -> (CascadesSearch, GroupId) {
        let table = TableRef::new("s", "t");
        let mut catalog = InMemoryCatalog::new();
        catalog.add_table(
            &table,
            vec![ColumnRef::new(Some("t"), "x", 0, DataType::Int64)],
            Statistics::new(1000.0, 8000.0),
        );
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(ImplScan));

        let mut memo = Memo::new();
        let root = memo.insert_plan(plan).unwrap();
        let search = CascadesSearch::new(
            memo,
            Arc::new(registry),
            Arc::new(DefaultCostModel::default()),
            Arc::new(catalog),
            SearchConfig::default(),
        );
        (search, root)
    }

    fn scan() -> LogicalPlan {
        LogicalPlan::scan(
            TableRef::new("s", "t"),
            vec![ColumnRef::new(Some("t"), "x", 0, DataType::Int64)],
        )
        .unwrap()
    }

    #[test]
    fn test_gather_enforced_at_root() {
        let (mut search, root) = search_for(&scan());
        let (plan, cost) = search.optimize(root, &PhysicalPropertySet::singleton()).unwrap();

        assert!(matches!(
            plan.op,
            PhysicalOp::Exchange {
                kind: ExchangeKind::Gather
            }
        ));
        assert!(matches!(plan.children[0].op, PhysicalOp::SeqScan { .. }));
        assert!(cost >= plan.children[0].cost);
        assert_eq!(plan.delivered.distribution, DistributionSpec::Singleton);
    }

    #[test]
    fn test_sort_then_gather() {
        let x = ColumnRef::new(Some("t"), "x", 0, DataType::Int64);
        let required = PhysicalPropertySet::new(
            DistributionSpec::Singleton,
            OrderSpec::Sorted(vec![SortKey::asc(Expr::column(&x))]),
        );
        let (mut search, root) = search_for(&scan());
        let (plan, _) = search.optimize(root, &required).unwrap();

        assert!(matches!(plan.op, PhysicalOp::LocalSort { .. }));
        assert!(matches!(plan.children[0].op, PhysicalOp::Exchange { .. }));
        assert!(required.satisfied_by(&plan.delivered));
    }

    #[test]
    fn test_missing_implementation_is_no_plan() {
        let plan = LogicalPlan::limit(0, 10, scan()).unwrap();
        let (mut search, root) = search_for(&plan);
        let err = search.optimize(root, &PhysicalPropertySet::any()).unwrap_err();
        assert!(matches!(err, OptimizerError::NoPlanFound { .. }));
    }
}
