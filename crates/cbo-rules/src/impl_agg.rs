//! # Aggregate Implementation Rule
//!
//! ## Hash Aggregate (`ImplHashAggregateRule`)
//!
//! Uses a hash table keyed by the group-by columns. Each input row is hashed and
//! routed to the corresponding bucket, where the aggregate accumulators are updated.
//! Works with any input ordering.
//!
//! In a distributed plan the input must be hash-partitioned on the group keys so
//! that every group is complete on one node; a global aggregate (no group keys)
//! runs on a single node. The plan selector adds the exchange that establishes
//! this.
//!
//! **Cost trade-off**: O(n) CPU + O(groups) memory.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Implement logical aggregate as a hash aggregate.
pub struct ImplHashAggregateRule;

impl Rule for ImplHashAggregateRule {
    fn name(&self) -> &str {
        "ImplHashAggregate"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Aggregate {
            group_by,
            aggregates,
        }) = &expr.op
        else {
            return vec![];
        };

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::HashAggregate {
                group_by: group_by.clone(),
                aggregates: aggregates.clone(),
            }),
            expr.children.clone(),
        )]
    }
}
