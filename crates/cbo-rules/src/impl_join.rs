//! # Join Implementation Rules
//!
//! This module provides two implementation rules that map a logical Join to
//! physical join operators. Every physical join also chooses how its inputs meet,
//! and that choice usually dominates its cost:
//!
//! ## Hash Join (`ImplHashJoinRule`)
//!
//! The workhorse join algorithm for most queries. Builds a hash table on the right
//! input (the "build side") and probes it with rows from the left input. Produces up
//! to two distribution alternatives per join:
//!
//! - **Shuffle**: both inputs hash-partitioned on their join keys. Moves both inputs
//!   once; scales with large build sides.
//! - **Broadcast**: the build side is replicated to every node and the probe side
//!   stays where it is. Moves `nodes × build_bytes`; wins when the build side is
//!   small. Not offered for right and full joins, whose unmatched build rows would
//!   be emitted once per node.
//!
//! Join commutativity puts each input on the build side in turn.
//!
//! **Requires**: at least one equality between a left column and a right column.
//! **Cost**: O(build_rows) memory + O(build_rows + probe_rows) CPU.
//!
//! ## Nested Loop Join (`ImplNestedLoopJoinRule`)
//!
//! The universal fallback: for each left row, scans all right rows. Always
//! applicable (works with any join condition, including non-equi predicates and
//! cross joins), but O(n * m) makes it prohibitively expensive for large inputs.
//!
//! **Requires**: nothing (always applicable).
//! **Cost**: O(left_rows * right_rows) CPU.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Implement logical join as a shuffled or broadcast hash join.
pub struct ImplHashJoinRule;

impl Rule for ImplHashJoinRule {
    fn name(&self) -> &str {
        "ImplHashJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &expr.op
        else {
            return vec![];
        };
        if expr.children.len() != 2 {
            return vec![];
        }

        let columns_of = |i: usize| &memo.group(expr.children[i]).logical_props.output_columns;
        if equi_join_keys(condition, columns_of(0), columns_of(1)).is_empty() {
            return vec![];
        }

        let mut distributions = vec![JoinDistribution::Shuffle];
        if join_type.allows_broadcast_right() {
            distributions.push(JoinDistribution::Broadcast);
        }

        distributions
            .into_iter()
            .map(|distribution| {
                RuleResult::Substitution(
                    Operator::Physical(PhysicalOp::HashJoin {
                        join_type: *join_type,
                        condition: condition.clone(),
                        distribution,
                    }),
                    expr.children.clone(),
                )
            })
            .collect()
    }
}

/// Implement logical join as a nested loop join (universal fallback).
pub struct ImplNestedLoopJoinRule;

impl Rule for ImplNestedLoopJoinRule {
    fn name(&self) -> &str {
        "ImplNestedLoopJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &expr.op
        else {
            return vec![];
        };

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::NestedLoopJoin {
                join_type: *join_type,
                condition: condition.clone(),
            }),
            expr.children.clone(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbo_core::catalog::InMemoryCatalog;

    fn col(table: &str, name: &str) -> ColumnRef {
        ColumnRef::new(Some(table), name, 0, DataType::Int64)
    }

    fn apply_hash(join_type: JoinType, condition: Expr) -> Vec<RuleResult> {
        let mut memo = Memo::new();
        let mut scan = |name: &str| {
            memo.add_expr(
                Operator::Logical(LogicalOp::Scan {
                    table: TableRef::new("s", name),
                    columns: vec![col(name, "k")],
                    predicate: None,
                }),
                vec![],
            )
            .0
        };
        let (a, b) = (scan("a"), scan("b"));
        let (_, j) = memo.add_expr(Operator::Logical(LogicalOp::Join { join_type, condition }), vec![a, b]);
        let catalog = InMemoryCatalog::new();
        ImplHashJoinRule.apply(memo.expr(j), &memo, &OptContext { catalog: &catalog })
    }

    fn distributions(results: &[RuleResult]) -> Vec<JoinDistribution> {
        results
            .iter()
            .filter_map(|r| match r {
                RuleResult::Substitution(Operator::Physical(PhysicalOp::HashJoin { distribution, .. }), _) => {
                    Some(*distribution)
                }
                _ => None,
            })
            .collect()
    }

    fn equi() -> Expr {
        Expr::binary(BinaryOp::Eq, Expr::column(&col("a", "k")), Expr::column(&col("b", "k")))
    }

    #[test]
    fn test_inner_join_offers_both_distributions() {
        assert_eq!(
            distributions(&apply_hash(JoinType::Inner, equi())),
            vec![JoinDistribution::Shuffle, JoinDistribution::Broadcast]
        );
    }

    #[test]
    fn test_full_join_is_never_broadcast() {
        assert_eq!(distributions(&apply_hash(JoinType::Full, equi())), vec![JoinDistribution::Shuffle]);
    }

    #[test]
    fn test_non_equi_join_has_no_hash_join() {
        let cond = Expr::binary(BinaryOp::Lt, Expr::column(&col("a", "k")), Expr::column(&col("b", "k")));
        assert!(apply_hash(JoinType::Inner, cond).is_empty());
    }
}
