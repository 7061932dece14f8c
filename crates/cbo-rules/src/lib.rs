//! # Built-in Optimization Rules
//!
//! This crate provides the default set of optimization rules for the Cascades search
//! engine. Rules are divided into two categories:
//!
//! ## Transformation Rules (Logical -> Logical)
//!
//! These rules expand the search space by generating equivalent logical alternatives:
//!
//! - **`JoinCommutativityRule`**: Swaps the sides of inner and cross joins
//!   (A JOIN B -> B JOIN A), so each side is considered as the build side.
//! - **`JoinAssociativityRule`**: Changes join grouping
//!   ((A JOIN B) JOIN C -> A JOIN (B JOIN C)) without introducing cross joins.
//! - **`PredicatePushdownRule`**: Moves filter conjuncts below joins and into join
//!   conditions, as far as the join type allows.
//! - **`ProjectionPushdownRule`**: Narrows table scans to the columns a projection
//!   reads.
//! - **`SetOpFilterPushdownRule`**: Pushes a filter into every input of a set
//!   operation, remapping columns by position.
//! - **`SetOpMergeRule`**: Flattens nested set operations into one n-ary operation.
//! - **`UnionDistinctToAggregateRule`**: Rewrites UNION DISTINCT as a grouping
//!   aggregate over UNION ALL.
//!
//! ## Implementation Rules (Logical -> Physical)
//!
//! These rules produce physical operator alternatives that the cost model scores:
//!
//! - **`ImplSeqScanRule`**: Scan as a sequential (full) table scan.
//! - **`ImplFilterRule`**, **`ImplProjectRule`**, **`ImplSortRule`**,
//!   **`ImplLimitRule`**: one-to-one mappings.
//! - **`ImplHashJoinRule`**: Join as a shuffled or broadcast hash join.
//! - **`ImplNestedLoopJoinRule`**: Join as a nested loop join (universal fallback).
//! - **`ImplHashAggregateRule`**: Aggregation using a hash table.
//! - **`ImplSetOperationRule`**: UNION ALL as a streaming union; every other set
//!   operation as a hash-based or sort-merge combine.

pub mod impl_agg;
pub mod impl_join;
pub mod impl_scan;
pub mod impl_set_op;
pub mod impl_unary;
pub mod join_associativity;
pub mod join_commutativity;
pub mod predicate_pushdown;
pub mod projection_pushdown;
pub mod set_op_filter_pushdown;
pub mod set_op_merge;
pub mod union_distinct_to_aggregate;

use cbo_core::rule::RuleRegistry;

/// Create a default rule registry with all built-in rules.
///
/// This is the standard configuration for the optimizer. Connector-specific rules
/// can be added to the returned registry via `add_source_rule_set()`.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    // Transformation rules: expand the logical search space.
    registry.add_rule(Box::new(join_commutativity::JoinCommutativityRule));
    registry.add_rule(Box::new(join_associativity::JoinAssociativityRule));
    registry.add_rule(Box::new(predicate_pushdown::PredicatePushdownRule));
    registry.add_rule(Box::new(projection_pushdown::ProjectionPushdownRule));
    registry.add_rule(Box::new(set_op_filter_pushdown::SetOpFilterPushdownRule));
    registry.add_rule(Box::new(set_op_merge::SetOpMergeRule));
    registry.add_rule(Box::new(union_distinct_to_aggregate::UnionDistinctToAggregateRule));

    // Implementation rules: map logical operators to physical alternatives.
    registry.add_rule(Box::new(impl_scan::ImplSeqScanRule));
    registry.add_rule(Box::new(impl_unary::ImplFilterRule));
    registry.add_rule(Box::new(impl_unary::ImplProjectRule));
    registry.add_rule(Box::new(impl_join::ImplHashJoinRule));
    registry.add_rule(Box::new(impl_join::ImplNestedLoopJoinRule));
    registry.add_rule(Box::new(impl_agg::ImplHashAggregateRule));
    registry.add_rule(Box::new(impl_unary::ImplSortRule));
    registry.add_rule(Box::new(impl_unary::ImplLimitRule));
    registry.add_rule(Box::new(impl_set_op::ImplSetOperationRule));

    registry
}
