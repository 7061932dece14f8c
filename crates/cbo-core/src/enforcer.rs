//! # Property Requirements and Enforcers
//!
//! This module answers three questions for the plan selector:
//!
//! 1. **What does a physical operator need from its inputs** to produce a correct
//!    result under a parent requirement? ([`child_requirements`]) An operator may
//!    offer several alternatives; a nested loop join can run with a replicated build
//!    side or with both inputs on one node.
//! 2. **What does it deliver** given what its inputs delivered?
//!    ([`delivered_properties`])
//! 3. **Which enforcers can establish a requirement** on top of a plan that does not
//!    meet it natively? ([`enforcers_for`])
//!
//! ## Distribution Rules
//!
//! | operator                   | inputs must be                                  |
//! |----------------------------|-------------------------------------------------|
//! | HashJoin (shuffle)         | both hash-partitioned on their join keys        |
//! | HashJoin (broadcast)       | build side replicated; not for right/full joins |
//! | NestedLoopJoin             | build side replicated, or both on one node      |
//! | HashAggregate              | hash-partitioned on the group keys, or one node |
//! | UnionAll                   | anything                                        |
//! | HashSetOp                  | each hash-partitioned on all of its columns     |
//! | SortMergeSetOp             | as HashSetOp, and sorted on all columns         |
//! | Sort, Limit                | on one node                                     |
//!
//! Hash partitioning on all columns of every input is what makes duplicate
//! elimination and multiset difference correct: equal rows of every input land on
//! the same node.
//!
//! ## Enforcers
//!
//! - A `LocalSort` establishes an order and keeps the input distribution, so it is
//!   costed over the group with the same distribution and no order.
//! - An `Exchange` establishes a distribution and destroys any order, so it is only
//!   offered when no order is required, over the group with no requirement at all.

use crate::expr::*;
use crate::logical::project_schema;
use crate::properties::{DistributionSpec, OrderSpec, PhysicalPropertySet};

/// Alternative child requirement vectors for `op` under the parent requirement
/// `required`. Each alternative has one entry per input. An empty result means
/// the operator cannot run here.
pub fn child_requirements(
    op: &PhysicalOp,
    required: &PhysicalPropertySet,
    child_columns: &[Vec<ColumnRef>],
) -> Vec<Vec<PhysicalPropertySet>> {
    let any = PhysicalPropertySet::any;
    let hash = |cols: Vec<ColumnRef>| PhysicalPropertySet::with_distribution(DistributionSpec::HashPartitioned(cols));
    let left_cols = child_columns.first().map(Vec::as_slice).unwrap_or(&[]);
    let right_cols = child_columns.get(1).map(Vec::as_slice).unwrap_or(&[]);

    match op {
        PhysicalOp::SeqScan { .. } => vec![vec![]],
        PhysicalOp::Filter { .. } => vec![vec![required.clone()]],
        PhysicalOp::Project { exprs, aliases } => {
            vec![vec![project_requirement(required, exprs, aliases)]]
        }
        PhysicalOp::HashJoin {
            join_type,
            condition,
            distribution,
        } => match distribution {
            JoinDistribution::Shuffle => {
                let keys = equi_join_keys(condition, left_cols, right_cols);
                if keys.is_empty() {
                    return vec![];
                }
                let (lk, rk): (Vec<_>, Vec<_>) = keys.into_iter().unzip();
                vec![vec![hash(lk), hash(rk)]]
            }
            JoinDistribution::Broadcast => {
                if !join_type.allows_broadcast_right() {
                    return vec![];
                }
                vec![vec![probe_requirement(required, left_cols), broadcast()]]
            }
        },
        PhysicalOp::NestedLoopJoin { join_type, .. } => {
            let mut alternatives = Vec::new();
            if join_type.allows_broadcast_right() {
                alternatives.push(vec![probe_requirement(required, left_cols), broadcast()]);
            }
            alternatives.push(vec![PhysicalPropertySet::singleton(), PhysicalPropertySet::singleton()]);
            alternatives
        }
        PhysicalOp::HashAggregate { group_by, .. } => {
            let keys: Option<Vec<ColumnRef>> = group_by
                .iter()
                .map(|e| match e {
                    Expr::Column(c) => Some(c.clone()),
                    _ => None,
                })
                .collect();
            match keys {
                Some(keys) if !keys.is_empty() => vec![vec![hash(keys)]],
                _ => vec![vec![PhysicalPropertySet::singleton()]],
            }
        }
        PhysicalOp::Sort { .. } => vec![vec![PhysicalPropertySet::singleton()]],
        PhysicalOp::LocalSort { .. } => vec![vec![PhysicalPropertySet::with_distribution(
            required.distribution.clone(),
        )]],
        PhysicalOp::Limit { .. } => vec![vec![PhysicalPropertySet::new(
            DistributionSpec::Singleton,
            required.order.clone(),
        )]],
        PhysicalOp::UnionAll => vec![child_columns.iter().map(|_| any()).collect()],
        PhysicalOp::HashSetOp { .. } => vec![child_columns.iter().map(|cols| hash(cols.clone())).collect()],
        PhysicalOp::SortMergeSetOp { .. } => vec![child_columns
            .iter()
            .map(|cols| {
                PhysicalPropertySet::new(
                    DistributionSpec::HashPartitioned(cols.clone()),
                    OrderSpec::Sorted(sort_keys(cols)),
                )
            })
            .collect()],
        PhysicalOp::Exchange { .. } => vec![vec![any()]],
    }
}

fn broadcast() -> PhysicalPropertySet {
    PhysicalPropertySet::with_distribution(DistributionSpec::Broadcast)
}

/// The probe side of a replicated-build join stays where it is, unless the parent
/// asked for a hash partitioning the probe side can provide.
fn probe_requirement(required: &PhysicalPropertySet, probe_cols: &[ColumnRef]) -> PhysicalPropertySet {
    match &required.distribution {
        DistributionSpec::HashPartitioned(cols) if cols.iter().all(|c| probe_cols.contains(c)) => {
            PhysicalPropertySet::with_distribution(required.distribution.clone())
        }
        _ => PhysicalPropertySet::any(),
    }
}

/// Translate a requirement on a projection's output into one on its input. Parts
/// of the requirement that refer to computed columns are dropped; an enforcer above
/// the projection establishes them instead.
fn project_requirement(required: &PhysicalPropertySet, exprs: &[Expr], aliases: &[String]) -> PhysicalPropertySet {
    let outputs = project_schema(exprs, aliases);
    let to_input = |c: &ColumnRef| -> Option<ColumnRef> {
        let pos = outputs.iter().position(|o| o == c)?;
        match &exprs[pos] {
            Expr::Column(input) => Some(input.clone()),
            _ => None,
        }
    };

    let distribution = match &required.distribution {
        DistributionSpec::HashPartitioned(cols) => cols
            .iter()
            .map(to_input)
            .collect::<Option<Vec<_>>>()
            .map(DistributionSpec::HashPartitioned)
            .unwrap_or(DistributionSpec::Any),
        other => other.clone(),
    };
    let order = match &required.order {
        OrderSpec::Sorted(keys) => keys
            .iter()
            .map(|k| {
                let mapped = k.expr.map_columns(&to_input)?;
                Some(SortKey {
                    expr: mapped,
                    ..k.clone()
                })
            })
            .collect::<Option<Vec<_>>>()
            .map(OrderSpec::Sorted)
            .unwrap_or(OrderSpec::Any),
        OrderSpec::Any => OrderSpec::Any,
    };
    PhysicalPropertySet::new(distribution, order)
}

/// Ascending sort keys over all the given columns.
pub fn sort_keys(cols: &[ColumnRef]) -> Vec<SortKey> {
    cols.iter().map(|c| SortKey::asc(Expr::column(c))).collect()
}

/// Properties delivered by `op` given what each input delivered.
///
/// `scan_distribution` is the catalog's storage distribution for a scanned table.
pub fn delivered_properties(
    op: &PhysicalOp,
    children: &[PhysicalPropertySet],
    scan_distribution: Option<&DistributionSpec>,
) -> PhysicalPropertySet {
    let first = children.first().cloned().unwrap_or_default();
    match op {
        PhysicalOp::SeqScan { columns, .. } => {
            let distribution = match scan_distribution {
                Some(DistributionSpec::HashPartitioned(cols)) => {
                    // Partitioning columns pruned from the scan cannot be named.
                    let visible: Option<Vec<ColumnRef>> = cols
                        .iter()
                        .map(|c| columns.iter().find(|s| s.same_column(c)).cloned())
                        .collect();
                    visible
                        .map(DistributionSpec::HashPartitioned)
                        .unwrap_or(DistributionSpec::RoundRobin)
                }
                Some(DistributionSpec::Any) | None => DistributionSpec::RoundRobin,
                Some(other) => other.clone(),
            };
            PhysicalPropertySet::with_distribution(distribution)
        }
        PhysicalOp::Filter { .. } => first,
        PhysicalOp::Project { exprs, aliases } => project_delivered(&first, exprs, aliases),
        PhysicalOp::HashJoin { .. } | PhysicalOp::NestedLoopJoin { .. } => {
            PhysicalPropertySet::with_distribution(first.distribution)
        }
        PhysicalOp::HashAggregate { .. } => PhysicalPropertySet::with_distribution(first.distribution),
        PhysicalOp::Sort { order } => {
            PhysicalPropertySet::new(DistributionSpec::Singleton, OrderSpec::Sorted(order.clone()))
        }
        PhysicalOp::LocalSort { order } => {
            PhysicalPropertySet::new(first.distribution, OrderSpec::Sorted(order.clone()))
        }
        PhysicalOp::Limit { .. } => first,
        PhysicalOp::UnionAll => PhysicalPropertySet::any(),
        PhysicalOp::HashSetOp { .. } => PhysicalPropertySet::with_distribution(first.distribution),
        // Merging sorted streams keeps the order of the first input.
        PhysicalOp::SortMergeSetOp { .. } => first,
        PhysicalOp::Exchange { kind } => PhysicalPropertySet::with_distribution(match kind {
            ExchangeKind::Gather => DistributionSpec::Singleton,
            ExchangeKind::Broadcast => DistributionSpec::Broadcast,
            ExchangeKind::Shuffle(cols) => DistributionSpec::HashPartitioned(cols.clone()),
            ExchangeKind::RoundRobin => DistributionSpec::RoundRobin,
        }),
    }
}

/// Translate what a projection's input delivers into terms of its output columns.
fn project_delivered(input: &PhysicalPropertySet, exprs: &[Expr], aliases: &[String]) -> PhysicalPropertySet {
    let outputs = project_schema(exprs, aliases);
    let to_output = |c: &ColumnRef| -> Option<ColumnRef> {
        exprs
            .iter()
            .position(|e| matches!(e, Expr::Column(input) if input == c))
            .map(|pos| outputs[pos].clone())
    };

    let distribution = match &input.distribution {
        DistributionSpec::HashPartitioned(cols) => cols
            .iter()
            .map(to_output)
            .collect::<Option<Vec<_>>>()
            .map(DistributionSpec::HashPartitioned)
            .unwrap_or(DistributionSpec::Any),
        other => other.clone(),
    };
    // The longest prefix of the input order that survives the projection.
    let order = match &input.order {
        OrderSpec::Sorted(keys) => {
            let kept: Vec<SortKey> = keys
                .iter()
                .map_while(|k| {
                    Some(SortKey {
                        expr: k.expr.map_columns(&to_output)?,
                        ..k.clone()
                    })
                })
                .collect();
            if kept.is_empty() {
                OrderSpec::Any
            } else {
                OrderSpec::Sorted(kept)
            }
        }
        OrderSpec::Any => OrderSpec::Any,
    };
    PhysicalPropertySet::new(distribution, order)
}

/// Enforcers that can establish `required`, each with the requirement to cost it
/// against on the same group.
pub fn enforcers_for(required: &PhysicalPropertySet) -> Vec<(PhysicalOp, PhysicalPropertySet)> {
    let mut enforcers = Vec::new();
    match &required.order {
        OrderSpec::Sorted(keys) => {
            enforcers.push((
                PhysicalOp::LocalSort { order: keys.clone() },
                PhysicalPropertySet::with_distribution(required.distribution.clone()),
            ));
        }
        OrderSpec::Any => {
            let kind = match &required.distribution {
                DistributionSpec::Any => None,
                DistributionSpec::Singleton => Some(ExchangeKind::Gather),
                DistributionSpec::Broadcast => Some(ExchangeKind::Broadcast),
                DistributionSpec::HashPartitioned(cols) => Some(ExchangeKind::Shuffle(cols.clone())),
                DistributionSpec::RoundRobin => Some(ExchangeKind::RoundRobin),
            };
            if let Some(kind) = kind {
                enforcers.push((PhysicalOp::Exchange { kind }, PhysicalPropertySet::any()));
            }
        }
    }
    enforcers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, name: &str, index: u32) -> ColumnRef {
        ColumnRef::new(Some(table), name, index, DataType::Int64)
    }

    fn hash(cols: Vec<ColumnRef>) -> PhysicalPropertySet {
        PhysicalPropertySet::with_distribution(DistributionSpec::HashPartitioned(cols))
    }

    #[test]
    fn test_shuffle_join_requires_keys_on_both_sides() {
        let (a, b) = (col("a", "x", 0), col("b", "y", 0));
        let op = PhysicalOp::HashJoin {
            join_type: JoinType::Inner,
            condition: Expr::binary(BinaryOp::Eq, Expr::column(&b), Expr::column(&a)),
            distribution: JoinDistribution::Shuffle,
        };
        let reqs = child_requirements(&op, &PhysicalPropertySet::any(), &[vec![a.clone()], vec![b.clone()]]);
        assert_eq!(reqs, vec![vec![hash(vec![a]), hash(vec![b])]]);
    }

    #[test]
    fn test_no_broadcast_for_full_join() {
        let (a, b) = (col("a", "x", 0), col("b", "y", 0));
        let op = PhysicalOp::HashJoin {
            join_type: JoinType::Full,
            condition: Expr::binary(BinaryOp::Eq, Expr::column(&a), Expr::column(&b)),
            distribution: JoinDistribution::Broadcast,
        };
        assert!(child_requirements(&op, &PhysicalPropertySet::any(), &[vec![a], vec![b]]).is_empty());
    }

    #[test]
    fn test_set_ops_partition_on_all_columns() {
        let left = vec![col("a", "x", 0), col("a", "y", 1)];
        let right = vec![col("b", "x", 0), col("b", "y", 1)];
        let children = [left.clone(), right.clone()];

        let op = PhysicalOp::HashSetOp {
            kind: SetOpKind::Except,
            qualifier: SetQualifier::Distinct,
        };
        let reqs = child_requirements(&op, &PhysicalPropertySet::singleton(), &children);
        assert_eq!(reqs, vec![vec![hash(left.clone()), hash(right.clone())]]);

        let reqs = child_requirements(&PhysicalOp::UnionAll, &PhysicalPropertySet::singleton(), &children);
        assert!(reqs[0].iter().all(|r| r.is_any()));

        let op = PhysicalOp::SortMergeSetOp {
            kind: SetOpKind::Intersect,
            qualifier: SetQualifier::Distinct,
        };
        let reqs = child_requirements(&op, &PhysicalPropertySet::any(), &children);
        assert_eq!(reqs[0][1].order, OrderSpec::Sorted(sort_keys(&right)));
    }

    #[test]
    fn test_enforcers() {
        let sorted = PhysicalPropertySet::new(
            DistributionSpec::Singleton,
            OrderSpec::Sorted(sort_keys(&[col("a", "x", 0)])),
        );
        let enforcers = enforcers_for(&sorted);
        assert_eq!(enforcers.len(), 1);
        assert!(matches!(enforcers[0].0, PhysicalOp::LocalSort { .. }));
        assert_eq!(enforcers[0].1, PhysicalPropertySet::singleton());

        let enforcers = enforcers_for(&PhysicalPropertySet::singleton());
        assert!(matches!(
            enforcers[0].0,
            PhysicalOp::Exchange { kind: ExchangeKind::Gather }
        ));
        assert!(enforcers[0].1.is_any());
        assert!(enforcers_for(&PhysicalPropertySet::any()).is_empty());
    }

    #[test]
    fn test_exchange_delivers_what_it_enforces() {
        for required in [
            PhysicalPropertySet::singleton(),
            PhysicalPropertySet::with_distribution(DistributionSpec::Broadcast),
            hash(vec![col("a", "x", 0)]),
            PhysicalPropertySet::with_distribution(DistributionSpec::RoundRobin),
        ] {
            for (op, _) in enforcers_for(&required) {
                let delivered = delivered_properties(&op, &[PhysicalPropertySet::any()], None);
                assert!(required.satisfied_by(&delivered));
            }
        }
    }

    #[test]
    fn test_scan_distribution_from_catalog() {
        let x = col("a", "x", 0);
        let op = PhysicalOp::SeqScan {
            table: TableRef::new("s", "a"),
            columns: vec![x.clone()],
            predicate: None,
        };
        let stored = DistributionSpec::HashPartitioned(vec![x.clone()]);
        assert_eq!(delivered_properties(&op, &[], Some(&stored)).distribution, stored);
        assert_eq!(
            delivered_properties(&op, &[], None).distribution,
            DistributionSpec::RoundRobin
        );
    }

    #[test]
    fn test_project_maps_columns() {
        let x = col("a", "x", 0);
        let exprs = vec![Expr::column(&x)];
        let op = PhysicalOp::Project {
            exprs: exprs.clone(),
            aliases: vec!["renamed".into()],
        };
        let output = project_schema(&exprs, &["renamed".to_string()]);
        let reqs = child_requirements(&op, &hash(output.clone()), &[vec![x.clone()]]);
        assert_eq!(reqs[0][0], hash(vec![x.clone()]));

        let delivered = delivered_properties(&op, &[hash(vec![x])], None);
        assert_eq!(delivered, hash(output));
    }
}
