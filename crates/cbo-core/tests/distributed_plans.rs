//! Distribution planning: join distribution choice, exchange placement and
//! runtime filters.

mod common;

use cbo_core::catalog::InMemoryCatalog;
use cbo_core::expr::*;
use cbo_core::memo::{PlanNode, RuntimeFilter};
use cbo_core::properties::DistributionSpec;
use cbo_core::{LogicalPlan, OptimizerConfig};
use common::*;

struct StarSchema {
    catalog: InMemoryCatalog,
    fact: Vec<ColumnRef>,
    dim: Vec<ColumnRef>,
}

fn star(fact_rows: f64, dim_rows: f64) -> StarSchema {
    let mut catalog = InMemoryCatalog::new();
    let fact = add_table(&mut catalog, "fact", fact_rows, &[("f_key", dim_rows), ("f_value", 1000.0)]);
    let dim = add_table(&mut catalog, "dim", dim_rows, &[("d_key", dim_rows), ("d_name", dim_rows)]);
    StarSchema { catalog, fact, dim }
}

fn fact_join_dim(s: &StarSchema) -> LogicalPlan {
    LogicalPlan::join(
        JoinType::Inner,
        eq(&s.fact[0], &s.dim[0]),
        scan("fact", &s.fact),
        scan("dim", &s.dim),
    )
    .expect("valid join")
}

fn hash_join(plan: &PlanNode) -> &PlanNode {
    find(plan, PhysicalOpKind::HashJoin)
        .into_iter()
        .next()
        .expect("plan has a hash join")
}

fn exchanges(plan: &PlanNode) -> Vec<ExchangeKind> {
    find(plan, PhysicalOpKind::Exchange)
        .into_iter()
        .filter_map(|n| match &n.op {
            PhysicalOp::Exchange { kind } => Some(kind.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_small_dimension_is_broadcast() {
    let s = star(10_000_000.0, 10.0);
    let result = optimize(s.catalog.clone(), &fact_join_dim(&s));

    let join = hash_join(&result.plan);
    assert!(matches!(
        join.op,
        PhysicalOp::HashJoin {
            distribution: JoinDistribution::Broadcast,
            ..
        }
    ));
    // The dimension is the build side and the only input that moves.
    let build = &join.children[1];
    assert!(matches!(&build.op, PhysicalOp::Exchange { kind: ExchangeKind::Broadcast }));
    assert_eq!(build.row_count, 10.0);
    assert!(!exchanges(&result.plan)
        .iter()
        .any(|k| matches!(k, ExchangeKind::Shuffle(_))));
}

#[test]
fn test_large_inputs_are_shuffled() {
    let s = star(10_000_000.0, 5_000_000.0);
    let result = optimize(s.catalog.clone(), &fact_join_dim(&s));

    let join = hash_join(&result.plan);
    assert!(matches!(
        join.op,
        PhysicalOp::HashJoin {
            distribution: JoinDistribution::Shuffle,
            ..
        }
    ));
    let shuffles = exchanges(&result.plan)
        .into_iter()
        .filter(|k| matches!(k, ExchangeKind::Shuffle(_)))
        .count();
    assert_eq!(shuffles, 2);
}

#[test]
fn test_co_partitioned_tables_join_without_exchange() {
    let mut s = star(10_000_000.0, 5_000_000.0);
    s.catalog.set_distribution(
        &table_ref("fact"),
        DistributionSpec::HashPartitioned(vec![s.fact[0].clone()]),
    );
    s.catalog.set_distribution(
        &table_ref("dim"),
        DistributionSpec::HashPartitioned(vec![s.dim[0].clone()]),
    );
    let result = optimize(s.catalog.clone(), &fact_join_dim(&s));

    // Only the gather to the coordinator remains.
    assert_eq!(exchanges(&result.plan), vec![ExchangeKind::Gather]);
}

#[test]
fn test_root_delivers_required_distribution() {
    let s = star(1_000.0, 10.0);
    let result = optimize(s.catalog.clone(), &fact_join_dim(&s));
    assert_eq!(result.plan.delivered.distribution, DistributionSpec::Singleton);

    let mut config = OptimizerConfig::for_tests();
    config.required_root_distribution = DistributionSpec::Any;
    let result = optimizer(s.catalog.clone(), config)
        .optimize(&fact_join_dim(&s))
        .expect("optimization succeeds");
    assert!(!exchanges(&result.plan).contains(&ExchangeKind::Gather));
}

#[test]
fn test_enforcers_never_reduce_cost() {
    let s = star(10_000_000.0, 5_000_000.0);
    let plan = LogicalPlan::sort(
        vec![SortKey::asc(Expr::column(&s.dim[1]))],
        LogicalPlan::filter(gt(&s.fact[1], 500), fact_join_dim(&s)).expect("valid filter"),
    )
    .expect("valid sort");
    let result = optimize(s.catalog.clone(), &plan);

    for node in result.plan.nodes() {
        for child in &node.children {
            assert!(
                node.cost.total >= child.cost.total,
                "{} is cheaper than its input {}",
                node.op,
                child.op
            );
        }
    }
    assert!(matches!(result.plan.op, PhysicalOp::Sort { .. }));
}

#[test]
fn test_runtime_filters() {
    // Broadcast join: a local filter built on every node.
    let s = star(10_000_000.0, 10.0);
    let result = optimize(s.catalog.clone(), &fact_join_dim(&s));
    assert_eq!(hash_join(&result.plan).runtime_filter, Some(RuntimeFilter::Local));

    // Shuffle join: only with global runtime filters enabled.
    let s = star(10_000_000.0, 5_000_000.0);
    let result = optimize(s.catalog.clone(), &fact_join_dim(&s));
    assert_eq!(hash_join(&result.plan).runtime_filter, None);

    let mut config = OptimizerConfig::for_tests();
    config.enable_global_runtime_filter = true;
    let result = optimizer(s.catalog.clone(), config)
        .optimize(&fact_join_dim(&s))
        .expect("optimization succeeds");
    assert_eq!(hash_join(&result.plan).runtime_filter, Some(RuntimeFilter::Global));
}

#[test]
fn test_anti_join_has_no_runtime_filter() {
    let s = star(10_000_000.0, 10.0);
    let plan = LogicalPlan::join(
        JoinType::Anti,
        eq(&s.fact[0], &s.dim[0]),
        scan("fact", &s.fact),
        scan("dim", &s.dim),
    )
    .expect("valid join");
    let result = optimize(s.catalog.clone(), &plan);
    assert!(result.plan.nodes().iter().all(|n| n.runtime_filter.is_none()));
}
