//! Shared helpers for the end-to-end tests: catalog builders and a reference
//! executor that runs a physical plan over in-memory rows on a single process.
//!
//! Exchanges are no-ops here, so executing a plan checks that the operators and
//! their inputs compute the right multiset of rows, independent of where the
//! rows would live in a cluster.

#![allow(dead_code)]

use cbo_core::catalog::InMemoryCatalog;
use cbo_core::expr::*;
use cbo_core::logical::{aggregate_schema, project_schema};
use cbo_core::memo::PlanNode;
use cbo_core::rule::{RuleRegistry, RuleType};
use cbo_core::stats::{ColumnStatistics, Statistics};
use cbo_core::{LogicalPlan, OptimizedPlan, Optimizer, OptimizerConfig};
use std::collections::HashMap;
use std::sync::Arc;

pub type Row = Vec<i64>;

pub fn col(table: &str, name: &str, index: u32) -> ColumnRef {
    ColumnRef::new(Some(table), name, index, DataType::Int64)
}

pub fn table_ref(name: &str) -> TableRef {
    TableRef::new("tpch", name)
}

pub fn columns(table: &str, names: &[&str]) -> Vec<ColumnRef> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| col(table, n, i as u32))
        .collect()
}

/// Add a table with the given row count and column NDVs.
pub fn add_table(catalog: &mut InMemoryCatalog, name: &str, rows: f64, cols: &[(&str, f64)]) -> Vec<ColumnRef> {
    let names: Vec<&str> = cols.iter().map(|(n, _)| *n).collect();
    let col_refs = columns(name, &names);
    let mut stats = Statistics::new(rows, rows * 8.0 * cols.len() as f64);
    for (col_name, ndv) in cols {
        stats = stats.with_column(*col_name, ColumnStatistics::new(*ndv, 0.0));
    }
    catalog.add_table(&table_ref(name), col_refs.clone(), stats);
    col_refs
}

pub fn scan(name: &str, cols: &[ColumnRef]) -> LogicalPlan {
    LogicalPlan::scan(table_ref(name), cols.to_vec()).expect("valid scan")
}

pub fn eq(l: &ColumnRef, r: &ColumnRef) -> Expr {
    Expr::binary(BinaryOp::Eq, Expr::column(l), Expr::column(r))
}

pub fn gt(c: &ColumnRef, v: i64) -> Expr {
    Expr::binary(BinaryOp::Gt, Expr::column(c), Expr::Literal(ScalarValue::Int64(v)))
}

pub fn optimizer(catalog: InMemoryCatalog, config: OptimizerConfig) -> Optimizer {
    Optimizer::new(Arc::new(cbo_rules::default_rule_registry()), Arc::new(catalog), config)
}

pub fn optimize(catalog: InMemoryCatalog, plan: &LogicalPlan) -> OptimizedPlan {
    let result = optimizer(catalog, OptimizerConfig::for_tests())
        .optimize(plan)
        .expect("optimization succeeds");
    println!("{}", result.plan.display(0));
    result
}

/// A registry with only implementation rules: the naive order, implemented as written.
pub fn implementation_only() -> RuleRegistry {
    let mut registry = cbo_rules::default_rule_registry();
    registry
        .base_rules
        .retain(|r| r.rule_type() == RuleType::Implementation);
    registry
}

pub fn optimize_naive(catalog: InMemoryCatalog, plan: &LogicalPlan) -> OptimizedPlan {
    Optimizer::new(Arc::new(implementation_only()), Arc::new(catalog), OptimizerConfig::for_tests())
        .optimize(plan)
        .expect("naive plan is implementable")
}

/// Every plan node with an operator of the given kind.
pub fn find(plan: &PlanNode, kind: PhysicalOpKind) -> Vec<&PlanNode> {
    plan.nodes().into_iter().filter(|n| n.op.kind() == kind).collect()
}

// ---------------------------------------------------------------------------
// Reference executor
// ---------------------------------------------------------------------------

/// Rows of each base table, in the order of the table's catalog columns.
#[derive(Default)]
pub struct Dataset {
    tables: HashMap<String, (Vec<ColumnRef>, Vec<Row>)>,
}

impl Dataset {
    pub fn add(&mut self, table: &str, columns: &[ColumnRef], rows: Vec<Row>) {
        self.tables.insert(table.to_string(), (columns.to_vec(), rows));
    }

    /// Execute a plan and return its rows, sorted so results compare as multisets.
    pub fn run(&self, plan: &PlanNode) -> Vec<Row> {
        let (_, mut rows) = self.execute(plan);
        rows.sort();
        rows
    }

    fn execute(&self, node: &PlanNode) -> (Vec<ColumnRef>, Vec<Row>) {
        let inputs: Vec<(Vec<ColumnRef>, Vec<Row>)> = node.children.iter().map(|c| self.execute(c)).collect();
        let first = || inputs[0].clone();

        match &node.op {
            PhysicalOp::SeqScan {
                table,
                columns,
                predicate,
            } => {
                let (table_cols, rows) = &self.tables[&table.name];
                let rows = rows
                    .iter()
                    .filter(|r| predicate.as_ref().map_or(true, |p| eval(p, table_cols, r) != 0))
                    .map(|r| columns.iter().map(|c| r[c.index as usize]).collect())
                    .collect();
                (columns.clone(), rows)
            }
            PhysicalOp::Filter { predicate } => {
                let (schema, rows) = first();
                let rows = rows.into_iter().filter(|r| eval(predicate, &schema, r) != 0).collect();
                (schema, rows)
            }
            PhysicalOp::Project { exprs, aliases } => {
                let (schema, rows) = first();
                let rows = rows
                    .iter()
                    .map(|r| exprs.iter().map(|e| eval(e, &schema, r)).collect())
                    .collect();
                (project_schema(exprs, aliases), rows)
            }
            PhysicalOp::HashJoin {
                join_type, condition, ..
            }
            | PhysicalOp::NestedLoopJoin {
                join_type,
                condition,
            } => join(*join_type, condition, &inputs[0], &inputs[1]),
            PhysicalOp::HashAggregate { group_by, aggregates } => {
                let (schema, rows) = first();
                let mut groups: Vec<(Row, Vec<Row>)> = Vec::new();
                for r in rows {
                    let key: Row = group_by.iter().map(|e| eval(e, &schema, &r)).collect();
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, members)) => members.push(r),
                        None => groups.push((key, vec![r])),
                    }
                }
                let rows = groups
                    .into_iter()
                    .map(|(mut key, members)| {
                        key.extend(aggregates.iter().map(|a| {
                            let values = members.iter().map(|m| eval(&a.arg, &schema, m));
                            match a.func {
                                AggFunc::Count => values.count() as i64,
                                AggFunc::Sum => values.sum(),
                                AggFunc::Min => values.min().unwrap_or_default(),
                                AggFunc::Max => values.max().unwrap_or_default(),
                                AggFunc::Avg => panic!("AVG is not supported by the reference executor"),
                            }
                        }));
                        key
                    })
                    .collect();
                (aggregate_schema(group_by, aggregates), rows)
            }
            PhysicalOp::Sort { order } | PhysicalOp::LocalSort { order } => {
                let (schema, mut rows) = first();
                rows.sort_by(|a, b| {
                    order
                        .iter()
                        .map(|k| {
                            let ord = eval(&k.expr, &schema, a).cmp(&eval(&k.expr, &schema, b));
                            if k.ascending {
                                ord
                            } else {
                                ord.reverse()
                            }
                        })
                        .find(|o| o.is_ne())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                (schema, rows)
            }
            PhysicalOp::Limit { offset, count } => {
                let (schema, rows) = first();
                let rows = rows.into_iter().skip(*offset as usize).take(*count as usize).collect();
                (schema, rows)
            }
            PhysicalOp::Exchange { .. } => first(),
            PhysicalOp::UnionAll => set_op(SetOpKind::Union, SetQualifier::All, inputs),
            PhysicalOp::HashSetOp { kind, qualifier } | PhysicalOp::SortMergeSetOp { kind, qualifier } => {
                set_op(*kind, *qualifier, inputs)
            }
        }
    }
}

fn join(
    join_type: JoinType,
    condition: &Expr,
    (left_schema, left): &(Vec<ColumnRef>, Vec<Row>),
    (right_schema, right): &(Vec<ColumnRef>, Vec<Row>),
) -> (Vec<ColumnRef>, Vec<Row>) {
    let schema: Vec<ColumnRef> = left_schema.iter().chain(right_schema).cloned().collect();
    let matches = |l: &Row, r: &Row| {
        let combined: Row = l.iter().chain(r).copied().collect();
        eval(condition, &schema, &combined) != 0
    };
    match join_type {
        JoinType::Inner | JoinType::Cross => {
            let rows = left
                .iter()
                .flat_map(|l| {
                    right
                        .iter()
                        .filter(move |r| matches(l, r))
                        .map(move |r| l.iter().chain(r).copied().collect())
                })
                .collect();
            (schema, rows)
        }
        JoinType::Semi | JoinType::Anti => {
            let keep = join_type == JoinType::Semi;
            let rows = left
                .iter()
                .filter(|l| right.iter().any(|r| matches(l, r)) == keep)
                .cloned()
                .collect();
            (left_schema.clone(), rows)
        }
        other => panic!("{other:?} joins are not supported by the reference executor"),
    }
}

/// Multiset semantics of set operations over positional rows.
fn set_op(kind: SetOpKind, qualifier: SetQualifier, inputs: Vec<(Vec<ColumnRef>, Vec<Row>)>) -> (Vec<ColumnRef>, Vec<Row>) {
    let schema = inputs[0].0.clone();
    let counts: Vec<HashMap<Row, i64>> = inputs
        .iter()
        .map(|(_, rows)| {
            let mut counts = HashMap::new();
            for r in rows {
                *counts.entry(r.clone()).or_insert(0) += 1;
            }
            counts
        })
        .collect();
    let count_in = |i: usize, r: &Row| counts[i].get(r).copied().unwrap_or(0);

    let mut all_rows: Vec<Row> = counts.iter().flat_map(|c| c.keys().cloned()).collect();
    all_rows.sort();
    all_rows.dedup();

    let mut rows = Vec::new();
    for r in all_rows {
        let n = match kind {
            SetOpKind::Union => (0..counts.len()).map(|i| count_in(i, &r)).sum(),
            SetOpKind::Intersect => (0..counts.len()).map(|i| count_in(i, &r)).min().unwrap_or(0),
            SetOpKind::Except => match qualifier {
                SetQualifier::All => count_in(0, &r) - (1..counts.len()).map(|i| count_in(i, &r)).sum::<i64>(),
                SetQualifier::Distinct if (1..counts.len()).any(|i| count_in(i, &r) > 0) => 0,
                SetQualifier::Distinct => count_in(0, &r),
            },
        };
        let n = match qualifier {
            SetQualifier::Distinct => n.min(1),
            SetQualifier::All => n,
        };
        for _ in 0..n.max(0) {
            rows.push(r.clone());
        }
    }
    (schema, rows)
}

/// Evaluate an integer expression; predicates yield 1 or 0.
fn eval(expr: &Expr, schema: &[ColumnRef], row: &Row) -> i64 {
    match expr {
        Expr::Column(c) => {
            let pos = schema
                .iter()
                .position(|s| s.same_column(c))
                .unwrap_or_else(|| panic!("column {c} not in input"));
            row[pos]
        }
        Expr::Literal(ScalarValue::Int64(v)) => *v,
        Expr::Literal(ScalarValue::Bool(b)) => *b as i64,
        Expr::BinaryOp { op, left, right } => {
            let (l, r) = (eval(left, schema, row), eval(right, schema, row));
            match op {
                BinaryOp::Eq => (l == r) as i64,
                BinaryOp::NotEq => (l != r) as i64,
                BinaryOp::Lt => (l < r) as i64,
                BinaryOp::LtEq => (l <= r) as i64,
                BinaryOp::Gt => (l > r) as i64,
                BinaryOp::GtEq => (l >= r) as i64,
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
            }
        }
        Expr::And(parts) => parts.iter().all(|p| eval(p, schema, row) != 0) as i64,
        Expr::Or(parts) => parts.iter().any(|p| eval(p, schema, row) != 0) as i64,
        other => panic!("unsupported expression {other}"),
    }
}
