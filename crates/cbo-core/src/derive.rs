//! Bottom-up statistics derivation for memo groups.
//!
//! Statistics are derived lazily (only when a group is first costed) and cached in
//! the group. All logical expressions of a group are equivalent, so the first one is
//! used as the representative. Catalog lookups happen while no group is borrowed, and
//! a table without statistics falls back to defaults with a
//! [`OptimizerWarning::StatisticsUnavailable`] warning.

use crate::catalog::Catalog;
use crate::error::{Diagnostics, OptimizerWarning};
use crate::expr::*;
use crate::logical::{aggregate_schema, project_schema};
use crate::memo::{GroupId, Memo};
use crate::stats::{self, SetOpInput, Statistics};
use std::sync::Arc;
use tracing::warn;

/// Derives and caches group statistics for one session.
pub struct StatsDeriver<'a> {
    catalog: &'a dyn Catalog,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> StatsDeriver<'a> {
    pub fn new(catalog: &'a dyn Catalog, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            catalog,
            diagnostics,
        }
    }

    /// Statistics of a group, deriving them (and those of its inputs) on first use.
    pub fn group_stats(&mut self, memo: &mut Memo, group: GroupId) -> Arc<Statistics> {
        if let Some(stats) = memo.stats(group) {
            return stats;
        }

        let Some(&expr_id) = memo.group(group).logical_exprs.first() else {
            return memo.set_stats(group, Statistics::unknown());
        };
        let expr = memo.expr(expr_id);
        let (op, children) = (expr.op.clone(), expr.children.clone());

        let child_stats: Vec<Arc<Statistics>> = children
            .iter()
            .map(|c| self.group_stats(memo, *c))
            .collect();
        let child_columns: Vec<Vec<ColumnRef>> = children
            .iter()
            .map(|c| memo.group(*c).logical_props.output_columns.clone())
            .collect();

        let stats = match &op {
            Operator::Logical(logical) => self.derive(logical, &child_stats, &child_columns),
            Operator::Physical(_) => Statistics::unknown(),
        };
        memo.set_stats(group, stats)
    }

    fn derive(
        &mut self,
        op: &LogicalOp,
        inputs: &[Arc<Statistics>],
        input_columns: &[Vec<ColumnRef>],
    ) -> Statistics {
        let input = |i: usize| inputs.get(i).map(|s| s.as_ref().clone()).unwrap_or_else(Statistics::unknown);

        match op {
            LogicalOp::Scan {
                table,
                columns,
                predicate,
            } => {
                let base = match self.catalog.get_table_stats(table) {
                    Some(stats) => qualify(stats, columns),
                    None => {
                        warn!("no statistics for table {}, using defaults", table);
                        self.diagnostics.warn(OptimizerWarning::StatisticsUnavailable {
                            table: table.clone(),
                        });
                        Statistics::unknown()
                    }
                };
                match predicate {
                    Some(p) => {
                        let selectivity = estimate_selectivity(p, &base);
                        stats::derive_filter_stats(&base, selectivity)
                    }
                    None => base,
                }
            }
            LogicalOp::Filter { predicate } => {
                let child = input(0);
                let selectivity = estimate_selectivity(predicate, &child);
                stats::derive_filter_stats(&child, selectivity)
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => {
                let empty = Vec::new();
                let left_cols = input_columns.first().unwrap_or(&empty);
                let right_cols = input_columns.get(1).unwrap_or(&empty);
                let join_cols: Vec<(String, String)> = equi_join_keys(condition, left_cols, right_cols)
                    .into_iter()
                    .map(|(l, r)| (l.stats_key(), r.stats_key()))
                    .collect();
                stats::derive_join_stats(&input(0), &input(1), &join_cols, *join_type)
            }
            LogicalOp::Aggregate { group_by, aggregates } => {
                let group_cols: Vec<String> = group_by
                    .iter()
                    .filter_map(|e| match e {
                        Expr::Column(c) => Some(c.stats_key()),
                        _ => None,
                    })
                    .collect();
                let row_width: f64 = aggregate_schema(group_by, aggregates)
                    .iter()
                    .map(|c| c.data_type.width())
                    .sum();
                stats::derive_aggregate_stats(&input(0), &group_cols, row_width)
            }
            LogicalOp::Project { exprs, aliases } => {
                let renames: Vec<(String, String)> = exprs
                    .iter()
                    .zip(project_schema(exprs, aliases))
                    .filter_map(|(e, out)| match e {
                        Expr::Column(c) => Some((c.stats_key(), out.stats_key())),
                        _ => None,
                    })
                    .collect();
                stats::derive_project_stats(&input(0), &renames)
            }
            LogicalOp::Sort { .. } => input(0),
            LogicalOp::Limit { offset, count } => stats::derive_limit_stats(&input(0), *offset, *count),
            LogicalOp::SetOperation { kind, qualifier } => {
                let set_inputs: Vec<SetOpInput<'_>> = inputs
                    .iter()
                    .zip(input_columns)
                    .map(|(s, cols)| SetOpInput {
                        stats: s.as_ref(),
                        columns: cols,
                    })
                    .collect();
                stats::derive_set_op_stats(*kind, *qualifier, &set_inputs)
            }
        }
    }
}

/// Estimate the selectivity of a predicate expression.
///
/// - **Equality with a literal**: 1 / NDV(col).
/// - **Equality of two columns**: 1 / max(NDV).
/// - **Range with a literal**: histogram or min/max interpolation, else 1/3.
/// - **AND**: product (independence assumption).
/// - **OR**: inclusion-exclusion, `1 - Π(1 - sel)`.
/// - **NOT**: `1 - sel`.
/// - **Anything else**: 0.1.
pub fn estimate_selectivity(expr: &Expr, stats: &Statistics) -> f64 {
    let sel = match expr {
        Expr::BinaryOp { op, left, right } if op.is_comparison() => {
            match (left.as_ref(), right.as_ref(), op) {
                (Expr::Column(a), Expr::Column(b), BinaryOp::Eq) => 1.0 / stats.ndv(&a.stats_key()).max(stats.ndv(&b.stats_key())),
                (Expr::Column(c), Expr::Literal(_), BinaryOp::Eq)
                | (Expr::Literal(_), Expr::Column(c), BinaryOp::Eq) => stats::equality_selectivity(stats, &c.stats_key()),
                (Expr::Column(c), Expr::Literal(_), BinaryOp::NotEq)
                | (Expr::Literal(_), Expr::Column(c), BinaryOp::NotEq) => {
                    1.0 - stats::equality_selectivity(stats, &c.stats_key())
                }
                (Expr::Column(c), Expr::Literal(v), op) => stats::range_selectivity(stats, &c.stats_key(), *op, v),
                (Expr::Literal(v), Expr::Column(c), op) => {
                    stats::range_selectivity(stats, &c.stats_key(), flip(*op), v)
                }
                (_, _, BinaryOp::Eq) => stats::DEFAULT_FILTER_SELECTIVITY,
                _ => stats::DEFAULT_RANGE_SELECTIVITY,
            }
        }
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => 1.0 - estimate_selectivity(operand, stats),
        Expr::UnaryOp {
            op: UnaryOp::IsNull,
            operand,
        } => match operand.as_ref() {
            Expr::Column(c) => stats
                .column_stats
                .get(&c.stats_key())
                .map(|cs| cs.null_fraction)
                .unwrap_or(stats::DEFAULT_FILTER_SELECTIVITY),
            _ => stats::DEFAULT_FILTER_SELECTIVITY,
        },
        Expr::And(conjuncts) => conjuncts
            .iter()
            .map(|c| estimate_selectivity(c, stats))
            .product(),
        Expr::Or(disjuncts) => {
            let product: f64 = disjuncts
                .iter()
                .map(|d| 1.0 - estimate_selectivity(d, stats))
                .product();
            1.0 - product
        }
        Expr::Literal(ScalarValue::Bool(true)) => 1.0,
        _ => stats::DEFAULT_FILTER_SELECTIVITY,
    };
    sel.clamp(0.0, 1.0)
}

/// Re-key catalog column statistics, which are named by bare column name, to the
/// qualified keys of the scanned columns.
fn qualify(mut table_stats: Statistics, columns: &[ColumnRef]) -> Statistics {
    let column_stats = columns
        .iter()
        .filter_map(|c| {
            table_stats
                .column_stats
                .get(&c.name)
                .map(|cs| (c.stats_key(), cs.clone()))
        })
        .collect();
    table_stats.column_stats = column_stats;
    table_stats
}

/// `literal op column` rewritten as `column op' literal`.
fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::LtEq => BinaryOp::GtEq,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::GtEq => BinaryOp::LtEq,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::logical::LogicalPlan;
    use crate::stats::ColumnStatistics;

    fn col(table: &str, name: &str) -> ColumnRef {
        ColumnRef::new(Some(table), name, 0, DataType::Int64)
    }

    fn lit(v: i64) -> Expr {
        Expr::Literal(ScalarValue::Int64(v))
    }

    #[test]
    fn test_selectivity_formulas() {
        let stats = Statistics::new(1000.0, 8000.0).with_column("t.x", ColumnStatistics::new(50.0, 0.0));
        let x = Expr::column(&col("t", "x"));
        let eq = Expr::binary(BinaryOp::Eq, x.clone(), lit(3));
        assert!((estimate_selectivity(&eq, &stats) - 0.02).abs() < 1e-9);

        let both = Expr::And(vec![eq.clone(), eq.clone()]);
        assert!((estimate_selectivity(&both, &stats) - 0.0004).abs() < 1e-9);

        let either = Expr::Or(vec![eq.clone(), eq.clone()]);
        assert!((estimate_selectivity(&either, &stats) - (1.0 - 0.98 * 0.98)).abs() < 1e-9);

        let range = Expr::binary(BinaryOp::Lt, x, lit(3));
        assert!((estimate_selectivity(&range, &stats) - stats::DEFAULT_RANGE_SELECTIVITY).abs() < 1e-9);
    }

    #[test]
    fn test_missing_stats_warn_once() {
        let catalog = InMemoryCatalog::new();
        let mut diagnostics = Diagnostics::default();
        let t = LogicalPlan::scan(TableRef::new("s", "ghost"), vec![col("ghost", "x")]).unwrap();
        let plan = LogicalPlan::union(crate::expr::SetQualifier::All, vec![t.clone(), t]).unwrap();

        let mut memo = Memo::new();
        let root = memo.insert_plan(&plan).unwrap();
        let stats = StatsDeriver::new(&catalog, &mut diagnostics).group_stats(&mut memo, root);

        assert_eq!(stats.row_count, 2.0 * stats::DEFAULT_ROW_COUNT);
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_scan_predicate_reduces_rows() {
        let table = TableRef::new("s", "t");
        let mut catalog = InMemoryCatalog::new();
        catalog.add_table(
            &table,
            vec![col("t", "x")],
            Statistics::new(10_000.0, 80_000.0).with_column("x", ColumnStatistics::new(100.0, 0.0)),
        );
        let mut diagnostics = Diagnostics::default();
        let plan = LogicalPlan::scan_with_predicate(
            table,
            vec![col("t", "x")],
            Some(Expr::binary(BinaryOp::Eq, Expr::column(&col("t", "x")), lit(1))),
        )
        .unwrap();
        let mut memo = Memo::new();
        let root = memo.insert_plan(&plan).unwrap();
        let stats = StatsDeriver::new(&catalog, &mut diagnostics).group_stats(&mut memo, root);
        assert!((stats.row_count - 100.0).abs() < 1e-6);
        assert!(diagnostics.warnings.is_empty());
    }

    #[test]
    fn test_same_named_columns_keep_their_own_stats() {
        let mut catalog = InMemoryCatalog::new();
        for (name, ndv) in [("a", 10.0), ("b", 1000.0)] {
            catalog.add_table(
                &TableRef::new("s", name),
                vec![col(name, "k")],
                Statistics::new(1000.0, 8000.0).with_column("k", ColumnStatistics::new(ndv, 0.0)),
            );
        }
        let scan = |name: &str| LogicalPlan::scan(TableRef::new("s", name), vec![col(name, "k")]).unwrap();
        let (ak, bk) = (Expr::column(&col("a", "k")), Expr::column(&col("b", "k")));
        let join = LogicalPlan::join(
            JoinType::Inner,
            Expr::binary(BinaryOp::Eq, ak.clone(), bk),
            scan("a"),
            scan("b"),
        )
        .unwrap();
        let plan = LogicalPlan::filter(Expr::binary(BinaryOp::Eq, ak, lit(1)), join).unwrap();

        let mut diagnostics = Diagnostics::default();
        let mut memo = Memo::new();
        let root = memo.insert_plan(&plan).unwrap();
        let stats = StatsDeriver::new(&catalog, &mut diagnostics).group_stats(&mut memo, root);

        // 1000 joined rows; a.k keeps its 10 distinct values, so a.k = 1 keeps a tenth.
        assert!((stats.row_count - 100.0).abs() < 1e-6, "rows = {}", stats.row_count);
    }

    #[test]
    fn test_aggregate_output_is_sized_by_column_widths() {
        let table = TableRef::new("s", "t");
        let mut catalog = InMemoryCatalog::new();
        catalog.add_table(
            &table,
            vec![col("t", "x")],
            Statistics::new(10_000.0, 800_000.0).with_column("x", ColumnStatistics::new(100.0, 0.0)),
        );
        let scan = LogicalPlan::scan(table, vec![col("t", "x")]).unwrap();
        let plan = LogicalPlan::aggregate(vec![Expr::column(&col("t", "x"))], vec![], scan).unwrap();

        let mut diagnostics = Diagnostics::default();
        let mut memo = Memo::new();
        let root = memo.insert_plan(&plan).unwrap();
        let stats = StatsDeriver::new(&catalog, &mut diagnostics).group_stats(&mut memo, root);
        assert_eq!(stats.row_count, 100.0);
        assert_eq!(stats.total_size_bytes, 100.0 * DataType::Int64.width());
    }
}
