//! # Statistics for Cost-Based Optimization
//!
//! This module defines the statistics structures and derivation formulas used by the
//! cost model to estimate the expense of query plans.
//!
//! ## Statistics Hierarchy
//!
//! - **Table-level**: row count and total size in bytes.
//! - **Column-level**: number of distinct values (NDV), null fraction, min/max values,
//!   average value size, and optional histograms for range selectivity estimation.
//!
//! ## Derivation Formulas
//!
//! Statistics for intermediate plan nodes are derived bottom-up:
//!
//! - **Filter**: output_rows = input_rows * selectivity, with the selectivity clamped
//!   to `[MIN_SELECTIVITY, 1]` and rows floored at 1.
//! - **Join**: output_rows = |left| * |right| / max(NDV_left_key, NDV_right_key),
//!   adjusted for outer, semi and anti joins.
//! - **Aggregate**: product of group-by NDVs, capped by input rows.
//! - **Union ALL**: sum of input rows.
//! - **Union DISTINCT**: min(sum of rows, product over columns of the summed NDVs).
//! - **Intersect**: at most the smallest input.
//! - **Except**: at most the left (driving) input.
//!
//! The set-operation bounds are heuristics. What they guarantee is the ordering:
//! a DISTINCT result is never estimated larger than the ALL result over the same
//! inputs, EXCEPT never exceeds its left input, and INTERSECT never exceeds any input.
//!
//! ## Selectivity Estimation
//!
//! - **Equality**: 1 / NDV (uniform distribution assumption).
//! - **Range**: histogram buckets, else min/max interpolation, else 1/3.
//! - **Default**: 0.1 (10%) when no better estimate is available.

use crate::expr::{BinaryOp, ColumnRef, ScalarValue, SetOpKind, SetQualifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range predicate without histogram or min/max information.
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 0.33;

/// Lower clamp for any filter selectivity. Keeps stacked predicates from driving
/// estimates to zero rows.
pub const MIN_SELECTIVITY: f64 = 1e-4;

/// Row count assumed for a table the catalog knows nothing about.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;

/// Bytes per row assumed when no width information is available.
pub const DEFAULT_ROW_WIDTH: f64 = 100.0;

/// Statistics for a relation (or group in the memo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    /// Default estimate used when the catalog has nothing for a table.
    pub fn unknown() -> Self {
        Self::new(DEFAULT_ROW_COUNT, DEFAULT_ROW_COUNT * DEFAULT_ROW_WIDTH)
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    /// Average bytes per row.
    pub fn avg_row_size(&self) -> f64 {
        if self.row_count > 0.0 {
            self.total_size_bytes / self.row_count
        } else {
            DEFAULT_ROW_WIDTH
        }
    }

    /// NDV of a column, or the row count when the column has no statistics
    /// (conservatively assuming all values are distinct).
    pub fn ndv(&self, column: &str) -> f64 {
        self.column_stats
            .get(column)
            .map(|s| s.distinct_count)
            .unwrap_or(self.row_count)
            .max(1.0)
    }

    fn scaled(&self, row_count: f64) -> Statistics {
        let column_stats = self
            .column_stats
            .iter()
            .map(|(name, cs)| {
                let mut cs = cs.clone();
                cs.distinct_count = cs.distinct_count.min(row_count).max(1.0);
                (name.clone(), cs)
            })
            .collect();
        Statistics {
            row_count,
            total_size_bytes: row_count * self.avg_row_size(),
            column_stats,
        }
    }
}

/// Per-column statistics used for selectivity estimation and cost modeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
    pub min_value: Option<ScalarValue>,
    pub max_value: Option<ScalarValue>,
    /// Average size of a single value in bytes.
    pub avg_row_size: f64,
    /// Optional equi-depth histogram for range selectivity estimation.
    pub histogram: Option<Histogram>,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            min_value: None,
            max_value: None,
            avg_row_size: 8.0,
            histogram: None,
        }
    }

    pub fn with_range(mut self, min: ScalarValue, max: ScalarValue) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn with_histogram(mut self, histogram: Histogram) -> Self {
        self.histogram = Some(histogram);
        self
    }
}

/// Equi-depth histogram for range selectivity estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

/// A single bucket in an equi-depth histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Lower bound of the bucket range (inclusive).
    pub lower: f64,
    /// Upper bound of the bucket range (inclusive).
    pub upper: f64,
    /// Estimated number of rows in this bucket.
    pub count: f64,
    /// Estimated number of distinct values in this bucket.
    pub distinct: f64,
}

impl Histogram {
    /// Fraction of rows with a value below `value`, interpolating linearly inside
    /// the bucket that contains it.
    pub fn fraction_below(&self, value: f64) -> Option<f64> {
        let total: f64 = self.buckets.iter().map(|b| b.count).sum();
        if total <= 0.0 {
            return None;
        }
        let mut below = 0.0;
        for b in &self.buckets {
            if value >= b.upper {
                below += b.count;
            } else if value > b.lower {
                let width = (b.upper - b.lower).max(f64::EPSILON);
                below += b.count * (value - b.lower) / width;
            }
        }
        Some((below / total).clamp(0.0, 1.0))
    }
}

fn numeric(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Int64(v) => Some(*v as f64),
        ScalarValue::Float64(v) => Some(v.0),
        ScalarValue::Date(v) => Some(*v as f64),
        _ => None,
    }
}

/// Clamp a selectivity estimate to `[MIN_SELECTIVITY, 1.0]`.
pub fn clamp_selectivity(selectivity: f64) -> f64 {
    if selectivity.is_nan() {
        return DEFAULT_FILTER_SELECTIVITY;
    }
    selectivity.clamp(MIN_SELECTIVITY, 1.0)
}

/// Estimate selectivity for an equality predicate: `sel = 1 / NDV`.
///
/// If column statistics are unavailable, falls back to the default selectivity.
pub fn equality_selectivity(stats: &Statistics, col_name: &str) -> f64 {
    stats
        .column_stats
        .get(col_name)
        .map(|cs| 1.0 / cs.distinct_count.max(1.0))
        .unwrap_or(DEFAULT_FILTER_SELECTIVITY)
}

/// Estimate selectivity of `column <op> value` for a range comparison.
pub fn range_selectivity(stats: &Statistics, col_name: &str, op: BinaryOp, value: &ScalarValue) -> f64 {
    let Some(cs) = stats.column_stats.get(col_name) else {
        return DEFAULT_RANGE_SELECTIVITY;
    };
    let Some(v) = numeric(value) else {
        return DEFAULT_RANGE_SELECTIVITY;
    };

    let below = cs
        .histogram
        .as_ref()
        .and_then(|h| h.fraction_below(v))
        .or_else(|| {
            let lo = numeric(cs.min_value.as_ref()?)?;
            let hi = numeric(cs.max_value.as_ref()?)?;
            if hi <= lo {
                return None;
            }
            Some(((v - lo) / (hi - lo)).clamp(0.0, 1.0))
        });

    let Some(below) = below else {
        return DEFAULT_RANGE_SELECTIVITY;
    };
    let non_null = 1.0 - cs.null_fraction.clamp(0.0, 1.0);
    let fraction = match op {
        BinaryOp::Lt | BinaryOp::LtEq => below,
        BinaryOp::Gt | BinaryOp::GtEq => 1.0 - below,
        _ => return DEFAULT_RANGE_SELECTIVITY,
    };
    fraction * non_null
}

/// Derive statistics for join output.
///
/// ```text
/// |A JOIN B| = |A| * |B| / max(NDV(A.key), NDV(B.key))
/// ```
///
/// For multi-column joins, selectivities are multiplied (independence assumption).
/// Outer joins never produce fewer rows than their preserved side; semi and anti
/// joins never produce more rows than their left input.
pub fn derive_join_stats(
    left: &Statistics,
    right: &Statistics,
    join_columns: &[(String, String)],
    join_type: crate::expr::JoinType,
) -> Statistics {
    use crate::expr::JoinType;

    let mut selectivity = 1.0_f64;
    for (left_col, right_col) in join_columns {
        // Containment assumption: the smaller domain is contained in the larger one.
        let max_ndv = left.ndv(left_col).max(right.ndv(right_col));
        selectivity /= max_ndv;
    }

    let inner_rows = (left.row_count * right.row_count * selectivity).max(1.0);
    let row_count = match join_type {
        JoinType::Inner | JoinType::Cross => inner_rows,
        JoinType::Left => inner_rows.max(left.row_count),
        JoinType::Right => inner_rows.max(right.row_count),
        JoinType::Full => inner_rows.max(left.row_count + right.row_count),
        JoinType::Semi => {
            let matched = if join_columns.is_empty() {
                DEFAULT_FILTER_SELECTIVITY
            } else {
                join_columns
                    .iter()
                    .map(|(l, r)| (right.ndv(r) / left.ndv(l)).min(1.0))
                    .product::<f64>()
            };
            (left.row_count * matched).max(1.0)
        }
        JoinType::Anti => {
            let matched = if join_columns.is_empty() {
                DEFAULT_FILTER_SELECTIVITY
            } else {
                join_columns
                    .iter()
                    .map(|(l, r)| (right.ndv(r) / left.ndv(l)).min(1.0))
                    .product::<f64>()
            };
            (left.row_count * (1.0 - matched)).max(1.0)
        }
    };

    if join_type.is_left_only_output() {
        return left.scaled(row_count);
    }

    let total_size_bytes = row_count * (left.avg_row_size() + right.avg_row_size());

    // NDV is capped by the output row count.
    let mut column_stats = HashMap::new();
    for (name, stats) in left.column_stats.iter().chain(right.column_stats.iter()) {
        let mut cs = stats.clone();
        cs.distinct_count = cs.distinct_count.min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes,
        column_stats,
    }
}

/// Derive statistics for filter output.
///
/// Output rows = input rows * clamped selectivity (floored at 1). Column NDVs are
/// scaled by the same ratio.
pub fn derive_filter_stats(input: &Statistics, selectivity: f64) -> Statistics {
    let selectivity = clamp_selectivity(selectivity);
    let row_count = (input.row_count * selectivity).max(1.0);
    let ratio = if input.row_count > 0.0 {
        row_count / input.row_count
    } else {
        1.0
    };

    let mut column_stats = HashMap::new();
    for (name, stats) in &input.column_stats {
        let mut cs = stats.clone();
        cs.distinct_count = (cs.distinct_count * ratio).max(1.0).min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes: input.total_size_bytes * ratio,
        column_stats,
    }
}

/// Derive statistics for aggregate output.
///
/// The number of output groups is the product of NDVs of all group-by columns,
/// capped by the input row count. A global aggregate produces exactly 1 row.
/// `row_width` is the byte width of one output row.
pub fn derive_aggregate_stats(input: &Statistics, group_by_cols: &[String], row_width: f64) -> Statistics {
    let mut row_count = 1.0_f64;
    for col in group_by_cols {
        row_count *= input.ndv(col);
    }
    row_count = row_count.min(input.row_count).max(1.0);

    let column_stats = group_by_cols
        .iter()
        .filter_map(|c| {
            input.column_stats.get(c).map(|cs| {
                let mut cs = cs.clone();
                cs.distinct_count = cs.distinct_count.min(row_count);
                (c.clone(), cs)
            })
        })
        .collect();

    Statistics {
        row_count,
        total_size_bytes: row_count * row_width,
        column_stats,
    }
}

/// Derive statistics for a projection: row count unchanged, column statistics
/// carried over to their output names.
pub fn derive_project_stats(input: &Statistics, renames: &[(String, String)]) -> Statistics {
    let mut out = Statistics::new(input.row_count, input.total_size_bytes);
    for (from, to) in renames {
        if let Some(cs) = input.column_stats.get(from) {
            out.column_stats.insert(to.clone(), cs.clone());
        }
    }
    out
}

/// Derive statistics for `LIMIT count OFFSET offset`.
pub fn derive_limit_stats(input: &Statistics, offset: u64, count: u64) -> Statistics {
    let available = (input.row_count - offset as f64).max(1.0);
    input.scaled((count as f64).min(available).max(1.0))
}

/// One input of a set operation: its statistics and its output columns.
pub struct SetOpInput<'a> {
    pub stats: &'a Statistics,
    pub columns: &'a [ColumnRef],
}

/// Upper bound on the number of distinct rows of one input: the product of its
/// column NDVs, capped by its row count.
fn distinct_row_bound(input: &SetOpInput<'_>) -> f64 {
    let product = input
        .columns
        .iter()
        .map(|c| input.stats.ndv(&c.stats_key()))
        .fold(1.0_f64, |acc, n| acc * n);
    product.min(input.stats.row_count).max(1.0)
}

/// Derive statistics for a set operation. Output columns are named after the
/// first input's columns.
pub fn derive_set_op_stats(kind: SetOpKind, qualifier: SetQualifier, inputs: &[SetOpInput<'_>]) -> Statistics {
    let Some(first) = inputs.first() else {
        return Statistics::unknown();
    };
    let width = first.stats.avg_row_size();

    let row_count = match (kind, qualifier) {
        (SetOpKind::Union, SetQualifier::All) => inputs.iter().map(|i| i.stats.row_count).sum(),
        (SetOpKind::Union, SetQualifier::Distinct) => {
            let sum: f64 = inputs.iter().map(|i| i.stats.row_count).sum();
            // Each output column can hold at most the sum of the inputs' NDVs for
            // that position.
            let max_distinct = (0..first.columns.len())
                .map(|pos| {
                    inputs
                        .iter()
                        .map(|i| {
                            i.columns
                                .get(pos)
                                .map(|c| i.stats.ndv(&c.stats_key()))
                                .unwrap_or(i.stats.row_count)
                        })
                        .sum::<f64>()
                })
                .fold(1.0_f64, |acc, n| acc * n);
            sum.min(max_distinct)
        }
        (SetOpKind::Intersect, qualifier) => {
            let smallest = inputs
                .iter()
                .map(|i| match qualifier {
                    SetQualifier::All => i.stats.row_count,
                    SetQualifier::Distinct => distinct_row_bound(i),
                })
                .fold(f64::MAX, f64::min);
            smallest * DEFAULT_SET_OVERLAP
        }
        (SetOpKind::Except, qualifier) => {
            let driving = match qualifier {
                SetQualifier::All => first.stats.row_count,
                SetQualifier::Distinct => distinct_row_bound(first),
            };
            driving * (1.0 - DEFAULT_SET_OVERLAP)
        }
    }
    .max(1.0);

    let mut column_stats = HashMap::new();
    for (pos, col) in first.columns.iter().enumerate() {
        let ndv = match kind {
            SetOpKind::Union => inputs
                .iter()
                .filter_map(|i| i.columns.get(pos).map(|c| i.stats.ndv(&c.stats_key())))
                .sum::<f64>(),
            SetOpKind::Intersect | SetOpKind::Except => first.stats.ndv(&col.stats_key()),
        };
        let mut cs = first
            .stats
            .column_stats
            .get(&col.stats_key())
            .cloned()
            .unwrap_or_else(|| ColumnStatistics::new(ndv, 0.0));
        cs.distinct_count = ndv.min(row_count).max(1.0);
        column_stats.insert(col.stats_key(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes: row_count * width,
        column_stats,
    }
}

/// Assumed fraction of the driving input's rows that also appear in the other
/// inputs of an INTERSECT / EXCEPT.
pub const DEFAULT_SET_OVERLAP: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, JoinType};

    fn cols(table: &str, names: &[&str]) -> Vec<ColumnRef> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnRef::new(Some(table), *n, i as u32, DataType::Int64))
            .collect()
    }

    #[test]
    fn test_join_cardinality_uses_max_ndv() {
        let left = Statistics::new(1000.0, 100_000.0).with_column("a", ColumnStatistics::new(100.0, 0.0));
        let right = Statistics::new(500.0, 50_000.0).with_column("b", ColumnStatistics::new(50.0, 0.0));
        let out = derive_join_stats(&left, &right, &[("a".into(), "b".into())], JoinType::Inner);
        assert!((out.row_count - 1000.0 * 500.0 / 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_left_join_preserves_left_rows() {
        let left = Statistics::new(1000.0, 100_000.0);
        let right = Statistics::new(10.0, 1000.0);
        let out = derive_join_stats(&left, &right, &[("a".into(), "b".into())], JoinType::Left);
        assert!(out.row_count >= 1000.0);
    }

    #[test]
    fn test_filter_selectivity_is_clamped() {
        let input = Statistics::new(1_000_000.0, 1e8);
        let out = derive_filter_stats(&input, 0.0);
        assert!((out.row_count - 1_000_000.0 * MIN_SELECTIVITY).abs() < 1e-6);
        let out = derive_filter_stats(&input, 7.0);
        assert_eq!(out.row_count, 1_000_000.0);
    }

    #[test]
    fn test_range_selectivity_from_min_max() {
        let stats = Statistics::new(100.0, 800.0).with_column(
            "x",
            ColumnStatistics::new(100.0, 0.0).with_range(ScalarValue::Int64(0), ScalarValue::Int64(100)),
        );
        let sel = range_selectivity(&stats, "x", BinaryOp::Lt, &ScalarValue::Int64(25));
        assert!((sel - 0.25).abs() < 1e-9);
        let sel = range_selectivity(&stats, "x", BinaryOp::Gt, &ScalarValue::Int64(25));
        assert!((sel - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_range_selectivity_prefers_histogram() {
        let hist = Histogram {
            buckets: vec![
                HistogramBucket { lower: 0.0, upper: 10.0, count: 90.0, distinct: 10.0 },
                HistogramBucket { lower: 10.0, upper: 100.0, count: 10.0, distinct: 90.0 },
            ],
        };
        let stats = Statistics::new(100.0, 800.0)
            .with_column("x", ColumnStatistics::new(100.0, 0.0).with_histogram(hist));
        let sel = range_selectivity(&stats, "x", BinaryOp::LtEq, &ScalarValue::Int64(10));
        assert!((sel - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_set_op_estimates_are_ordered() {
        let a_cols = cols("a", &["k"]);
        let b_cols = cols("b", &["k"]);
        let a = Statistics::new(1000.0, 8000.0).with_column("a.k", ColumnStatistics::new(10.0, 0.0));
        let b = Statistics::new(3000.0, 24000.0).with_column("b.k", ColumnStatistics::new(20.0, 0.0));
        let inputs = [
            SetOpInput { stats: &a, columns: &a_cols },
            SetOpInput { stats: &b, columns: &b_cols },
        ];

        let all = derive_set_op_stats(SetOpKind::Union, SetQualifier::All, &inputs);
        let distinct = derive_set_op_stats(SetOpKind::Union, SetQualifier::Distinct, &inputs);
        assert_eq!(all.row_count, 4000.0);
        assert!(distinct.row_count <= all.row_count);
        assert_eq!(distinct.row_count, 30.0);

        for q in [SetQualifier::All, SetQualifier::Distinct] {
            let except = derive_set_op_stats(SetOpKind::Except, q, &inputs);
            assert!(except.row_count <= a.row_count);
            let intersect = derive_set_op_stats(SetOpKind::Intersect, q, &inputs);
            assert!(intersect.row_count <= a.row_count.min(b.row_count));
        }
    }

    #[test]
    fn test_limit_caps_rows() {
        let input = Statistics::new(1000.0, 100_000.0);
        assert_eq!(derive_limit_stats(&input, 0, 10).row_count, 10.0);
        assert_eq!(derive_limit_stats(&input, 995, 10).row_count, 5.0);
    }
}
