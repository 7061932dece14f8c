//! # Expression and Operator Types
//!
//! This module defines the type system for the optimizer's plan representation.
//! It is organized into three layers:
//!
//! ## Scalar Expressions (`Expr`)
//! Scalar expressions represent computations on individual rows: column references,
//! literal values, arithmetic operations, comparisons, boolean logic, and function calls.
//! They appear inside predicates, projections, join conditions, and sort keys.
//!
//! ## Logical Operators (`LogicalOp`)
//! Logical operators describe *what* to compute without specifying *how*. A logical
//! `SetOperation` says "combine these relations with EXCEPT DISTINCT semantics" but does
//! not say whether the combine happens in a hash table or over sorted streams, nor how
//! the inputs are distributed across the cluster.
//!
//! ## Physical Operators (`PhysicalOp`)
//! Physical operators describe *how* to execute a computation, including the data
//! movement (`Exchange`) needed between distributed stages. They are produced by
//! implementation rules and by the enforcer planner.
//!
//! ## Unified `Operator` Enum
//! The `Operator` enum wraps both logical and physical operators so that the memo can
//! store them uniformly. The `OpKind` discriminant allows pattern matching on operator
//! type without inspecting the operator's data fields.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column data types, as resolved by the upstream analyzer.
///
/// Only the distinctions the optimizer needs are kept: set operations check that
/// their inputs line up column by column, and aggregate outputs are sized from
/// the widths of their columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Decimal,
    Utf8,
    Date,
    /// Type of an untyped NULL literal; compatible with every other type.
    Null,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int32 | DataType::Int64 | DataType::Float64 | DataType::Decimal
        )
    }

    /// Whether values of `self` and `other` can be combined in one output column.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self == other
            || matches!(self, DataType::Null)
            || matches!(other, DataType::Null)
            || (self.is_numeric() && other.is_numeric())
    }

    /// Estimated width in bytes of one value.
    pub fn width(&self) -> f64 {
        match self {
            DataType::Boolean => 1.0,
            DataType::Int32 | DataType::Date => 4.0,
            DataType::Int64 | DataType::Float64 => 8.0,
            DataType::Decimal => 16.0,
            DataType::Utf8 => 32.0,
            DataType::Null => 1.0,
        }
    }
}

/// Reference to a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub index: u32,
    pub data_type: DataType,
}

impl ColumnRef {
    pub fn new(
        table: Option<&str>,
        name: impl Into<String>,
        index: u32,
        data_type: DataType,
    ) -> Self {
        Self {
            table: table.map(str::to_string),
            name: name.into(),
            index,
            data_type,
        }
    }

    /// Same table qualifier and name, ignoring ordinal and type.
    pub fn same_column(&self, other: &ColumnRef) -> bool {
        self.table == other.table && self.name == other.name
    }

    /// Key of this column in [`crate::stats::Statistics::column_stats`]: the
    /// qualified name, so same-named columns of different tables stay apart.
    pub fn stats_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.table {
            write!(f, "{}.{}", t, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that floating-point values can be used as
/// hash map keys and in Eq/Hash comparisons (needed for memo deduplication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Bool(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
            ScalarValue::Date(_) => DataType::Date,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{}", v.0),
            ScalarValue::Utf8(v) => write!(f, "'{v}'"),
            ScalarValue::Date(v) => write!(f, "DATE({v})"),
        }
    }
}

/// Scalar expressions used in predicates, projections, join conditions, etc.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a column by name and ordinal index.
    Column(ColumnRef),
    /// Constant literal value.
    Literal(ScalarValue),
    /// Binary operation (e.g., `a + b`, `x = y`, `price > 100`).
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation (e.g., `NOT flag`, `-value`, `IS NULL`).
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// Named function call (e.g., `UPPER(name)`, `ABS(value)`).
    Function { name: String, args: Vec<Expr> },
    /// Conjunction (AND) stored as a flat list to simplify predicate decomposition.
    And(Vec<Expr>),
    /// Disjunction (OR) of multiple predicates.
    Or(Vec<Expr>),
}

impl Expr {
    pub fn column(col: &ColumnRef) -> Self {
        Expr::Column(col.clone())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Combine predicates into a single conjunction, flattening nested ANDs.
    ///
    /// Returns `None` for an empty input so callers can drop a vacuous predicate.
    pub fn conjunction(predicates: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        let mut flat: Vec<Expr> = Vec::new();
        for p in predicates {
            flat.extend(p.conjuncts().into_iter().cloned());
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::And(flat)),
        }
    }

    /// Return all column references in this expression.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_columns(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// Check if this expression references columns from a given table.
    pub fn references_table(&self, table: &str) -> bool {
        self.columns()
            .iter()
            .any(|c| c.table.as_deref() == Some(table))
    }

    /// Flatten AND-chains: (A AND (B AND C)) → [A, B, C].
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Rebuild the expression with every column reference passed through `f`.
    ///
    /// `f` returns `None` when a column cannot be mapped, in which case the whole
    /// rewrite fails.
    pub fn map_columns<F>(&self, f: &F) -> Option<Expr>
    where
        F: Fn(&ColumnRef) -> Option<ColumnRef>,
    {
        Some(match self {
            Expr::Column(c) => Expr::Column(f(c)?),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.map_columns(f)?),
                right: Box::new(right.map_columns(f)?),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.map_columns(f)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.map_columns(f))
                    .collect::<Option<Vec<_>>>()?,
            },
            Expr::And(exprs) => Expr::And(
                exprs
                    .iter()
                    .map(|e| e.map_columns(f))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Expr::Or(exprs) => Expr::Or(
                exprs
                    .iter()
                    .map(|e| e.map_columns(f))
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }

    /// Result type of the expression.
    ///
    /// Functions are opaque to the optimizer; their type is taken from the first
    /// argument, which is right for the common scalar functions and harmless for
    /// costing otherwise.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Column(c) => c.data_type,
            Expr::Literal(v) => v.data_type(),
            Expr::BinaryOp { op, left, right } => {
                if op.is_comparison() {
                    DataType::Boolean
                } else {
                    let (l, r) = (left.data_type(), right.data_type());
                    if l == DataType::Float64 || r == DataType::Float64 {
                        DataType::Float64
                    } else if l == DataType::Null {
                        r
                    } else {
                        l
                    }
                }
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Neg => operand.data_type(),
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => DataType::Boolean,
            },
            Expr::Function { args, .. } => args
                .first()
                .map(|a| a.data_type())
                .unwrap_or(DataType::Null),
            Expr::And(_) | Expr::Or(_) => DataType::Boolean,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::BinaryOp { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT {operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::IsNull => write!(f, "{operand} IS NULL"),
                UnaryOp::IsNotNull => write!(f, "{operand} IS NOT NULL"),
            },
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::And(exprs) => write_list(f, exprs, " AND "),
            Expr::Or(exprs) => {
                write!(f, "(")?;
                write_list(f, exprs, " OR ")?;
                write!(f, ")")
            }
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        f.write_str(s)
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// SQL join types.
///
/// The join type affects which rows are produced and which optimization rules apply.
/// Only Inner and Cross joins are commutative; Left and Semi joins have fixed
/// left/right semantics and cannot be swapped. It also limits the distribution
/// strategies: replicating the right side of a Right or Full outer join would emit
/// its unmatched rows once per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

impl JoinType {
    /// Whether the right input may be replicated to every node.
    pub fn allows_broadcast_right(&self) -> bool {
        !matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Whether the output only contains columns of the left input.
    pub fn is_left_only_output(&self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// Aggregate expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub arg: Expr,
    pub distinct: bool,
}

impl AggExpr {
    pub fn data_type(&self) -> DataType {
        match self.func {
            AggFunc::Count => DataType::Int64,
            AggFunc::Avg => DataType::Float64,
            AggFunc::Sum | AggFunc::Min | AggFunc::Max => self.arg.data_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
            nulls_first: false,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, if self.ascending { "ASC" } else { "DESC" })
    }
}

/// Kind of a set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

impl fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOpKind::Union => f.write_str("UNION"),
            SetOpKind::Intersect => f.write_str("INTERSECT"),
            SetOpKind::Except => f.write_str("EXCEPT"),
        }
    }
}

/// Duplicate handling of a set operation.
///
/// `All` keeps multiset semantics (UNION ALL concatenates, EXCEPT ALL subtracts
/// occurrence counts); `Distinct` removes duplicate rows from the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetQualifier {
    Distinct,
    All,
}

impl fmt::Display for SetQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetQualifier::Distinct => f.write_str("DISTINCT"),
            SetQualifier::All => f.write_str("ALL"),
        }
    }
}

/// Distribution strategy chosen for a hash join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinDistribution {
    /// Both inputs hash-partitioned on their join keys (co-located join).
    Shuffle,
    /// Right (build) input replicated to every node; left input stays in place.
    Broadcast,
}

/// Data movement performed by an `Exchange` operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Collect every row on a single node.
    Gather,
    /// Replicate every row to all nodes.
    Broadcast,
    /// Repartition rows by hashing the given columns.
    Shuffle(Vec<ColumnRef>),
    /// Spread rows evenly with no locality guarantee.
    RoundRobin,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Gather => f.write_str("GATHER"),
            ExchangeKind::Broadcast => f.write_str("BROADCAST"),
            ExchangeKind::Shuffle(cols) => {
                write!(f, "SHUFFLE(")?;
                write_list(f, cols, ", ")?;
                write!(f, ")")
            }
            ExchangeKind::RoundRobin => f.write_str("ROUND_ROBIN"),
        }
    }
}

/// Logical operators -- represent *what* to compute, not *how*.
///
/// Children of logical operators are referenced by group ID in the memo, not stored
/// inline here. The owned tree form used before memo insertion is
/// [`crate::logical::LogicalPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    /// Table scan: reads rows from a base table with optional column pruning and
    /// pushed-down filter predicate. Always a leaf.
    Scan {
        table: TableRef,
        columns: Vec<ColumnRef>,
        predicate: Option<Expr>,
    },
    /// Filter: applies a predicate to its single child.
    Filter { predicate: Expr },
    /// Projection: computes a set of output expressions from its child's columns.
    Project { exprs: Vec<Expr>, aliases: Vec<String> },
    /// Join: combines two child relations using the given join type and condition.
    Join { join_type: JoinType, condition: Expr },
    /// Aggregate: groups rows by `group_by` and computes aggregate functions.
    Aggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Sort: orders the output by the given sort keys.
    Sort { order: Vec<SortKey> },
    /// Limit: returns at most `count` rows starting from `offset`.
    Limit { offset: u64, count: u64 },
    /// Set operation over two or more children with identical arity. The output
    /// columns are those of the first (driving) child.
    SetOperation {
        kind: SetOpKind,
        qualifier: SetQualifier,
    },
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::Scan {
                table, predicate, ..
            } => {
                write!(f, "Scan {table}")?;
                if let Some(p) = predicate {
                    write!(f, " [{p}]")?;
                }
                Ok(())
            }
            LogicalOp::Filter { predicate } => write!(f, "Filter [{predicate}]"),
            LogicalOp::Project { exprs, .. } => {
                write!(f, "Project [")?;
                write_list(f, exprs, ", ")?;
                write!(f, "]")
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => write!(f, "Join {join_type:?} [{condition}]"),
            LogicalOp::Aggregate { group_by, aggregates } => {
                write!(f, "Aggregate group_by=[")?;
                write_list(f, group_by, ", ")?;
                write!(f, "] aggs={}", aggregates.len())
            }
            LogicalOp::Sort { order } => {
                write!(f, "Sort [")?;
                write_list(f, order, ", ")?;
                write!(f, "]")
            }
            LogicalOp::Limit { offset, count } => write!(f, "Limit {count} offset {offset}"),
            LogicalOp::SetOperation { kind, qualifier } => write!(f, "{kind} {qualifier}"),
        }
    }
}

/// Physical operators -- represent *how* to execute a computation.
///
/// Each physical operator has well-defined execution semantics, distribution
/// requirements on its inputs (see [`crate::enforcer`]), and cost characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOp {
    /// Sequential (full) table scan. Output keeps the table's storage distribution.
    SeqScan {
        table: TableRef,
        columns: Vec<ColumnRef>,
        predicate: Option<Expr>,
    },
    /// Row-by-row predicate evaluation; keeps its input's distribution and order.
    Filter { predicate: Expr },
    /// Expression evaluation; keeps its input's distribution where columns survive.
    Project { exprs: Vec<Expr>, aliases: Vec<String> },
    /// Hash join: builds a hash table on the right input and probes it with the left.
    /// `distribution` selects how the two inputs are brought together.
    HashJoin {
        join_type: JoinType,
        condition: Expr,
        distribution: JoinDistribution,
    },
    /// Nested loop join: the universal fallback for non-equi and cross joins.
    NestedLoopJoin { join_type: JoinType, condition: Expr },
    /// Hash aggregate over inputs partitioned on the grouping keys.
    HashAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Global sort implementing ORDER BY; runs on a single node.
    Sort { order: Vec<SortKey> },
    /// Per-node sort enforcer; keeps the input distribution.
    LocalSort { order: Vec<SortKey> },
    /// Global limit; runs on a single node.
    Limit { offset: u64, count: u64 },
    /// Streaming union-merge: concatenates its inputs without touching duplicates.
    UnionAll,
    /// Hash-based combine for UNION DISTINCT, INTERSECT and EXCEPT. Each node
    /// builds a hash table over its partition of every input; inputs must be
    /// co-partitioned on all columns so equal rows meet on the same node.
    HashSetOp {
        kind: SetOpKind,
        qualifier: SetQualifier,
    },
    /// Sort-based combine: same co-partitioning as `HashSetOp`, plus every input
    /// sorted on all columns so the combine is a single merge pass.
    SortMergeSetOp {
        kind: SetOpKind,
        qualifier: SetQualifier,
    },
    /// Exchange: redistributes data across worker nodes.
    Exchange { kind: ExchangeKind },
}

impl PhysicalOp {
    /// Enforcers are inserted by the property planner rather than by rules; their
    /// single child is the group they enforce properties on.
    pub fn is_enforcer(&self) -> bool {
        matches!(self, PhysicalOp::LocalSort { .. } | PhysicalOp::Exchange { .. })
    }

    pub fn is_exchange(&self) -> bool {
        matches!(self, PhysicalOp::Exchange { .. })
    }
}

impl fmt::Display for PhysicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalOp::SeqScan {
                table, predicate, ..
            } => {
                write!(f, "SeqScan {table}")?;
                if let Some(p) = predicate {
                    write!(f, " [{p}]")?;
                }
                Ok(())
            }
            PhysicalOp::Filter { predicate } => write!(f, "Filter [{predicate}]"),
            PhysicalOp::Project { exprs, .. } => {
                write!(f, "Project [")?;
                write_list(f, exprs, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::HashJoin {
                join_type,
                condition,
                distribution,
            } => write!(f, "HashJoin {join_type:?} {distribution:?} [{condition}]"),
            PhysicalOp::NestedLoopJoin {
                join_type,
                condition,
            } => write!(f, "NestedLoopJoin {join_type:?} [{condition}]"),
            PhysicalOp::HashAggregate { group_by, aggregates } => {
                write!(f, "HashAggregate group_by=[")?;
                write_list(f, group_by, ", ")?;
                write!(f, "] aggs={}", aggregates.len())
            }
            PhysicalOp::Sort { order } => {
                write!(f, "Sort [")?;
                write_list(f, order, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::LocalSort { order } => {
                write!(f, "LocalSort [")?;
                write_list(f, order, ", ")?;
                write!(f, "]")
            }
            PhysicalOp::Limit { offset, count } => write!(f, "Limit {count} offset {offset}"),
            PhysicalOp::UnionAll => f.write_str("UnionAll"),
            PhysicalOp::HashSetOp { kind, qualifier } => write!(f, "HashSetOp {kind} {qualifier}"),
            PhysicalOp::SortMergeSetOp { kind, qualifier } => {
                write!(f, "SortMergeSetOp {kind} {qualifier}")
            }
            PhysicalOp::Exchange { kind } => write!(f, "Exchange {kind}"),
        }
    }
}

/// Unified operator enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Logical(LogicalOp),
    Physical(PhysicalOp),
}

impl Operator {
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Logical(l) => OpKind::Logical(l.kind()),
            Operator::Physical(p) => OpKind::Physical(p.kind()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Logical(l) => write!(f, "{l}"),
            Operator::Physical(p) => write!(f, "{p}"),
        }
    }
}

/// Kind discriminant for pattern matching (without data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Logical(LogicalOpKind),
    Physical(PhysicalOpKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOpKind {
    Scan,
    Filter,
    Project,
    Join,
    Aggregate,
    Sort,
    Limit,
    SetOperation,
}

impl LogicalOp {
    pub fn kind(&self) -> LogicalOpKind {
        match self {
            LogicalOp::Scan { .. } => LogicalOpKind::Scan,
            LogicalOp::Filter { .. } => LogicalOpKind::Filter,
            LogicalOp::Project { .. } => LogicalOpKind::Project,
            LogicalOp::Join { .. } => LogicalOpKind::Join,
            LogicalOp::Aggregate { .. } => LogicalOpKind::Aggregate,
            LogicalOp::Sort { .. } => LogicalOpKind::Sort,
            LogicalOp::Limit { .. } => LogicalOpKind::Limit,
            LogicalOp::SetOperation { .. } => LogicalOpKind::SetOperation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOpKind {
    SeqScan,
    Filter,
    Project,
    HashJoin,
    NestedLoopJoin,
    HashAggregate,
    Sort,
    LocalSort,
    Limit,
    UnionAll,
    HashSetOp,
    SortMergeSetOp,
    Exchange,
}

impl PhysicalOp {
    pub fn kind(&self) -> PhysicalOpKind {
        match self {
            PhysicalOp::SeqScan { .. } => PhysicalOpKind::SeqScan,
            PhysicalOp::Filter { .. } => PhysicalOpKind::Filter,
            PhysicalOp::Project { .. } => PhysicalOpKind::Project,
            PhysicalOp::HashJoin { .. } => PhysicalOpKind::HashJoin,
            PhysicalOp::NestedLoopJoin { .. } => PhysicalOpKind::NestedLoopJoin,
            PhysicalOp::HashAggregate { .. } => PhysicalOpKind::HashAggregate,
            PhysicalOp::Sort { .. } => PhysicalOpKind::Sort,
            PhysicalOp::LocalSort { .. } => PhysicalOpKind::LocalSort,
            PhysicalOp::Limit { .. } => PhysicalOpKind::Limit,
            PhysicalOp::UnionAll => PhysicalOpKind::UnionAll,
            PhysicalOp::HashSetOp { .. } => PhysicalOpKind::HashSetOp,
            PhysicalOp::SortMergeSetOp { .. } => PhysicalOpKind::SortMergeSetOp,
            PhysicalOp::Exchange { .. } => PhysicalOpKind::Exchange,
        }
    }
}

/// Collect `(left, right)` column pairs of the equality conjuncts in a join
/// condition, oriented so that the first column belongs to `left_columns`.
///
/// Conjuncts whose columns cannot be attributed to one side each are ignored.
pub fn equi_join_keys(
    condition: &Expr,
    left_columns: &[ColumnRef],
    right_columns: &[ColumnRef],
) -> Vec<(ColumnRef, ColumnRef)> {
    let in_side = |c: &ColumnRef, side: &[ColumnRef]| side.iter().any(|s| s.same_column(c));
    condition
        .conjuncts()
        .into_iter()
        .filter_map(|conjunct| match conjunct {
            Expr::BinaryOp {
                op: BinaryOp::Eq,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(a), Expr::Column(b)) => {
                    if in_side(a, left_columns) && in_side(b, right_columns) {
                        Some((a.clone(), b.clone()))
                    } else if in_side(b, left_columns) && in_side(a, right_columns) {
                        Some((b.clone(), a.clone()))
                    } else {
                        None
                    }
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Check if an expression contains at least one equi-join predicate (col = col).
pub fn has_equi_predicate(expr: &Expr) -> bool {
    match expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => matches!(
            (left.as_ref(), right.as_ref()),
            (Expr::Column(_), Expr::Column(_))
        ),
        Expr::And(conjuncts) => conjuncts.iter().any(has_equi_predicate),
        _ => false,
    }
}
