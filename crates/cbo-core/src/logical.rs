//! # Logical Plan Trees
//!
//! [`LogicalPlan`] is the owned, immutable relation-algebra tree handed to the
//! optimizer by the upstream analyzer. Each node exclusively owns its inputs until
//! the tree is inserted into the memo (see [`crate::memo::Memo::insert_plan`]),
//! after which the memo's groups hold the structure.
//!
//! Every constructor validates the node it builds and returns
//! [`OptimizerError::MalformedPlan`] on a structural violation, so a tree that
//! exists is well formed. In particular a set operation has at least two inputs,
//! and all of them have the same arity and pairwise compatible column types.
//!
//! Traversal goes through [`LogicalPlan::accept`] and the [`LogicalPlanVisitor`]
//! trait: inputs are visited left to right between `pre_visit` and `post_visit`.

use crate::error::{OptimizerError, Result};
use crate::expr::*;
use std::fmt::Write;

/// A node of a logical plan tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalPlan {
    op: LogicalOp,
    inputs: Vec<LogicalPlan>,
    schema: Vec<ColumnRef>,
}

fn malformed<T>(msg: impl Into<String>) -> Result<T> {
    Err(OptimizerError::MalformedPlan(msg.into()))
}

impl LogicalPlan {
    pub fn op(&self) -> &LogicalOp {
        &self.op
    }

    pub fn inputs(&self) -> &[LogicalPlan] {
        &self.inputs
    }

    /// Output columns, in order.
    pub fn schema(&self) -> &[ColumnRef] {
        &self.schema
    }

    pub fn scan(table: TableRef, columns: Vec<ColumnRef>) -> Result<Self> {
        Self::scan_with_predicate(table, columns, None)
    }

    pub fn scan_with_predicate(
        table: TableRef,
        columns: Vec<ColumnRef>,
        predicate: Option<Expr>,
    ) -> Result<Self> {
        if columns.is_empty() {
            return malformed(format!("scan of {table} selects no columns"));
        }
        let schema = columns.clone();
        Ok(Self {
            op: LogicalOp::Scan {
                table,
                columns,
                predicate,
            },
            inputs: vec![],
            schema,
        })
    }

    pub fn filter(predicate: Expr, input: LogicalPlan) -> Result<Self> {
        let schema = input.schema.clone();
        Ok(Self {
            op: LogicalOp::Filter { predicate },
            inputs: vec![input],
            schema,
        })
    }

    /// Projection. A plain column expression keeps its table qualifier, so an
    /// un-renamed column is the same column above and below the projection.
    pub fn project(exprs: Vec<Expr>, aliases: Vec<String>, input: LogicalPlan) -> Result<Self> {
        if exprs.len() != aliases.len() {
            return malformed(format!(
                "projection has {} expressions but {} aliases",
                exprs.len(),
                aliases.len()
            ));
        }
        if exprs.is_empty() {
            return malformed("projection produces no columns");
        }
        let schema = project_schema(&exprs, &aliases);
        Ok(Self {
            op: LogicalOp::Project { exprs, aliases },
            inputs: vec![input],
            schema,
        })
    }

    pub fn join(join_type: JoinType, condition: Expr, left: LogicalPlan, right: LogicalPlan) -> Result<Self> {
        let mut schema = left.schema.clone();
        if !join_type.is_left_only_output() {
            schema.extend(right.schema.iter().cloned());
        }
        Ok(Self {
            op: LogicalOp::Join {
                join_type,
                condition,
            },
            inputs: vec![left, right],
            schema,
        })
    }

    pub fn aggregate(group_by: Vec<Expr>, aggregates: Vec<AggExpr>, input: LogicalPlan) -> Result<Self> {
        if group_by.is_empty() && aggregates.is_empty() {
            return malformed("aggregate without grouping keys or aggregate functions");
        }
        let schema = aggregate_schema(&group_by, &aggregates);
        Ok(Self {
            op: LogicalOp::Aggregate {
                group_by,
                aggregates,
            },
            inputs: vec![input],
            schema,
        })
    }

    pub fn sort(order: Vec<SortKey>, input: LogicalPlan) -> Result<Self> {
        if order.is_empty() {
            return malformed("sort without keys");
        }
        let schema = input.schema.clone();
        Ok(Self {
            op: LogicalOp::Sort { order },
            inputs: vec![input],
            schema,
        })
    }

    pub fn limit(offset: u64, count: u64, input: LogicalPlan) -> Result<Self> {
        let schema = input.schema.clone();
        Ok(Self {
            op: LogicalOp::Limit { offset, count },
            inputs: vec![input],
            schema,
        })
    }

    /// Set operation over two or more inputs. The output columns are those of the
    /// first input.
    pub fn set_operation(kind: SetOpKind, qualifier: SetQualifier, inputs: Vec<LogicalPlan>) -> Result<Self> {
        validate_set_inputs(kind, &inputs)?;
        let schema = inputs[0].schema.clone();
        Ok(Self {
            op: LogicalOp::SetOperation { kind, qualifier },
            inputs,
            schema,
        })
    }

    pub fn union(qualifier: SetQualifier, inputs: Vec<LogicalPlan>) -> Result<Self> {
        Self::set_operation(SetOpKind::Union, qualifier, inputs)
    }

    pub fn intersect(qualifier: SetQualifier, inputs: Vec<LogicalPlan>) -> Result<Self> {
        Self::set_operation(SetOpKind::Intersect, qualifier, inputs)
    }

    pub fn except(qualifier: SetQualifier, inputs: Vec<LogicalPlan>) -> Result<Self> {
        Self::set_operation(SetOpKind::Except, qualifier, inputs)
    }

    /// Performs a depth-first traversal of this tree calling methods of `visitor`.
    ///
    /// If [`LogicalPlanVisitor::pre_visit`] returns `Ok(false)` the inputs of the
    /// node are not visited (but `post_visit` still is). If an error is returned
    /// the traversal terminates.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<()>
    where
        V: LogicalPlanVisitor,
    {
        if visitor.pre_visit(self)? {
            for input in &self.inputs {
                input.accept(visitor)?;
            }
        }
        visitor.post_visit(self)
    }

    /// Indented text rendering of the tree.
    pub fn explain(&self) -> String {
        let mut explain = Explain::default();
        // Explain never fails.
        let _ = self.accept(&mut explain);
        explain.out
    }
}

/// Called by [`LogicalPlan::accept`] during a traversal of a plan tree.
pub trait LogicalPlanVisitor {
    /// Called before the inputs of `plan` are visited. Returning `Ok(false)` skips
    /// them. Default implementation always returns `Ok(true)`.
    fn pre_visit(&mut self, _plan: &LogicalPlan) -> Result<bool> {
        Ok(true)
    }

    /// Called after all inputs of `plan` are visited.
    fn post_visit(&mut self, plan: &LogicalPlan) -> Result<()>;
}

#[derive(Default)]
struct Explain {
    depth: usize,
    out: String,
}

impl LogicalPlanVisitor for Explain {
    fn pre_visit(&mut self, plan: &LogicalPlan) -> Result<bool> {
        let _ = writeln!(self.out, "{}{}", "  ".repeat(self.depth), plan.op);
        self.depth += 1;
        Ok(true)
    }

    fn post_visit(&mut self, _plan: &LogicalPlan) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        Ok(())
    }
}

/// Output columns of a projection. A bare column keeps its table qualifier and
/// type under the alias; computed expressions are unqualified.
pub fn project_schema(exprs: &[Expr], aliases: &[String]) -> Vec<ColumnRef> {
    exprs
        .iter()
        .zip(aliases)
        .enumerate()
        .map(|(i, (e, alias))| match e {
            Expr::Column(c) => ColumnRef {
                table: c.table.clone(),
                name: alias.clone(),
                index: i as u32,
                data_type: c.data_type,
            },
            other => ColumnRef::new(None, alias.clone(), i as u32, other.data_type()),
        })
        .collect()
}

/// Output columns of an aggregation: group keys first, then one column per
/// aggregate.
pub fn aggregate_schema(group_by: &[Expr], aggregates: &[AggExpr]) -> Vec<ColumnRef> {
    let mut schema: Vec<ColumnRef> = group_by
        .iter()
        .enumerate()
        .map(|(i, e)| match e {
            Expr::Column(c) => ColumnRef {
                index: i as u32,
                ..c.clone()
            },
            other => ColumnRef::new(None, format!("group_{i}"), i as u32, other.data_type()),
        })
        .collect();
    let offset = schema.len();
    schema.extend(aggregates.iter().enumerate().map(|(i, a)| {
        let name = format!("{:?}_{}", a.func, i).to_lowercase();
        ColumnRef::new(None, name, (offset + i) as u32, a.data_type())
    }));
    schema
}

fn validate_set_inputs(kind: SetOpKind, inputs: &[LogicalPlan]) -> Result<()> {
    if inputs.len() < 2 {
        return malformed(format!("{kind} needs at least 2 inputs, got {}", inputs.len()));
    }
    let first = &inputs[0].schema;
    for (i, input) in inputs.iter().enumerate().skip(1) {
        if input.schema.len() != first.len() {
            return malformed(format!(
                "{kind} input {i} has {} columns, input 0 has {}",
                input.schema.len(),
                first.len()
            ));
        }
        for (pos, (a, b)) in first.iter().zip(&input.schema).enumerate() {
            if !a.data_type.is_compatible_with(&b.data_type) {
                return malformed(format!(
                    "{kind} column {pos}: {:?} of input 0 is incompatible with {:?} of input {i}",
                    a.data_type, b.data_type
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(table: &str, cols: &[(&str, DataType)]) -> LogicalPlan {
        let columns = cols
            .iter()
            .enumerate()
            .map(|(i, (n, t))| ColumnRef::new(Some(table), *n, i as u32, *t))
            .collect();
        LogicalPlan::scan(TableRef::new("s", table), columns).unwrap()
    }

    #[test]
    fn test_set_operation_requires_two_inputs() {
        let a = scan("a", &[("x", DataType::Int64)]);
        let err = LogicalPlan::union(SetQualifier::All, vec![a]).unwrap_err();
        assert!(matches!(err, OptimizerError::MalformedPlan(_)));
    }

    #[test]
    fn test_set_operation_arity_mismatch() {
        let a = scan("a", &[("x", DataType::Int64)]);
        let b = scan("b", &[("x", DataType::Int64), ("y", DataType::Int64)]);
        let err = LogicalPlan::except(SetQualifier::Distinct, vec![a, b]).unwrap_err();
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn test_set_operation_type_mismatch() {
        let a = scan("a", &[("x", DataType::Int64)]);
        let b = scan("b", &[("x", DataType::Utf8)]);
        assert!(LogicalPlan::intersect(SetQualifier::All, vec![a, b]).is_err());

        let a = scan("a", &[("x", DataType::Int32)]);
        let b = scan("b", &[("x", DataType::Float64)]);
        assert!(LogicalPlan::intersect(SetQualifier::All, vec![a, b]).is_ok());
    }

    #[test]
    fn test_set_operation_schema_is_first_input() {
        let a = scan("a", &[("x", DataType::Int64)]);
        let b = scan("b", &[("y", DataType::Int64)]);
        let u = LogicalPlan::union(SetQualifier::Distinct, vec![a.clone(), b]).unwrap();
        assert_eq!(u.schema(), a.schema());
    }

    #[test]
    fn test_semi_join_outputs_left_only() {
        let a = scan("a", &[("x", DataType::Int64)]);
        let b = scan("b", &[("y", DataType::Int64)]);
        let cond = Expr::binary(
            BinaryOp::Eq,
            Expr::column(&a.schema()[0]),
            Expr::column(&b.schema()[0]),
        );
        let j = LogicalPlan::join(JoinType::Semi, cond, a, b).unwrap();
        assert_eq!(j.schema().len(), 1);
    }

    #[test]
    fn test_pre_visit_false_skips_inputs() {
        struct Count {
            visited: usize,
        }
        impl LogicalPlanVisitor for Count {
            fn pre_visit(&mut self, plan: &LogicalPlan) -> Result<bool> {
                Ok(!matches!(plan.op(), LogicalOp::SetOperation { .. }))
            }
            fn post_visit(&mut self, _plan: &LogicalPlan) -> Result<()> {
                self.visited += 1;
                Ok(())
            }
        }

        let a = scan("a", &[("x", DataType::Int64)]);
        let b = scan("b", &[("x", DataType::Int64)]);
        let u = LogicalPlan::union(SetQualifier::All, vec![a, b]).unwrap();
        let plan = LogicalPlan::limit(0, 10, u).unwrap();

        let mut count = Count { visited: 0 };
        plan.accept(&mut count).unwrap();
        assert_eq!(count.visited, 2);
    }

    #[test]
    fn test_explain_indents_inputs() {
        let a = scan("a", &[("x", DataType::Int64)]);
        let b = scan("b", &[("x", DataType::Int64)]);
        let plan = LogicalPlan::except(SetQualifier::Distinct, vec![a, b]).unwrap();
        let text = plan.explain();
        assert!(text.starts_with("EXCEPT DISTINCT\n"));
        assert!(text.contains("\n  Scan s.a\n"));
    }
}
