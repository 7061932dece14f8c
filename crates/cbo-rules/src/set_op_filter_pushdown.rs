//! # Filter Pushdown Through Set Operations
//!
//! ```text
//! Before: Filter(p, Union(A, B))
//! After:  Union(Filter(p_A, A), Filter(p_B, B))
//! ```
//!
//! A set operation's output columns are those of its first input, and the inputs
//! line up by position. The predicate is rewritten for each input by replacing every
//! output column with the input's column at the same position.
//!
//! The rewrite holds for every kind and qualifier. For Union and Intersect a row
//! survives the filter exactly when each of its copies in the inputs does. For
//! Except a row of B that fails `p` can only cancel rows of A that fail `p` too, so
//! filtering B as well changes nothing.

use cbo_core::expr::*;
use cbo_core::memo::{GroupId, Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

pub struct SetOpFilterPushdownRule;

impl Rule for SetOpFilterPushdownRule {
    fn name(&self) -> &str {
        "FilterPushdownThroughSetOperation"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_set_operation()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &expr.op else {
            return vec![];
        };
        let Some(&set_group) = expr.children.first() else {
            return vec![];
        };
        let outputs = &memo.group(set_group).logical_props.output_columns;

        memo.group(set_group)
            .logical_exprs
            .iter()
            .filter_map(|&eid| {
                let set_op = memo.expr(eid);
                match &set_op.op {
                    Operator::Logical(LogicalOp::SetOperation { .. }) => {
                        push_into_inputs(memo, predicate, outputs, &set_op.op, &set_op.children)
                    }
                    _ => None,
                }
            })
            .collect()
    }
}

fn push_into_inputs(
    memo: &Memo,
    predicate: &Expr,
    outputs: &[ColumnRef],
    set_op: &Operator,
    inputs: &[GroupId],
) -> Option<RuleResult> {
    let children = inputs
        .iter()
        .map(|&input| {
            let input_cols = &memo.group(input).logical_props.output_columns;
            let remapped = predicate.map_columns(&|c: &ColumnRef| {
                let pos = outputs.iter().position(|o| o.same_column(c))?;
                input_cols.get(pos).cloned()
            })?;
            Some(RuleChild::NewExpr(
                Operator::Logical(LogicalOp::Filter { predicate: remapped }),
                vec![RuleChild::Group(input)],
            ))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(RuleResult::NewChildren(set_op.clone(), children))
}
