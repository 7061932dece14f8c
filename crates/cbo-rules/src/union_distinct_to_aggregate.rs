//! # Union DISTINCT to Aggregate Rule
//!
//! ```text
//! Before: Union DISTINCT(A, B, C)
//! After:  Aggregate(group by all columns, Union ALL(A, B, C))
//! ```
//!
//! The rewritten form concatenates the inputs where they are and removes
//! duplicates in one hash aggregate, so only the concatenated rows are shuffled
//! once on the grouping columns. The direct form needs each input partitioned on
//! all of its columns. Both stay in the memo and cost decides.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

pub struct UnionDistinctToAggregateRule;

impl Rule for UnionDistinctToAggregateRule {
    fn name(&self) -> &str {
        "UnionDistinctToAggregate"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::set_operation()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::SetOperation {
            kind: SetOpKind::Union,
            qualifier: SetQualifier::Distinct,
        }) = &expr.op
        else {
            return vec![];
        };

        let outputs = &memo.group(expr.group).logical_props.output_columns;
        if outputs.is_empty() {
            return vec![];
        }

        let union_all = RuleChild::NewExpr(
            Operator::Logical(LogicalOp::SetOperation {
                kind: SetOpKind::Union,
                qualifier: SetQualifier::All,
            }),
            expr.children.iter().map(|&g| RuleChild::Group(g)).collect(),
        );
        vec![RuleResult::NewChildren(
            Operator::Logical(LogicalOp::Aggregate {
                group_by: outputs.iter().map(Expr::column).collect(),
                aggregates: vec![],
            }),
            vec![union_all],
        )]
    }
}
