//! # Set Operation Implementation Rule
//!
//! | logical                    | physical alternatives       |
//! |----------------------------|-----------------------------|
//! | UNION ALL                  | UnionAll                    |
//! | UNION DISTINCT             | HashSetOp, SortMergeSetOp   |
//! | INTERSECT / EXCEPT (both)  | HashSetOp, SortMergeSetOp   |
//!
//! `UnionAll` concatenates its inputs wherever they are and needs no exchange.
//! The combining operators need every input hash-partitioned on all of its
//! columns, so that equal rows of all inputs meet on one node; the sort-merge
//! variant additionally needs each input sorted on all columns. Which one wins is
//! decided by cost.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

pub struct ImplSetOperationRule;

impl Rule for ImplSetOperationRule {
    fn name(&self) -> &str {
        "ImplSetOperation"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::set_operation()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::SetOperation { kind, qualifier }) = &expr.op else {
            return vec![];
        };
        let (kind, qualifier) = (*kind, *qualifier);

        let ops = if kind == SetOpKind::Union && qualifier == SetQualifier::All {
            vec![PhysicalOp::UnionAll]
        } else {
            vec![
                PhysicalOp::HashSetOp { kind, qualifier },
                PhysicalOp::SortMergeSetOp { kind, qualifier },
            ]
        };

        ops.into_iter()
            .map(|op| RuleResult::Substitution(Operator::Physical(op), expr.children.clone()))
            .collect()
    }
}
