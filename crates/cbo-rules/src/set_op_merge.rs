//! # Set Operation Merge Rule
//!
//! Flattens nested set operations into one n-ary operation:
//!
//! ```text
//! Union(Union(A, B), C)  →  Union(A, B, C)
//! ```
//!
//! A single n-ary operation needs one partition-aligning exchange per input instead
//! of one per nesting level.
//!
//! ## When It Is Valid
//!
//! | outer             | input may be              | at position |
//! |-------------------|---------------------------|-------------|
//! | Union DISTINCT    | Union DISTINCT, Union ALL | any         |
//! | Union ALL         | Union ALL                 | any         |
//! | Intersect q       | Intersect q               | any         |
//! | Except q          | Except q                  | first only  |
//!
//! Union and Intersect are associative under a fixed qualifier, and a DISTINCT union
//! removes every duplicate an inner ALL union kept. `(A − B) − C` is `A − B − C` for
//! both qualifiers, but `A − (B − C)` is not.

use cbo_core::expr::*;
use cbo_core::memo::{GroupId, Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

pub struct SetOpMergeRule;

impl Rule for SetOpMergeRule {
    fn name(&self) -> &str {
        "SetOperationMerge"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::set_operation()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::SetOperation { kind, qualifier }) = &expr.op else {
            return vec![];
        };

        let mut merged = false;
        let mut inputs: Vec<GroupId> = Vec::with_capacity(expr.children.len());
        for (position, &child) in expr.children.iter().enumerate() {
            let mergeable = (*kind != SetOpKind::Except || position == 0)
                .then(|| mergeable_input(memo, child, *kind, *qualifier, expr.group))
                .flatten();
            match mergeable {
                Some(grandchildren) => {
                    merged = true;
                    inputs.extend(grandchildren);
                }
                None => inputs.push(child),
            }
        }

        if !merged {
            return vec![];
        }
        vec![RuleResult::Substitution(expr.op.clone(), inputs)]
    }
}

/// Inputs of a set operation in `group` that can be spliced into the outer one.
fn mergeable_input(
    memo: &Memo,
    group: GroupId,
    kind: SetOpKind,
    qualifier: SetQualifier,
    outer_group: GroupId,
) -> Option<Vec<GroupId>> {
    memo.group(group).logical_exprs.iter().find_map(|&eid| {
        let inner = memo.expr(eid);
        let Operator::Logical(LogicalOp::SetOperation {
            kind: inner_kind,
            qualifier: inner_qualifier,
        }) = &inner.op
        else {
            return None;
        };
        let compatible = *inner_kind == kind
            && (*inner_qualifier == qualifier
                || (kind == SetOpKind::Union
                    && qualifier == SetQualifier::Distinct
                    && *inner_qualifier == SetQualifier::All));
        // An input that reads the outer group would make the group its own input.
        let acyclic = inner.children.iter().all(|c| memo.find(*c) != memo.find(outer_group));
        (compatible && acyclic).then(|| inner.children.clone())
    })
}
