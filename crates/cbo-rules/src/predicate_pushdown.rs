//! # Predicate Pushdown Rule
//!
//! Predicate pushdown reduces the amount of data flowing through the plan, and in a
//! distributed plan the amount of data each exchange moves, as early as possible.
//!
//! ## What It Does
//!
//! When a Filter sits on top of an inner or cross Join, each conjunct of the filter
//! goes as deep as its columns allow:
//!
//! ```text
//! Before: Filter(a.x > 1 AND a.k = b.k AND b.y = 2, Join(A, B, cond))
//! After:  Join(Filter(a.x > 1, A), Filter(b.y = 2, B), cond AND a.k = b.k)
//! ```
//!
//! Over a left, semi or anti join only conjuncts on the left input may move, since
//! the join decides which right rows survive; the rest stays in a filter on top.
//!
//! ## Memo-Based Approach
//!
//! The rewrite adds an equivalent expression to the filter's group. The original
//! Filter-over-Join plan remains in the memo as an alternative, and the cost model
//! chooses the cheaper option.

use cbo_core::expr::*;
use cbo_core::memo::{GroupId, Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

/// Push filter predicates into and below joins.
pub struct PredicatePushdownRule;

impl Rule for PredicatePushdownRule {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_join()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &expr.op else {
            return vec![];
        };
        let Some(&join_group) = expr.children.first() else {
            return vec![];
        };

        let mut results = Vec::new();
        for &eid in &memo.group(join_group).logical_exprs {
            let join = memo.expr(eid);
            if let Operator::Logical(LogicalOp::Join {
                join_type,
                condition,
            }) = &join.op
            {
                if join.children.len() == 2 {
                    results.extend(push_into_join(
                        memo,
                        predicate,
                        *join_type,
                        condition,
                        join.children[0],
                        join.children[1],
                    ));
                }
            }
        }
        results
    }
}

fn push_into_join(
    memo: &Memo,
    predicate: &Expr,
    join_type: JoinType,
    condition: &Expr,
    left: GroupId,
    right: GroupId,
) -> Option<RuleResult> {
    let columns_of = |g: GroupId| memo.group(g).logical_props.output_columns.clone();
    let (left_cols, right_cols) = (columns_of(left), columns_of(right));
    let only_from = |e: &Expr, side: &[ColumnRef]| {
        let cols = e.columns();
        !cols.is_empty() && cols.iter().all(|c| side.iter().any(|s| s.same_column(c)))
    };

    let (mut to_left, mut to_right, mut to_join, mut keep) = (vec![], vec![], vec![], vec![]);
    let inner_like = matches!(join_type, JoinType::Inner | JoinType::Cross);
    for conjunct in predicate.conjuncts() {
        if only_from(conjunct, &left_cols) && join_type != JoinType::Right && join_type != JoinType::Full {
            to_left.push(conjunct.clone());
        } else if inner_like && only_from(conjunct, &right_cols) {
            to_right.push(conjunct.clone());
        } else if inner_like {
            to_join.push(conjunct.clone());
        } else {
            keep.push(conjunct.clone());
        }
    }

    // Nothing moved; the rewrite would be the original expression.
    if to_left.is_empty() && to_right.is_empty() && to_join.is_empty() {
        return None;
    }

    let filtered = |preds: Vec<Expr>, group: GroupId| match Expr::conjunction(preds) {
        Some(p) => RuleChild::NewExpr(
            Operator::Logical(LogicalOp::Filter { predicate: p }),
            vec![RuleChild::Group(group)],
        ),
        None => RuleChild::Group(group),
    };

    let new_join_type = if join_type == JoinType::Cross && !to_join.is_empty() {
        JoinType::Inner
    } else {
        join_type
    };
    let mut join_conjuncts: Vec<Expr> = match condition {
        Expr::Literal(ScalarValue::Bool(true)) => vec![],
        c => c.conjuncts().into_iter().cloned().collect(),
    };
    join_conjuncts.extend(to_join);
    let new_join = Operator::Logical(LogicalOp::Join {
        join_type: new_join_type,
        condition: Expr::conjunction(join_conjuncts).unwrap_or(Expr::Literal(ScalarValue::Bool(true))),
    });
    let join_children = vec![filtered(to_left, left), filtered(to_right, right)];

    Some(match Expr::conjunction(keep) {
        None => RuleResult::NewChildren(new_join, join_children),
        Some(rest) => RuleResult::NewChildren(
            Operator::Logical(LogicalOp::Filter { predicate: rest }),
            vec![RuleChild::NewExpr(new_join, join_children)],
        ),
    })
}
