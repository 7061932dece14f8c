//! # Join Commutativity Rule
//!
//! `A JOIN B = B JOIN A` for symmetric join types (inner and cross joins).
//!
//! ## Why Commutativity Matters
//!
//! In a distributed plan the right input of a hash join is the build side, and only
//! the build side can be replicated to every node. Commutativity lets the optimizer
//! consider broadcasting either input, so a small dimension table is broadcast
//! regardless of where it appeared in the query. Combined with associativity it
//! also enables join reordering for multi-table queries.
//!
//! ## Applicability
//!
//! Left, Right, Semi and Anti joins have fixed left/right semantics and cannot be
//! commuted without changing the result.
//!
//! ## Condition Swapping
//!
//! `A.x = B.y` becomes `B.y = A.x`. Equality is symmetric, but keeping the
//! condition oriented like the inputs makes plans easier to read.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Join commutativity: A JOIN B -> B JOIN A.
pub struct JoinCommutativityRule;

impl Rule for JoinCommutativityRule {
    fn name(&self) -> &str {
        "JoinCommutativity"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &expr.op
        else {
            return vec![];
        };

        if !matches!(join_type, JoinType::Inner | JoinType::Cross) || expr.children.len() != 2 {
            return vec![];
        }

        vec![RuleResult::Substitution(
            Operator::Logical(LogicalOp::Join {
                join_type: *join_type,
                condition: swap_condition_sides(condition),
            }),
            vec![expr.children[1], expr.children[0]],
        )]
    }
}

/// For `A.x = B.y`, produce `B.y = A.x`.
fn swap_condition_sides(expr: &Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: right.clone(),
            right: left.clone(),
        },
        Expr::And(conjuncts) => Expr::And(conjuncts.iter().map(swap_condition_sides).collect()),
        other => other.clone(),
    }
}
