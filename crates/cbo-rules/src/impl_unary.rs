//! # Single-Input Implementation Rules
//!
//! One-to-one mappings for the logical operators with a single physical
//! counterpart. The interesting part of these operators is their property
//! requirements, which live with the plan selector:
//!
//! - `Filter` and `Project` run wherever their input is.
//! - `Sort` (ORDER BY) and `Limit` run on a single node. A global order over a
//!   partitioned input needs a gather first; the per-node `LocalSort` enforcer is
//!   not a substitute for it.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Replace the operator of `expr` with `op`, keeping its inputs.
fn substitute(expr: &MemoExpr, op: PhysicalOp) -> Vec<RuleResult> {
    vec![RuleResult::Substitution(Operator::Physical(op), expr.children.clone())]
}

pub struct ImplFilterRule;

impl Rule for ImplFilterRule {
    fn name(&self) -> &str {
        "ImplFilter"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match &expr.op {
            Operator::Logical(LogicalOp::Filter { predicate }) => substitute(
                expr,
                PhysicalOp::Filter {
                    predicate: predicate.clone(),
                },
            ),
            _ => vec![],
        }
    }
}

pub struct ImplProjectRule;

impl Rule for ImplProjectRule {
    fn name(&self) -> &str {
        "ImplProject"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::project()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match &expr.op {
            Operator::Logical(LogicalOp::Project { exprs, aliases }) => substitute(
                expr,
                PhysicalOp::Project {
                    exprs: exprs.clone(),
                    aliases: aliases.clone(),
                },
            ),
            _ => vec![],
        }
    }
}

/// Implement ORDER BY as a global sort.
pub struct ImplSortRule;

impl Rule for ImplSortRule {
    fn name(&self) -> &str {
        "ImplSort"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::sort()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match &expr.op {
            Operator::Logical(LogicalOp::Sort { order }) => substitute(expr, PhysicalOp::Sort { order: order.clone() }),
            _ => vec![],
        }
    }
}

pub struct ImplLimitRule;

impl Rule for ImplLimitRule {
    fn name(&self) -> &str {
        "ImplLimit"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::limit()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        match &expr.op {
            Operator::Logical(LogicalOp::Limit { offset, count }) => substitute(
                expr,
                PhysicalOp::Limit {
                    offset: *offset,
                    count: *count,
                },
            ),
            _ => vec![],
        }
    }
}
