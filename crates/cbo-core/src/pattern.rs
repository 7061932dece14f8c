//! # Declarative Pattern Matching for Optimization Rules
//!
//! Each optimization rule declares a `Pattern` that describes the shape of expressions
//! it can transform. Before applying a rule, the engine checks the pattern to avoid
//! calling `apply()` on non-matching expressions.
//!
//! ## Pattern Language
//!
//! - `Pattern::Operator(matcher, children)`: matches an expression whose operator
//!   satisfies `matcher` and whose children match the given child patterns one by
//!   one (so the child count must be equal).
//!
//! - `Pattern::Variadic(matcher)`: matches an expression whose operator satisfies
//!   `matcher`, with any number of children. Set operations take two or more
//!   inputs, so their patterns are variadic.
//!
//! - `Pattern::Any`: matches any expression or group. Used as a wildcard for children
//!   that the rule doesn't inspect.
//!
//! - `Pattern::Leaf`: matches only leaf expressions (those with no children, like Scan).
//!
//! ## Group-Level Matching
//!
//! When a child pattern is not `Any`, the matcher checks all expressions in the child
//! group. A child pattern matches if *any* expression in the child group satisfies
//! it, since all expressions in a group are logically equivalent.

use crate::expr::{LogicalOpKind, Operator, PhysicalOpKind};
use crate::memo::{ExprId, Memo};

/// Pattern for matching expressions in the memo.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Match an operator with child patterns.
    Operator(OpMatcher, Vec<Pattern>),
    /// Match an operator with any number of children.
    Variadic(OpMatcher),
    /// Match any subtree (group).
    Any,
    /// Match a leaf node (no children).
    Leaf,
}

/// Matcher for operator types (without data).
#[derive(Debug, Clone)]
pub enum OpMatcher {
    LogicalOp(LogicalOpKind),
    PhysicalOp(PhysicalOpKind),
    AnyLogical,
    AnyPhysical,
}

impl OpMatcher {
    fn matches(&self, op: &Operator) -> bool {
        match (op, self) {
            (Operator::Logical(l), OpMatcher::LogicalOp(kind)) => l.kind() == *kind,
            (Operator::Physical(p), OpMatcher::PhysicalOp(kind)) => p.kind() == *kind,
            (Operator::Logical(_), OpMatcher::AnyLogical) => true,
            (Operator::Physical(_), OpMatcher::AnyPhysical) => true,
            _ => false,
        }
    }
}

impl Pattern {
    fn logical(kind: LogicalOpKind, children: Vec<Pattern>) -> Self {
        Pattern::Operator(OpMatcher::LogicalOp(kind), children)
    }

    /// Match a logical join with two any-children.
    pub fn join() -> Self {
        Self::logical(LogicalOpKind::Join, vec![Pattern::Any, Pattern::Any])
    }

    /// Match a logical join whose left child is also a join.
    pub fn join_join_left() -> Self {
        Self::logical(LogicalOpKind::Join, vec![Self::join(), Pattern::Any])
    }

    pub fn scan() -> Self {
        Self::logical(LogicalOpKind::Scan, vec![])
    }

    pub fn filter() -> Self {
        Self::logical(LogicalOpKind::Filter, vec![Pattern::Any])
    }

    pub fn project() -> Self {
        Self::logical(LogicalOpKind::Project, vec![Pattern::Any])
    }

    pub fn aggregate() -> Self {
        Self::logical(LogicalOpKind::Aggregate, vec![Pattern::Any])
    }

    pub fn sort() -> Self {
        Self::logical(LogicalOpKind::Sort, vec![Pattern::Any])
    }

    pub fn limit() -> Self {
        Self::logical(LogicalOpKind::Limit, vec![Pattern::Any])
    }

    /// Match a logical set operation with any number of inputs.
    pub fn set_operation() -> Self {
        Pattern::Variadic(OpMatcher::LogicalOp(LogicalOpKind::SetOperation))
    }

    /// Match a filter on top of a join.
    pub fn filter_join() -> Self {
        Self::logical(LogicalOpKind::Filter, vec![Self::join()])
    }

    /// Match a filter on top of a set operation.
    pub fn filter_set_operation() -> Self {
        Self::logical(LogicalOpKind::Filter, vec![Self::set_operation()])
    }

    /// Match a project on top of a scan.
    pub fn project_scan() -> Self {
        Self::logical(LogicalOpKind::Project, vec![Self::scan()])
    }
}

/// Check if a memo expression matches a pattern.
pub fn matches(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> bool {
    let expr = memo.expr(expr_id);
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf => expr.children.is_empty(),
        Pattern::Variadic(matcher) => matcher.matches(&expr.op),
        Pattern::Operator(matcher, child_patterns) => {
            if !matcher.matches(&expr.op) {
                return false;
            }
            if expr.children.len() != child_patterns.len() {
                return false;
            }

            // For each child group, at least one expression in the group must match.
            expr.children
                .iter()
                .zip(child_patterns.iter())
                .all(|(child_gid, child_pattern)| match child_pattern {
                    Pattern::Any => true,
                    _ => {
                        let group = memo.group(*child_gid);
                        group
                            .logical_exprs
                            .iter()
                            .chain(group.physical_exprs.iter())
                            .any(|&eid| matches(memo, eid, child_pattern))
                    }
                })
        }
    }
}
