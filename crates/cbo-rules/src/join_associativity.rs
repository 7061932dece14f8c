//! # Join Associativity Rule
//!
//! `(A JOIN_1 B) JOIN_2 C = A JOIN_1 (B JOIN_2 C)` for inner joins.
//!
//! ## Why Associativity Matters
//!
//! Associativity changes the *shape* of the join tree (left-deep vs right-deep vs bushy).
//! Combined with commutativity, it enables exploring the full space of join orderings,
//! which decides how much data each exchange has to move.
//!
//! ## Implementation
//!
//! The rule uses [`RuleResult::NewChildren`] with [`RuleChild::NewExpr`] to create
//! the new intermediate group for `B ⋈ C`. The engine materializes it via
//! `memo.add_expr()`, which reuses an existing group if `B ⋈ C` is already known.
//!
//! ## Condition Handling
//!
//! The outer condition is split into:
//!
//! 1. **B-C predicates**: conjuncts whose columns all come from B and C. These move
//!    to the new inner join.
//! 2. **Remaining predicates**: conjuncts that reference A. These stay on the new
//!    outer join, together with the original inner condition.
//!
//! The transformation only fires if there is at least one B-C predicate, so it never
//! introduces a cross join.
//!
//! ## Both Orientations
//!
//! - `(A ⋈₁ B) ⋈₂ C → A ⋈ (B ⋈ C)` when `cond₂` connects B and C
//! - `(A ⋈₁ B) ⋈₂ C → B ⋈ (A ⋈ C)` when `cond₂` connects A and C
//!
//! Every inner join alternative of the left input is tried, so orderings found by
//! commutativity are reassociated as well.
//!
//! ## Applicability
//!
//! Only inner joins. Outer join associativity has ordering constraints
//! (`(A LEFT JOIN B) LEFT JOIN C ≠ A LEFT JOIN (B LEFT JOIN C)` in general).

use cbo_core::expr::*;
use cbo_core::memo::{GroupId, Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};
use std::collections::HashSet;

/// Join associativity: `(A ⋈₁ B) ⋈₂ C → A ⋈ (B ⋈ C)`.
pub struct JoinAssociativityRule;

impl Rule for JoinAssociativityRule {
    fn name(&self) -> &str {
        "JoinAssociativity"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join_join_left()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition: outer_cond,
        }) = &expr.op
        else {
            return vec![];
        };
        if expr.children.len() != 2 {
            return vec![];
        }

        let (inner_group, c_group) = (expr.children[0], expr.children[1]);
        let c_tables = collect_table_names(memo, c_group);

        let mut results = Vec::new();
        for &eid in &memo.group(inner_group).logical_exprs {
            let inner = memo.expr(eid);
            let Operator::Logical(LogicalOp::Join {
                join_type: JoinType::Inner,
                condition: inner_cond,
            }) = &inner.op
            else {
                continue;
            };
            if inner.children.len() != 2 {
                continue;
            }
            let (left, right) = (inner.children[0], inner.children[1]);
            let left_tables = collect_table_names(memo, left);
            let right_tables = collect_table_names(memo, right);

            // left ⋈ (right ⋈ C)
            results.extend(try_reassociate(
                outer_cond,
                inner_cond,
                left,
                right,
                c_group,
                &right_tables,
                &c_tables,
            ));
            // right ⋈ (left ⋈ C)
            results.extend(try_reassociate(
                outer_cond,
                inner_cond,
                right,
                left,
                c_group,
                &left_tables,
                &c_tables,
            ));
        }
        results
    }
}

/// `(stay ⋈_inner move) ⋈_outer c  →  stay ⋈ (move ⋈ c)`
///
/// Returns `None` when no outer conjunct connects `move` with `c`.
fn try_reassociate(
    outer_cond: &Expr,
    inner_cond: &Expr,
    stay_group: GroupId,
    move_group: GroupId,
    c_group: GroupId,
    move_tables: &HashSet<String>,
    c_tables: &HashSet<String>,
) -> Option<RuleResult> {
    let mut new_inner_preds = Vec::new();
    let mut remaining_outer_preds = Vec::new();

    for pred in outer_cond.conjuncts() {
        let tables = referenced_tables(pred);
        let all_in_move_or_c = tables
            .iter()
            .all(|t| move_tables.contains(t) || c_tables.contains(t));
        let has_move = tables.iter().any(|t| move_tables.contains(t));
        let has_c = tables.iter().any(|t| c_tables.contains(t));

        if all_in_move_or_c && has_move && has_c {
            new_inner_preds.push(pred.clone());
        } else {
            remaining_outer_preds.push(pred.clone());
        }
    }

    let new_inner_cond = Expr::conjunction(new_inner_preds)?;

    // The inner condition joined stay with move; move's columns are still available
    // at the outer join.
    let mut outer_parts: Vec<Expr> = inner_cond.conjuncts().into_iter().cloned().collect();
    outer_parts.extend(remaining_outer_preds);
    let new_outer_cond = Expr::conjunction(outer_parts).unwrap_or(Expr::Literal(ScalarValue::Bool(true)));

    Some(RuleResult::NewChildren(
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition: new_outer_cond,
        }),
        vec![
            RuleChild::Group(stay_group),
            RuleChild::NewExpr(
                Operator::Logical(LogicalOp::Join {
                    join_type: JoinType::Inner,
                    condition: new_inner_cond,
                }),
                vec![RuleChild::Group(move_group), RuleChild::Group(c_group)],
            ),
        ],
    ))
}

/// Table qualifiers of all columns in an expression.
fn referenced_tables(expr: &Expr) -> HashSet<String> {
    expr.columns()
        .into_iter()
        .filter_map(|c| c.table.clone())
        .collect()
}

/// All table names scanned below a memo group.
fn collect_table_names(memo: &Memo, group_id: GroupId) -> HashSet<String> {
    let mut tables = HashSet::new();
    collect_table_names_recursive(memo, group_id, &mut tables, &mut HashSet::new());
    tables
}

fn collect_table_names_recursive(
    memo: &Memo,
    group_id: GroupId,
    tables: &mut HashSet<String>,
    visited: &mut HashSet<GroupId>,
) {
    if !visited.insert(memo.find(group_id)) {
        return;
    }

    for &expr_id in &memo.group(group_id).logical_exprs {
        let expr = memo.expr(expr_id);
        match &expr.op {
            Operator::Logical(LogicalOp::Scan { table, .. }) => {
                tables.insert(table.name.clone());
            }
            _ => {
                for &child_gid in &expr.children {
                    collect_table_names_recursive(memo, child_gid, tables, visited);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbo_core::catalog::InMemoryCatalog;

    fn eq_cond(left_table: &str, left_col: &str, right_table: &str, right_col: &str) -> Expr {
        Expr::binary(
            BinaryOp::Eq,
            Expr::column(&ColumnRef::new(Some(left_table), left_col, 0, DataType::Int64)),
            Expr::column(&ColumnRef::new(Some(right_table), right_col, 0, DataType::Int64)),
        )
    }

    fn scan_op(name: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef::new("s", name),
            columns: vec![ColumnRef::new(Some(name), "x", 0, DataType::Int64)],
            predicate: None,
        })
    }

    fn inner(condition: Expr) -> Operator {
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition,
        })
    }

    fn tables(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_table_names() {
        let mut memo = Memo::new();
        let (g_a, _) = memo.add_expr(scan_op("A"), vec![]);
        let (g_b, _) = memo.add_expr(scan_op("B"), vec![]);
        let (g_ab, _) = memo.add_expr(inner(eq_cond("A", "x", "B", "y")), vec![g_a, g_b]);

        assert_eq!(collect_table_names(&memo, g_ab), tables(&["A", "B"]));
        assert_eq!(collect_table_names(&memo, g_a), tables(&["A"]));
    }

    #[test]
    fn test_try_reassociate_valid() {
        // (A ⋈_{A.x=B.y} B) ⋈_{B.z=C.w} C  →  A ⋈_{A.x=B.y} (B ⋈_{B.z=C.w} C)
        let inner_cond = eq_cond("A", "x", "B", "y");
        let outer_cond = eq_cond("B", "z", "C", "w");

        let result = try_reassociate(&outer_cond, &inner_cond, 0, 1, 2, &tables(&["B"]), &tables(&["C"]));
        match result {
            Some(RuleResult::NewChildren(Operator::Logical(LogicalOp::Join { condition, .. }), children)) => {
                assert_eq!(condition, inner_cond);
                assert!(matches!(&children[0], RuleChild::Group(0)));
                assert!(matches!(&children[1], RuleChild::NewExpr(..)));
            }
            other => panic!("Expected NewChildren join, got {other:?}"),
        }
    }

    #[test]
    fn test_no_cross_join_introduced() {
        // The outer condition connects A (stay) with C, not B (move) with C.
        let inner_cond = eq_cond("A", "x", "B", "y");
        let outer_cond = eq_cond("A", "z", "C", "w");
        assert!(try_reassociate(&outer_cond, &inner_cond, 0, 1, 2, &tables(&["B"]), &tables(&["C"])).is_none());
        // Flipped orientation: A moves next to C.
        assert!(try_reassociate(&outer_cond, &inner_cond, 1, 0, 2, &tables(&["A"]), &tables(&["C"])).is_some());
    }

    #[test]
    fn test_apply_on_memo() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan_op("A"), vec![]);
        let (b, _) = memo.add_expr(scan_op("B"), vec![]);
        let (c, _) = memo.add_expr(scan_op("C"), vec![]);
        let (ab, _) = memo.add_expr(inner(eq_cond("A", "x", "B", "x")), vec![a, b]);
        let (_, abc) = memo.add_expr(inner(eq_cond("B", "x", "C", "x")), vec![ab, c]);

        let catalog = InMemoryCatalog::new();
        let results = JoinAssociativityRule.apply(memo.expr(abc), &memo, &OptContext { catalog: &catalog });
        assert_eq!(results.len(), 1);
    }
}
