//! # Projection Pushdown Rule
//!
//! Column pruning: when a Project over a Scan only references some of the scanned
//! columns, the scan below the projection is replaced by one that reads only those.
//!
//! ## Why This Helps
//!
//! - **Reduces I/O**: columnar formats skip columns that are not read.
//! - **Reduces network transfer**: narrower rows make every exchange above the scan
//!   cheaper, since exchange cost is proportional to bytes moved.
//!
//! ## Current Scope
//!
//! Only the case of Project directly over Scan. The projection stays on top and
//! keeps its group; only its input changes.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleChild, RuleResult, RuleType};

/// Narrow the scan below a projection to the referenced columns.
pub struct ProjectionPushdownRule;

impl Rule for ProjectionPushdownRule {
    fn name(&self) -> &str {
        "ProjectionPushdown"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::project_scan()
    }

    fn apply(&self, expr: &MemoExpr, memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Project { exprs, .. }) = &expr.op else {
            return vec![];
        };
        let Some(&child) = expr.children.first() else {
            return vec![];
        };

        let needed: Vec<&ColumnRef> = exprs.iter().flat_map(|e| e.columns()).collect();
        if needed.is_empty() {
            return vec![];
        }

        for &child_eid in &memo.group(child).logical_exprs {
            let Operator::Logical(LogicalOp::Scan {
                table,
                columns,
                predicate,
            }) = &memo.expr(child_eid).op
            else {
                continue;
            };

            // Keep the scan's column order, and every column its own predicate reads.
            let pred_cols: Vec<&ColumnRef> = predicate.iter().flat_map(|p| p.columns()).collect();
            let narrowed: Vec<ColumnRef> = columns
                .iter()
                .filter(|c| needed.iter().chain(&pred_cols).any(|n| n.same_column(c)))
                .cloned()
                .collect();
            if narrowed.is_empty() || narrowed.len() == columns.len() {
                continue;
            }

            let narrow_scan = Operator::Logical(LogicalOp::Scan {
                table: table.clone(),
                columns: narrowed,
                predicate: predicate.clone(),
            });
            return vec![RuleResult::NewChildren(
                expr.op.clone(),
                vec![RuleChild::NewExpr(narrow_scan, vec![])],
            )];
        }

        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbo_core::catalog::InMemoryCatalog;

    fn col(name: &str, index: u32) -> ColumnRef {
        ColumnRef::new(Some("t"), name, index, DataType::Int64)
    }

    fn apply(project_cols: &[ColumnRef]) -> Vec<RuleResult> {
        let mut memo = Memo::new();
        let (scan, _) = memo.add_expr(
            Operator::Logical(LogicalOp::Scan {
                table: TableRef::new("s", "t"),
                columns: vec![col("a", 0), col("b", 1), col("c", 2)],
                predicate: None,
            }),
            vec![],
        );
        let (_, project) = memo.add_expr(
            Operator::Logical(LogicalOp::Project {
                exprs: project_cols.iter().map(Expr::column).collect(),
                aliases: project_cols.iter().map(|c| c.name.clone()).collect(),
            }),
            vec![scan],
        );
        let catalog = InMemoryCatalog::new();
        ProjectionPushdownRule.apply(memo.expr(project), &memo, &OptContext { catalog: &catalog })
    }

    #[test]
    fn test_scan_is_narrowed_under_project() {
        let results = apply(&[col("c", 2), col("a", 0)]);
        assert_eq!(results.len(), 1);
        let RuleResult::NewChildren(Operator::Logical(LogicalOp::Project { .. }), children) = &results[0] else {
            panic!("expected a project over a new scan");
        };
        let RuleChild::NewExpr(Operator::Logical(LogicalOp::Scan { columns, .. }), _) = &children[0] else {
            panic!("expected a new scan");
        };
        assert_eq!(columns, &vec![col("a", 0), col("c", 2)]);
    }

    #[test]
    fn test_no_rewrite_when_all_columns_used() {
        assert!(apply(&[col("a", 0), col("b", 1), col("c", 2)]).is_empty());
    }
}
