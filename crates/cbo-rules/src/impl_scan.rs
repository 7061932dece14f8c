//! # Scan Implementation Rule
//!
//! Maps a logical Scan to a physical SeqScan (sequential/full table scan).
//!
//! A sequential scan reads every row of the table on the nodes that hold it and
//! evaluates any pushed-down predicate. The output keeps the table's storage
//! distribution, which the catalog reports; a table stored hash-partitioned on a
//! join key can feed a shuffle join without an exchange.

use cbo_core::expr::*;
use cbo_core::memo::{Memo, MemoExpr};
use cbo_core::pattern::Pattern;
use cbo_core::rule::{OptContext, Rule, RuleResult, RuleType};

/// Implement logical scan as a sequential (full) table scan.
pub struct ImplSeqScanRule;

impl Rule for ImplSeqScanRule {
    fn name(&self) -> &str {
        "ImplSeqScan"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::scan()
    }

    fn apply(&self, expr: &MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Scan {
            table,
            columns,
            predicate,
        }) = &expr.op
        else {
            return vec![];
        };

        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SeqScan {
                table: table.clone(),
                columns: columns.clone(),
                predicate: predicate.clone(),
            }),
            vec![],
        )]
    }
}
