//! Error and warning types of an optimization session.
//!
//! Only [`OptimizerError`] rejects a query. Conditions the optimizer can work around
//! are reported as [`OptimizerWarning`]s in the session [`Diagnostics`] and the
//! search continues with a possibly suboptimal plan.

use crate::expr::TableRef;
use crate::memo::GroupId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Fatal optimizer errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// The logical tree violates a structural invariant (e.g. a set operation whose
    /// inputs have different arity). Raised at construction time.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// No physical alternative satisfies the required properties of a group. With
    /// universal enforcers this indicates a missing implementation rule.
    #[error("no physical plan found for group {group} with required properties {required}")]
    NoPlanFound { group: GroupId, required: String },

    /// Merging two groups would make a group (transitively) its own input.
    #[error("merging group {from} into group {into} would create a cycle in the memo")]
    MemoCycle { from: GroupId, into: GroupId },
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Why exploration stopped before reaching a fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BudgetLimit {
    RuleApplications,
    MemoGroups,
    Deadline,
}

impl fmt::Display for BudgetLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetLimit::RuleApplications => f.write_str("rule application limit"),
            BudgetLimit::MemoGroups => f.write_str("memo group limit"),
            BudgetLimit::Deadline => f.write_str("search deadline"),
        }
    }
}

/// Non-fatal conditions recorded during a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OptimizerWarning {
    /// The catalog had no statistics for a table; default estimates were used.
    StatisticsUnavailable { table: TableRef },
    /// Exploration stopped early; the plan is the best found so far.
    ExplorationBudgetExhausted {
        limit: BudgetLimit,
        rule_applications: usize,
    },
}

impl fmt::Display for OptimizerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerWarning::StatisticsUnavailable { table } => {
                write!(f, "statistics unavailable for {table}, using defaults")
            }
            OptimizerWarning::ExplorationBudgetExhausted {
                limit,
                rule_applications,
            } => write!(
                f,
                "exploration stopped at {limit} after {rule_applications} rule applications"
            ),
        }
    }
}

/// Observability data returned with an optimized plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub warnings: Vec<OptimizerWarning>,
    pub rule_applications: usize,
    pub memo_groups: usize,
    pub memo_exprs: usize,
}

impl Diagnostics {
    /// Record a warning once.
    pub fn warn(&mut self, warning: OptimizerWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, OptimizerWarning::ExplorationBudgetExhausted { .. }))
    }
}
