//! # Exploration Engine
//!
//! Applies transformation rules to the memo until no rule produces anything new
//! or the session budget runs out.
//!
//! ## Worklist
//!
//! Every logical expression starts on the worklist. The worklist is processed in
//! batches: all (expression, rule) pairs of a batch whose pattern matches and whose
//! rule bit is unset are applied against the same immutable memo, then the results
//! are inserted serially in batch order. New logical expressions are queued for the
//! next batch. When a group gains an alternative, logical expressions that read the
//! group are queued again with the bits of their multi-level rules cleared, since a
//! pattern that failed before may match the new input.
//!
//! ## Parallelism
//!
//! With more than one worker, the applications of a batch are split across scoped
//! threads. Rules only read the memo, and insertion order does not depend on the
//! worker count, so the resulting memo is identical to a single-threaded run.
//!
//! ## Budget
//!
//! Exploration stops early when the number of rule applications, the number of
//! memo groups or the wall clock exceeds the configured limit. The memo stays
//! consistent and the stop is recorded as a warning.

use crate::catalog::Catalog;
use crate::config::SearchConfig;
use crate::error::{BudgetLimit, Diagnostics, OptimizerWarning, Result};
use crate::memo::{ExprId, GroupId, Memo};
use crate::pattern::{matches, Pattern};
use crate::rule::{OptContext, Rule, RuleChild, RuleRegistry, RuleResult};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Insert a rule result as an alternative of `group`.
pub fn insert_rule_result(memo: &mut Memo, group: GroupId, result: RuleResult) -> Result<()> {
    match result {
        RuleResult::Substitution(op, children) => {
            memo.add_expr_to_group(group, op, children)?;
        }
        RuleResult::NewChildren(op, children) => {
            let children = children
                .into_iter()
                .map(|child| insert_child(memo, child))
                .collect::<Result<Vec<_>>>()?;
            memo.add_expr_to_group(group, op, children)?;
        }
    }
    Ok(())
}

fn insert_child(memo: &mut Memo, child: RuleChild) -> Result<GroupId> {
    match child {
        RuleChild::Group(g) => Ok(memo.find(g)),
        RuleChild::NewExpr(op, children) => {
            let children = children
                .into_iter()
                .map(|c| insert_child(memo, c))
                .collect::<Result<Vec<_>>>()?;
            Ok(memo.add_expr(op, children).0)
        }
    }
}

struct ActiveRule<'a> {
    id: usize,
    rule: &'a dyn Rule,
    pattern: Pattern,
    /// The pattern looks into child groups.
    deep: bool,
}

#[derive(Debug, Clone, Copy)]
struct Task {
    expr: ExprId,
    rule: usize,
}

/// Drives transformation rules over a memo.
pub struct ExplorationEngine<'a> {
    rules: Vec<ActiveRule<'a>>,
    catalog: &'a dyn Catalog,
    config: &'a SearchConfig,
}

impl<'a> ExplorationEngine<'a> {
    pub fn new(registry: &'a RuleRegistry, catalog: &'a dyn Catalog, config: &'a SearchConfig) -> Self {
        let rules = registry
            .transformation_rules(config.source_type.as_deref())
            .into_iter()
            .map(|(id, rule)| {
                let pattern = rule.pattern();
                let deep = matches!(&pattern, Pattern::Operator(_, children)
                    if children.iter().any(|c| !matches!(c, Pattern::Any)));
                ActiveRule {
                    id,
                    rule,
                    pattern,
                    deep,
                }
            })
            .collect();
        Self {
            rules,
            catalog,
            config,
        }
    }

    /// Explore the memo to a fixed point or until the budget is exhausted.
    pub fn explore(&self, memo: &mut Memo, diagnostics: &mut Diagnostics) -> Result<()> {
        let start = Instant::now();
        let mut queue: VecDeque<ExprId> = VecDeque::new();
        let mut queued: HashSet<ExprId> = HashSet::new();
        for g in memo.group_ids() {
            for &e in &memo.group(g).logical_exprs {
                if queued.insert(e) {
                    queue.push_back(e);
                }
            }
        }

        while !queue.is_empty() {
            if let Some(limit) = self.exceeded(memo, diagnostics, start) {
                self.stop(limit, diagnostics);
                return Ok(());
            }

            let batch: Vec<ExprId> = queue.drain(..).collect();
            queued.clear();
            let mut tasks = self.collect_tasks(memo, &batch);

            let remaining = self.config.max_iterations.saturating_sub(diagnostics.rule_applications);
            let truncated = tasks.len() > remaining;
            tasks.truncate(remaining);

            let results = self.apply_batch(memo, &tasks);
            diagnostics.rule_applications += tasks.len();

            let first_new = memo.num_exprs() as ExprId;
            let mut grown: BTreeSet<GroupId> = BTreeSet::new();
            for (task, task_results) in tasks.iter().zip(results) {
                memo.mark_rule_applied(task.expr, task.rule);
                let group = memo.find(memo.expr(task.expr).group);
                let before = memo.num_exprs();
                for result in task_results {
                    insert_rule_result(memo, group, result)?;
                }
                if memo.num_exprs() > before {
                    grown.insert(memo.find(group));
                }
                if memo.num_groups() >= self.config.max_memo_groups {
                    break;
                }
            }

            for e in first_new..memo.num_exprs() as ExprId {
                if memo.expr(e).op.is_logical() && memo.is_live(e) && queued.insert(e) {
                    grown.insert(memo.find(memo.expr(e).group));
                    queue.push_back(e);
                }
            }
            for g in grown {
                for parent in memo.parent_exprs(g) {
                    for rule in self.rules.iter().filter(|r| r.deep) {
                        memo.clear_rule_applied(parent, rule.id);
                    }
                    if queued.insert(parent) {
                        queue.push_back(parent);
                    }
                }
            }

            if truncated {
                self.stop(BudgetLimit::RuleApplications, diagnostics);
                return Ok(());
            }
        }

        debug!(
            "exploration reached a fixed point after {} rule applications: groups={}, exprs={}",
            diagnostics.rule_applications,
            memo.num_groups(),
            memo.num_exprs()
        );
        Ok(())
    }

    fn exceeded(&self, memo: &Memo, diagnostics: &Diagnostics, start: Instant) -> Option<BudgetLimit> {
        if diagnostics.rule_applications >= self.config.max_iterations {
            return Some(BudgetLimit::RuleApplications);
        }
        if memo.num_groups() >= self.config.max_memo_groups {
            return Some(BudgetLimit::MemoGroups);
        }
        match self.config.time_limit {
            Some(limit) if start.elapsed() >= limit => Some(BudgetLimit::Deadline),
            _ => None,
        }
    }

    fn stop(&self, limit: BudgetLimit, diagnostics: &mut Diagnostics) {
        warn!(
            "exploration stopped at {} after {} rule applications",
            limit, diagnostics.rule_applications
        );
        diagnostics.warn(OptimizerWarning::ExplorationBudgetExhausted {
            limit,
            rule_applications: diagnostics.rule_applications,
        });
    }

    fn collect_tasks(&self, memo: &Memo, batch: &[ExprId]) -> Vec<Task> {
        let mut tasks = Vec::new();
        for &expr in batch {
            if !memo.is_live(expr) {
                continue;
            }
            for (i, rule) in self.rules.iter().enumerate() {
                if !memo.rule_applied(expr, rule.id) && matches(memo, expr, &rule.pattern) {
                    tasks.push(Task { expr, rule: i });
                }
            }
        }
        tasks
    }

    fn apply_batch(&self, memo: &Memo, tasks: &[Task]) -> Vec<Vec<RuleResult>> {
        let ctx = OptContext {
            catalog: self.catalog,
        };
        let run = |task: &Task| -> Vec<RuleResult> {
            let rule = &self.rules[task.rule];
            trace!("applying rule '{}' to expr {}", rule.rule.name(), task.expr);
            rule.rule.apply(memo.expr(task.expr), memo, &ctx)
        };

        let workers = self.config.parallel_workers;
        if workers <= 1 || tasks.len() < 2 {
            return tasks.iter().map(run).collect();
        }

        let run = &run;
        let chunk = tasks.len().div_ceil(workers);
        let scoped = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = tasks
                .chunks(chunk)
                .map(|part| s.spawn(move |_| part.iter().map(run).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(results) => results,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        });
        match scoped {
            Ok(results) => results,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::expr::*;
    use crate::rule::RuleType;

    /// Swaps the inputs of an inner join.
    struct Swap;

    impl Rule for Swap {
        fn name(&self) -> &str {
            "swap"
        }
        fn rule_type(&self) -> RuleType {
            RuleType::Transformation
        }
        fn pattern(&self) -> Pattern {
            Pattern::join()
        }
        fn apply(&self, expr: &crate::memo::MemoExpr, _memo: &Memo, _ctx: &OptContext) -> Vec<RuleResult> {
            vec![RuleResult::Substitution(
                expr.op.clone(),
                vec![expr.children[1], expr.children[0]],
            )]
        }
    }

    fn scan(name: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef::new("s", name),
            columns: vec![ColumnRef::new(Some(name), "x", 0, DataType::Int64)],
            predicate: None,
        })
    }

    fn join() -> Operator {
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition: Expr::Literal(ScalarValue::Bool(true)),
        })
    }

    fn setup() -> (Memo, GroupId) {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let (b, _) = memo.add_expr(scan("b"), vec![]);
        let (j, _) = memo.add_expr(join(), vec![a, b]);
        (memo, j)
    }

    fn registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(Swap));
        registry
    }

    #[test]
    fn test_fixed_point() {
        let (mut memo, j) = setup();
        let registry = registry();
        let catalog = InMemoryCatalog::new();
        let config = SearchConfig::default();
        let mut diagnostics = Diagnostics::default();
        ExplorationEngine::new(&registry, &catalog, &config)
            .explore(&mut memo, &mut diagnostics)
            .unwrap();

        // The swapped join swaps back to the original, which deduplicates.
        assert_eq!(memo.group(j).logical_exprs.len(), 2);
        assert_eq!(diagnostics.rule_applications, 2);
        assert!(!diagnostics.budget_exhausted());
    }

    #[test]
    fn test_rule_budget() {
        let (mut memo, j) = setup();
        let registry = registry();
        let catalog = InMemoryCatalog::new();
        let config = SearchConfig {
            max_iterations: 0,
            ..SearchConfig::default()
        };
        let mut diagnostics = Diagnostics::default();
        ExplorationEngine::new(&registry, &catalog, &config)
            .explore(&mut memo, &mut diagnostics)
            .unwrap();

        assert_eq!(memo.group(j).logical_exprs.len(), 1);
        assert!(diagnostics.budget_exhausted());
    }

    #[test]
    fn test_parallel_matches_serial() {
        let registry = registry();
        let catalog = InMemoryCatalog::new();
        let explore = |workers: usize| {
            let (mut memo, j) = setup();
            let config = SearchConfig {
                parallel_workers: workers,
                ..SearchConfig::default()
            };
            let mut diagnostics = Diagnostics::default();
            ExplorationEngine::new(&registry, &catalog, &config)
                .explore(&mut memo, &mut diagnostics)
                .unwrap();
            let exprs: Vec<(Operator, Vec<GroupId>)> = memo
                .group(j)
                .logical_exprs
                .iter()
                .map(|e| (memo.expr(*e).op.clone(), memo.expr(*e).children.clone()))
                .collect();
            (exprs, diagnostics.rule_applications)
        };
        assert_eq!(explore(1), explore(4));
    }
}
