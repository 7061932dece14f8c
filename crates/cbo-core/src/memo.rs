//! # The Memo
//!
//! The memo compactly represents the search space: a set of **groups**, each holding
//! logically equivalent **expressions** whose inputs are other groups rather than
//! concrete subtrees. One group stands for every plan that produces the same result,
//! so a rewrite of a subtree is shared by every parent that references it.
//!
//! ## Arena Layout
//!
//! Groups and expressions live in two vectors and are addressed by integer ids
//! (`GroupId`, `ExprId`). Children are stored as group ids, never as pointers, so
//! the memo graph has no ownership cycles and an immutable borrow of the memo can
//! be shared across rule-application threads.
//!
//! ## Deduplication
//!
//! An expression is keyed by its operator (including all parameters) and its
//! canonical child group ids. Inserting an expression that already exists returns the
//! existing one; if a rule derives in group `g` an expression that already lives in
//! group `h`, the two groups are equivalent and are merged.
//!
//! ## Merging
//!
//! The lower id survives. The other id is forwarded to it (all lookups resolve
//! through the forward table), its expressions move over, and every child reference
//! is rewritten. Rewriting can make two expressions identical, which merges further
//! groups. Merging a group with one of its own descendants would make the group its
//! own input and is rejected with [`OptimizerError::MemoCycle`], leaving the memo
//! as it was before the merge.
//!
//! ## Winners
//!
//! For every physical property set a group has been optimized for, the group keeps
//! the cheapest physical expression found (a [`Winner`]), together with the
//! properties it asked of its children. [`Memo::extract_best_plan`] follows winners
//! top-down to build the final [`PlanNode`] tree.
//!
//! A group's column order is fixed when the group is created. An alternative such
//! as a commuted join produces the same columns in another order, so extraction
//! puts a column-reordering `Project` above it.

use crate::cost::Cost;
use crate::error::{OptimizerError, Result};
use crate::expr::*;
use crate::logical::{aggregate_schema, project_schema, LogicalPlan, LogicalPlanVisitor};
use crate::properties::{LogicalProperties, PhysicalPropertySet};
use crate::stats::Statistics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub type GroupId = u32;
pub type ExprId = u32;

/// Which rules have been applied to an expression, indexed by the rule's position
/// in the [`crate::rule::RuleRegistry`].
#[derive(Debug, Clone, Default)]
pub struct RuleBitmap {
    words: Vec<u64>,
}

impl RuleBitmap {
    pub fn is_set(&self, rule_id: usize) -> bool {
        self.words
            .get(rule_id / 64)
            .is_some_and(|w| w & (1u64 << (rule_id % 64)) != 0)
    }

    pub fn set(&mut self, rule_id: usize) {
        let word = rule_id / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (rule_id % 64);
    }

    pub fn clear(&mut self, rule_id: usize) {
        if let Some(w) = self.words.get_mut(rule_id / 64) {
            *w &= !(1u64 << (rule_id % 64));
        }
    }
}

/// An expression in the memo: an operator whose inputs are groups.
#[derive(Debug, Clone)]
pub struct MemoExpr {
    pub id: ExprId,
    pub op: Operator,
    pub children: Vec<GroupId>,
    pub group: GroupId,
    pub applied_rules: RuleBitmap,
}

/// Best physical expression of a group for one required property set.
#[derive(Debug, Clone)]
pub struct Winner {
    pub expr_id: ExprId,
    /// Total cost of the subtree rooted at this expression.
    pub cost: Cost,
    /// Properties required from each child when this winner was costed.
    pub child_props: Vec<PhysicalPropertySet>,
    /// Properties the subtree actually delivers.
    pub delivered: PhysicalPropertySet,
    /// Number of exchange operators in the subtree.
    pub exchanges: usize,
    /// Discovery order of the candidate, for stable tie-breaking.
    pub seq: u64,
}

impl Winner {
    /// Ordering used to pick between candidates: lower total cost, then fewer
    /// exchanges, then earlier discovery.
    pub fn beats(&self, other: &Winner) -> bool {
        if self.cost != other.cost {
            return self.cost < other.cost;
        }
        if self.exchanges != other.exchanges {
            return self.exchanges < other.exchanges;
        }
        self.seq < other.seq
    }
}

/// A group of logically equivalent expressions.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub id: GroupId,
    pub logical_exprs: Vec<ExprId>,
    pub physical_exprs: Vec<ExprId>,
    pub logical_props: LogicalProperties,
    /// Derived once and immutable afterwards.
    pub stats: Option<Arc<Statistics>>,
    pub winners: HashMap<PhysicalPropertySet, Winner>,
}

/// Runtime filter attached to a hash join in the final plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuntimeFilter {
    /// Built and applied on each node.
    Local,
    /// Merged across nodes before being pushed to the probe-side scans.
    Global,
}

/// A node of an extracted physical plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanNode {
    pub op: PhysicalOp,
    pub children: Vec<PlanNode>,
    /// Cumulative cost of this subtree.
    pub cost: Cost,
    pub delivered: PhysicalPropertySet,
    pub row_count: f64,
    pub group: GroupId,
    pub runtime_filter: Option<RuntimeFilter>,
}

impl PlanNode {
    /// Render the plan as an indented tree.
    pub fn display(&self, indent: usize) -> String {
        let mut out = format!(
            "{}{} (rows={:.0}, cost={:.1}, dist={})",
            "  ".repeat(indent),
            self.op,
            self.row_count,
            self.cost.total,
            self.delivered
        );
        if let Some(rf) = self.runtime_filter {
            out.push_str(&format!(" runtime_filter={rf:?}"));
        }
        out.push('\n');
        for child in &self.children {
            out.push_str(&child.display(indent + 1));
        }
        out
    }

    /// All nodes of the subtree in pre-order.
    pub fn nodes(&self) -> Vec<&PlanNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.nodes());
        }
        out
    }

    pub fn count(&self, pred: impl Fn(&PhysicalOp) -> bool) -> usize {
        self.nodes().into_iter().filter(|n| pred(&n.op)).count()
    }
}

/// Outcome of asking for the best plan of a group.
#[derive(Debug, Clone)]
pub enum BestPlan {
    Found(PlanNode, Cost),
    /// The group has not been optimized for these properties, or no plan exists.
    NotDerived,
}

/// The memo table.
#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
    exprs: Vec<MemoExpr>,
    dedup: HashMap<(Operator, Vec<GroupId>), ExprId>,
    /// `forward[g] == g` for live groups; merged groups point at their survivor.
    forward: Vec<GroupId>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a possibly merged group id to its live group.
    pub fn find(&self, mut group: GroupId) -> GroupId {
        while let Some(&next) = self.forward.get(group as usize) {
            if next == group {
                break;
            }
            group = next;
        }
        group
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[self.find(id) as usize]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        let id = self.find(id);
        &mut self.groups[id as usize]
    }

    pub fn expr(&self, id: ExprId) -> &MemoExpr {
        &self.exprs[id as usize]
    }

    /// Number of live (unmerged) groups.
    pub fn num_groups(&self) -> usize {
        self.forward
            .iter()
            .enumerate()
            .filter(|(i, f)| *i as GroupId == **f)
            .count()
    }

    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }

    /// Ids of live groups in creation order.
    pub fn group_ids(&self) -> Vec<GroupId> {
        (0..self.groups.len() as GroupId)
            .filter(|g| self.find(*g) == *g)
            .collect()
    }

    pub fn rule_applied(&self, expr_id: ExprId, rule_id: usize) -> bool {
        self.exprs[expr_id as usize].applied_rules.is_set(rule_id)
    }

    pub fn mark_rule_applied(&mut self, expr_id: ExprId, rule_id: usize) {
        self.exprs[expr_id as usize].applied_rules.set(rule_id);
    }

    /// Allow a rule to fire again on an expression whose inputs gained alternatives.
    pub fn clear_rule_applied(&mut self, expr_id: ExprId, rule_id: usize) {
        self.exprs[expr_id as usize].applied_rules.clear(rule_id);
    }

    /// Whether an expression is still a member of its group. Expressions that
    /// became duplicates through a merge are dropped from their group.
    pub fn is_live(&self, expr_id: ExprId) -> bool {
        let expr = self.expr(expr_id);
        let group = self.group(expr.group);
        group.logical_exprs.contains(&expr_id) || group.physical_exprs.contains(&expr_id)
    }

    pub fn stats(&self, group: GroupId) -> Option<Arc<Statistics>> {
        self.group(group).stats.clone()
    }

    /// Set group statistics. A group that already has statistics keeps them.
    pub fn set_stats(&mut self, group: GroupId, stats: Statistics) -> Arc<Statistics> {
        let g = self.group_mut(group);
        g.stats.get_or_insert_with(|| Arc::new(stats)).clone()
    }

    /// Insert a logical plan tree bottom-up and return its root group. Subtrees
    /// already present in the memo are reused.
    pub fn insert_plan(&mut self, plan: &LogicalPlan) -> Result<GroupId> {
        let mut inserter = PlanInserter {
            memo: self,
            stack: Vec::new(),
        };
        plan.accept(&mut inserter)?;
        inserter
            .stack
            .pop()
            .ok_or_else(|| OptimizerError::MalformedPlan("empty plan".into()))
    }

    fn canonical(&self, children: Vec<GroupId>) -> Vec<GroupId> {
        children.into_iter().map(|c| self.find(c)).collect()
    }

    /// Add an expression, creating a new group for it unless an identical expression
    /// already exists.
    pub fn add_expr(&mut self, op: Operator, children: Vec<GroupId>) -> (GroupId, ExprId) {
        let children = self.canonical(children);
        if let Some(&existing) = self.dedup.get(&(op.clone(), children.clone())) {
            return (self.find(self.exprs[existing as usize].group), existing);
        }

        let group_id = self.groups.len() as GroupId;
        let output_columns = self.derive_output_columns(&op, &children);
        self.groups.push(Group {
            id: group_id,
            logical_props: LogicalProperties { output_columns },
            ..Group::default()
        });
        self.forward.push(group_id);
        let expr_id = self.push_expr(group_id, op, children);
        (group_id, expr_id)
    }

    /// Add an equivalent expression to an existing group.
    ///
    /// If the expression already lives in another group, that group is equivalent
    /// to `group` and the two are merged.
    pub fn add_expr_to_group(&mut self, group: GroupId, op: Operator, children: Vec<GroupId>) -> Result<ExprId> {
        let group = self.find(group);
        let children = self.canonical(children);

        let is_enforcer = matches!(&op, Operator::Physical(p) if p.is_enforcer());
        if !is_enforcer && children.contains(&group) {
            return Err(OptimizerError::MemoCycle { from: group, into: group });
        }

        if let Some(&existing) = self.dedup.get(&(op.clone(), children.clone())) {
            let other = self.find(self.exprs[existing as usize].group);
            if other != group {
                self.merge_groups(group, other)?;
            }
            return Ok(existing);
        }
        Ok(self.push_expr(group, op, children))
    }

    fn push_expr(&mut self, group: GroupId, op: Operator, children: Vec<GroupId>) -> ExprId {
        let expr_id = self.exprs.len() as ExprId;
        let is_logical = op.is_logical();
        self.dedup.insert((op.clone(), children.clone()), expr_id);
        self.exprs.push(MemoExpr {
            id: expr_id,
            op,
            children,
            group,
            applied_rules: RuleBitmap::default(),
        });
        let g = &mut self.groups[group as usize];
        if is_logical {
            g.logical_exprs.push(expr_id);
        } else {
            g.physical_exprs.push(expr_id);
        }
        expr_id
    }

    /// Whether `target` is reachable from `from` through one or more child edges.
    /// Enforcer self-references are ignored.
    fn reaches(&self, from: GroupId, target: GroupId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.groups.len()];
        while let Some(g) = stack.pop() {
            let group = &self.groups[g as usize];
            for &e in group.logical_exprs.iter().chain(&group.physical_exprs) {
                for &c in &self.exprs[e as usize].children {
                    let c = self.find(c);
                    if c == g {
                        continue;
                    }
                    if c == target {
                        return true;
                    }
                    if !seen[c as usize] {
                        seen[c as usize] = true;
                        stack.push(c);
                    }
                }
            }
        }
        false
    }

    /// Merge two equivalent groups and return the surviving id.
    ///
    /// Merging can cascade into further merges. If any step would create a cycle
    /// the memo is restored to its state before the call.
    pub fn merge_groups(&mut self, a: GroupId, b: GroupId) -> Result<GroupId> {
        if self.find(a) == self.find(b) {
            return Ok(self.find(a));
        }
        let snapshot = (
            self.groups.clone(),
            self.exprs.clone(),
            self.dedup.clone(),
            self.forward.clone(),
        );
        let merged = self.merge_cascade(a, b);
        if merged.is_err() {
            (self.groups, self.exprs, self.dedup, self.forward) = snapshot;
        }
        merged
    }

    fn merge_cascade(&mut self, a: GroupId, b: GroupId) -> Result<GroupId> {
        let mut pending = vec![(a, b)];
        while let Some((x, y)) = pending.pop() {
            let (x, y) = (self.find(x), self.find(y));
            if x == y {
                continue;
            }
            let (keep, gone) = (x.min(y), x.max(y));
            if self.reaches(keep, gone) || self.reaches(gone, keep) {
                return Err(OptimizerError::MemoCycle { from: gone, into: keep });
            }
            tracing::trace!("merging group {} into group {}", gone, keep);
            self.absorb(keep, gone, &mut pending);
        }
        Ok(self.find(a))
    }

    fn absorb(&mut self, keep: GroupId, gone: GroupId, pending: &mut Vec<(GroupId, GroupId)>) {
        self.forward[gone as usize] = keep;

        let moved = std::mem::take(&mut self.groups[gone as usize]);
        for &e in moved.logical_exprs.iter().chain(&moved.physical_exprs) {
            self.exprs[e as usize].group = keep;
        }
        let survivor = &mut self.groups[keep as usize];
        survivor.logical_exprs.extend(moved.logical_exprs);
        survivor.physical_exprs.extend(moved.physical_exprs);
        if survivor.stats.is_none() {
            survivor.stats = moved.stats;
        }
        // Costing results of either side no longer cover all alternatives.
        survivor.winners.clear();

        for expr in &mut self.exprs {
            for c in &mut expr.children {
                if *c == gone {
                    *c = keep;
                }
            }
        }

        // Re-key every live expression; identical keys in different groups mean
        // those groups are equivalent too.
        self.dedup.clear();
        let mut duplicates = Vec::new();
        for g in 0..self.groups.len() as GroupId {
            if self.forward[g as usize] != g {
                continue;
            }
            let group = &self.groups[g as usize];
            for &e in group.logical_exprs.iter().chain(&group.physical_exprs) {
                let expr = &self.exprs[e as usize];
                let key = (expr.op.clone(), expr.children.clone());
                match self.dedup.get(&key) {
                    None => {
                        self.dedup.insert(key, e);
                    }
                    Some(&first) => {
                        let first_group = self.exprs[first as usize].group;
                        if first_group == g {
                            duplicates.push((g, e));
                        } else {
                            pending.push((first_group, g));
                        }
                    }
                }
            }
        }
        for (g, e) in duplicates {
            let group = &mut self.groups[g as usize];
            group.logical_exprs.retain(|x| *x != e);
            group.physical_exprs.retain(|x| *x != e);
        }
    }

    /// Logical expressions in other groups that take `group` as an input.
    pub fn parent_exprs(&self, group: GroupId) -> Vec<ExprId> {
        let group = self.find(group);
        self.group_ids()
            .into_iter()
            .filter(|g| *g != group)
            .flat_map(|g| self.groups[g as usize].logical_exprs.iter().copied())
            .filter(|e| self.exprs[*e as usize].children.iter().any(|c| self.find(*c) == group))
            .collect()
    }

    fn derive_output_columns(&self, op: &Operator, children: &[GroupId]) -> Vec<ColumnRef> {
        let child_cols = |i: usize| -> Vec<ColumnRef> {
            children
                .get(i)
                .map(|c| self.group(*c).logical_props.output_columns.clone())
                .unwrap_or_default()
        };
        match op {
            Operator::Logical(LogicalOp::Scan { columns, .. })
            | Operator::Physical(PhysicalOp::SeqScan { columns, .. }) => columns.clone(),
            Operator::Logical(LogicalOp::Project { exprs, aliases })
            | Operator::Physical(PhysicalOp::Project { exprs, aliases }) => project_schema(exprs, aliases),
            Operator::Logical(LogicalOp::Aggregate { group_by, aggregates })
            | Operator::Physical(PhysicalOp::HashAggregate { group_by, aggregates }) => {
                aggregate_schema(group_by, aggregates)
            }
            Operator::Logical(LogicalOp::Join { join_type, .. })
            | Operator::Physical(PhysicalOp::HashJoin { join_type, .. })
            | Operator::Physical(PhysicalOp::NestedLoopJoin { join_type, .. }) => {
                let mut cols = child_cols(0);
                if !join_type.is_left_only_output() {
                    cols.extend(child_cols(1));
                }
                cols
            }
            // Filter, Sort, Limit, set operations and enforcers keep the first
            // input's columns.
            _ => child_cols(0),
        }
    }

    /// The best plan recorded for a group and property set.
    pub fn get_best_plan(&self, group: GroupId, props: &PhysicalPropertySet) -> BestPlan {
        match self.extract_best_plan(group, props) {
            Some(plan) => {
                let cost = plan.cost;
                BestPlan::Found(plan, cost)
            }
            None => BestPlan::NotDerived,
        }
    }

    /// Build the physical plan tree by following winners top-down.
    pub fn extract_best_plan(&self, group: GroupId, props: &PhysicalPropertySet) -> Option<PlanNode> {
        let group = self.group(group);
        let winner = group.winners.get(props)?;
        let expr = self.expr(winner.expr_id);
        let Operator::Physical(op) = &expr.op else {
            return None;
        };

        let mut children = Vec::with_capacity(expr.children.len());
        for (child, child_props) in expr.children.iter().zip(&winner.child_props) {
            children.push(self.extract_best_plan(*child, child_props)?);
        }

        let node = PlanNode {
            op: op.clone(),
            children,
            cost: winner.cost,
            delivered: winner.delivered.clone(),
            row_count: group.stats.as_ref().map(|s| s.row_count).unwrap_or(0.0),
            group: group.id,
            runtime_filter: None,
        };

        // A reordered join emits its columns in its own input order. Parents read
        // columns by position, so restore the group's order.
        let produced = self.derive_output_columns(&expr.op, &expr.children);
        let expected = &group.logical_props.output_columns;
        let same_order = produced.len() == expected.len() && produced.iter().zip(expected).all(|(p, e)| p.same_column(e));
        if same_order {
            return Some(node);
        }
        Some(PlanNode {
            op: PhysicalOp::Project {
                exprs: expected.iter().map(Expr::column).collect(),
                aliases: expected.iter().map(|c| c.name.clone()).collect(),
            },
            cost: node.cost,
            delivered: node.delivered.clone(),
            row_count: node.row_count,
            group: node.group,
            runtime_filter: None,
            children: vec![node],
        })
    }
}

struct PlanInserter<'a> {
    memo: &'a mut Memo,
    stack: Vec<GroupId>,
}

impl LogicalPlanVisitor for PlanInserter<'_> {
    fn post_visit(&mut self, plan: &LogicalPlan) -> Result<()> {
        let arity = plan.inputs().len();
        if self.stack.len() < arity {
            return Err(OptimizerError::MalformedPlan(format!(
                "{} expects {} inputs",
                plan.op(),
                arity
            )));
        }
        let children = self.stack.split_off(self.stack.len() - arity);
        let (group, _) = self
            .memo
            .add_expr(Operator::Logical(plan.op().clone()), children);
        self.stack.push(group);
        Ok(())
    }
}
