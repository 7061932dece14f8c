//! # Rule System
//!
//! This module defines the rule trait and rule registry that drive the Cascades optimizer.
//!
//! ## Rule Types
//!
//! - **Transformation rules** (`RuleType::Transformation`): Rewrite a logical operator
//!   into an equivalent logical operator. They expand the search space by generating
//!   alternatives, e.g. join commutativity or pushing a filter below a set operation.
//!   They are applied by the exploration engine under the session budget.
//!
//! - **Implementation rules** (`RuleType::Implementation`): Map a logical operator to
//!   one or more physical operators, e.g. a logical Join to a shuffle hash join, a
//!   broadcast hash join and a nested loop join. They run once per logical expression
//!   when its group is first costed and are not budgeted, so a plan always exists.
//!
//! ## Rule Identity
//!
//! A rule's id is its position in the registry's active rule list. The memo keeps a
//! bitmap per expression, indexed by rule id, of the rules already applied to it.
//! This prevents infinite loops (commutativity swapping back and forth) and
//! redundant work.
//!
//! ## Rule Registry
//!
//! The `RuleRegistry` keeps base rules in insertion order and optional rule sets keyed
//! by source type, so that connector-specific rules only fire for their data source.

use crate::catalog::Catalog;
use crate::expr::Operator;
use crate::memo::{GroupId, Memo, MemoExpr};
use crate::pattern::Pattern;
use std::collections::HashMap;

/// Classification of optimization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Logical → Logical transformation (e.g., join commutativity).
    Transformation,
    /// Logical → Physical implementation (e.g., join → hash join).
    Implementation,
}

/// Context passed to rules during application.
pub struct OptContext<'a> {
    pub catalog: &'a dyn Catalog,
}

/// A child reference in a rule result: either an existing group or a new sub-expression.
///
/// This is the mechanism that lets rules create new intermediate groups. For example:
///
/// ```text
/// (A ⋈ B) ⋈ C  →  A ⋈ (B ⋈ C)
/// ```
///
/// needs a *new group* for `B ⋈ C`. The rule returns
/// `RuleChild::NewExpr(Join, [Group(B), Group(C)])` and the engine creates the group
/// when inserting the result into the memo.
#[derive(Debug, Clone)]
pub enum RuleChild {
    /// Reference to an existing group in the memo.
    Group(GroupId),
    /// A new sub-expression that the engine places in its own group (or in the
    /// existing group of an identical expression).
    NewExpr(Operator, Vec<RuleChild>),
}

/// Result of applying a rule to an expression.
#[derive(Debug, Clone)]
pub enum RuleResult {
    /// Add a new expression to the current group referencing existing child groups.
    Substitution(Operator, Vec<GroupId>),
    /// Add a new expression where some children are new sub-expressions.
    NewChildren(Operator, Vec<RuleChild>),
}

/// A rule transforms or implements expressions.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    /// Whether this rule is a transformation or implementation rule.
    fn rule_type(&self) -> RuleType;

    /// Pattern that this rule matches against.
    fn pattern(&self) -> Pattern;

    /// Apply the rule to a matching expression, producing equivalent alternatives.
    ///
    /// Rules only read the memo; the engine inserts the results.
    fn apply(&self, expr: &MemoExpr, memo: &Memo, ctx: &OptContext) -> Vec<RuleResult>;
}

/// A named set of rules (e.g., for a specific connector).
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<Box<dyn Rule>>,
}

/// Registry of optimization rules.
pub struct RuleRegistry {
    pub base_rules: Vec<Box<dyn Rule>>,
    pub source_rules: HashMap<String, RuleSet>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            base_rules: Vec::new(),
            source_rules: HashMap::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.base_rules.push(rule);
    }

    pub fn add_source_rule_set(&mut self, name: impl Into<String>, rule_set: RuleSet) {
        self.source_rules.insert(name.into(), rule_set);
    }

    /// All active rules for a given source type, in id order: base rules first,
    /// then the source's rule set.
    pub fn active_rules(&self, source: Option<&str>) -> Vec<&dyn Rule> {
        let mut rules: Vec<&dyn Rule> = self.base_rules.iter().map(|r| r.as_ref()).collect();
        if let Some(rs) = source.and_then(|s| self.source_rules.get(s)) {
            rules.extend(rs.rules.iter().map(|r| r.as_ref()));
        }
        rules
    }

    /// Active rules of one type, paired with their rule ids.
    pub fn rules_of_type(&self, source: Option<&str>, rule_type: RuleType) -> Vec<(usize, &dyn Rule)> {
        self.active_rules(source)
            .into_iter()
            .enumerate()
            .filter(|(_, r)| r.rule_type() == rule_type)
            .collect()
    }

    pub fn transformation_rules(&self, source: Option<&str>) -> Vec<(usize, &dyn Rule)> {
        self.rules_of_type(source, RuleType::Transformation)
    }

    pub fn implementation_rules(&self, source: Option<&str>) -> Vec<(usize, &dyn Rule)> {
        self.rules_of_type(source, RuleType::Implementation)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
