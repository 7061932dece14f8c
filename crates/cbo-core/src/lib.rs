//! # cbo-core: Cascades Query Optimizer Core
//!
//! This crate implements the core data structures and algorithms for a Cascades-style
//! cost-based query optimizer for a distributed analytical database. It turns a
//! logical plan into the cheapest physical plan, choosing join distribution, set
//! operation strategies and the exchanges between nodes.
//!
//! ## Module Overview
//!
//! - **`logical`**: Validated logical plan trees and their visitor.
//! - **`memo`**: The Memo table -- the central data structure that compactly represents
//!   the entire search space of equivalent query plans using groups and expressions.
//! - **`expr`**: Expression and operator type definitions (logical, physical, scalar).
//! - **`engine`**: Budgeted exploration with transformation rules, optionally parallel.
//! - **`search`**: The Cascades top-down search algorithm with memoization.
//! - **`enforcer`**: Child property requirements, delivered properties and enforcers.
//! - **`rule`**: The Rule trait and RuleRegistry for transformation and implementation rules.
//! - **`pattern`**: Declarative pattern matching for rule applicability checks.
//! - **`cost`**: Cost model trait and default implementation (CPU/memory/network weighted).
//! - **`stats`** / **`derive`**: Statistics and cardinality estimation.
//! - **`properties`**: Physical and logical property definitions (distribution, order).
//! - **`catalog`**: Catalog trait for accessing table metadata and statistics.
//! - **`config`** / **`error`**: Session configuration, errors and warnings.
//! - **`optimizer`**: The session entry point.

pub mod catalog;
pub mod config;
pub mod cost;
pub mod derive;
pub mod enforcer;
pub mod engine;
pub mod error;
pub mod expr;
pub mod logical;
pub mod memo;
pub mod optimizer;
pub mod pattern;
pub mod properties;
pub mod rule;
pub mod search;
pub mod stats;

pub use config::OptimizerConfig;
pub use error::{Diagnostics, OptimizerError, OptimizerWarning, Result};
pub use logical::LogicalPlan;
pub use optimizer::{OptimizedPlan, Optimizer};
