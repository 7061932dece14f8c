//! # Cost Model
//!
//! This module defines the cost abstraction and a default cost model for the optimizer.
//!
//! ## Multi-Dimensional Cost Model
//!
//! Query execution cost depends on CPU time, memory consumption, and network
//! transfer. A [`Cost`] keeps the three components separately and collapses them
//! into a single comparable `total`:
//!
//! ```text
//! total_cost = cpu_weight * cpu_cost + memory_weight * memory_cost + network_weight * network_cost
//! ```
//!
//! The default weights (1.0, 1.0, 10.0) reflect the assumption that network I/O is
//! the most expensive dimension in a distributed system.
//!
//! ## Cost Accumulation
//!
//! Costs are **additive**: the total cost of a plan is the sum of its local cost
//! plus the accumulated costs of all child plans. Every local cost is non-negative,
//! so wrapping a plan in an enforcer never makes it cheaper.
//!
//! ## Distribution
//!
//! Only `Exchange` operators move data between nodes and therefore carry network
//! cost. Replication is paid twice: the broadcast exchange sends the input to every
//! node, and a broadcast hash join builds its hash table on every node. Both scale
//! with `num_nodes`.

use crate::expr::*;
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Estimated expense of a plan. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    pub cpu: f64,
    pub memory: f64,
    pub network: f64,
    /// The total weighted cost. `f64::MAX` represents infinity (an infeasible or
    /// not-yet-costed plan).
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            network: 0.0,
            total: 0.0,
        }
    }

    /// A cost with only a total, for callers that do not track components.
    pub fn new(total: f64) -> Self {
        Self {
            cpu: total,
            memory: 0.0,
            network: 0.0,
            total,
        }
    }

    pub fn infinite() -> Self {
        Self {
            cpu: f64::MAX,
            memory: f64::MAX,
            network: f64::MAX,
            total: f64::MAX,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::MAX
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        if self.is_infinite() || rhs.is_infinite() {
            return Cost::infinite();
        }
        Cost {
            cpu: self.cpu + rhs.cpu,
            memory: self.memory + rhs.memory,
            network: self.network + rhs.network,
            total: self.total + rhs.total,
        }
    }
}

/// Relative epsilon equality to absorb floating-point noise from summing the
/// same components in a different order.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        let scale = self.total.abs().max(other.total.abs()).max(1.0);
        (self.total - other.total).abs() <= scale * 1e-9
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self == other {
            return Some(std::cmp::Ordering::Equal);
        }
        self.total.partial_cmp(&other.total)
    }
}

/// Trait for pluggable cost models.
pub trait CostModel: Send + Sync {
    /// Cost of running `op` over inputs described by `input_stats`, producing
    /// `output_stats`, including the `children_costs`.
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        output_stats: &Statistics,
        input_stats: &[&Statistics],
        children_costs: &[Cost],
    ) -> Cost;
}

/// Default cost model.
///
/// - **CPU**: proportional to the number of rows processed or comparisons made.
/// - **Memory**: proportional to the bytes held in hash tables and sort buffers.
/// - **Network**: proportional to the bytes an exchange transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultCostModel {
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub network_weight: f64,
    /// Number of worker nodes a broadcast replicates to.
    pub num_nodes: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 1.0,
            network_weight: 10.0,
            num_nodes: 8.0,
        }
    }
}

impl DefaultCostModel {
    fn weighted(&self, cpu: f64, memory: f64, network: f64) -> Cost {
        let (cpu, memory, network) = (cpu.max(0.0), memory.max(0.0), network.max(0.0));
        Cost {
            cpu,
            memory,
            network,
            total: self.cpu_weight * cpu + self.memory_weight * memory + self.network_weight * network,
        }
    }

    /// Local cost of a single operator, excluding its inputs.
    pub fn local_cost(&self, op: &PhysicalOp, output: &Statistics, inputs: &[&Statistics]) -> Cost {
        let first = inputs.first().copied().unwrap_or(output);
        let input_rows: f64 = inputs.iter().map(|s| s.row_count).sum();
        let input_bytes: f64 = inputs.iter().map(|s| s.total_size_bytes).sum();

        match op {
            // Every stored row is read; the pushed-down predicate is evaluated per row.
            PhysicalOp::SeqScan { .. } => self.weighted(output.row_count, 0.0, 0.0),
            PhysicalOp::Filter { .. } | PhysicalOp::Project { .. } => {
                self.weighted(first.row_count, 0.0, 0.0)
            }
            // Build a hash table on the right input, probe it with the left. A
            // broadcast join builds the full table on every node.
            PhysicalOp::HashJoin { distribution, .. } => {
                let (probe, build) = match inputs {
                    [l, r, ..] => (*l, *r),
                    _ => return self.weighted(1000.0, 0.0, 0.0),
                };
                let replicas = match distribution {
                    JoinDistribution::Shuffle => 1.0,
                    JoinDistribution::Broadcast => self.num_nodes,
                };
                let cpu = build.row_count * replicas + probe.row_count + output.row_count;
                let memory = build.total_size_bytes * replicas;
                self.weighted(cpu, memory, 0.0)
            }
            // O(n * m): every left row is compared with every right row.
            PhysicalOp::NestedLoopJoin { .. } => {
                let (left, right) = match inputs {
                    [l, r, ..] => (*l, *r),
                    _ => return self.weighted(1000.0, 0.0, 0.0),
                };
                self.weighted(left.row_count * right.row_count, right.total_size_bytes, 0.0)
            }
            PhysicalOp::HashAggregate { .. } => {
                self.weighted(first.row_count, output.total_size_bytes, 0.0)
            }
            // O(n log n) comparisons, all rows buffered.
            PhysicalOp::Sort { .. } | PhysicalOp::LocalSort { .. } => {
                let rows = first.row_count;
                let n_log_n = if rows > 1.0 { rows * rows.log2() } else { 1.0 };
                self.weighted(n_log_n, first.total_size_bytes, 0.0)
            }
            PhysicalOp::Limit { .. } => self.weighted(output.row_count, 0.0, 0.0),
            // Streaming concatenation, no buffering.
            PhysicalOp::UnionAll => self.weighted(input_rows, 0.0, 0.0),
            // One hash-table insert or probe per input row; every input is held.
            PhysicalOp::HashSetOp { .. } => self.weighted(input_rows, input_bytes, 0.0),
            // One merge pass over pre-sorted inputs.
            PhysicalOp::SortMergeSetOp { .. } => self.weighted(input_rows, 0.0, 0.0),
            PhysicalOp::Exchange { kind } => {
                let bytes = first.total_size_bytes;
                let network = match kind {
                    ExchangeKind::Broadcast => bytes * self.num_nodes,
                    ExchangeKind::Gather | ExchangeKind::Shuffle(_) | ExchangeKind::RoundRobin => bytes,
                };
                self.weighted(first.row_count, 0.0, network)
            }
        }
    }
}

impl CostModel for DefaultCostModel {
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        output_stats: &Statistics,
        input_stats: &[&Statistics],
        children_costs: &[Cost],
    ) -> Cost {
        children_costs
            .iter()
            .fold(self.local_cost(op, output_stats, input_stats), |acc, c| acc + *c)
    }
}
