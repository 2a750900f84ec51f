//! # Cost Model
//!
//! This module defines the cost abstraction used when the planner extracts the best
//! plan out of the search space.
//!
//! ## Weighted Cost
//!
//! The `DefaultCostModel` collapses three dimensions into a single comparable value:
//!
//! ```text
//! total_cost = cpu_weight * cpu_cost + memory_weight * memory_cost + io_weight * io_cost
//! ```
//!
//! Reading from storage (scans, modifications) is the I/O dimension; everything
//! evaluated row by row is CPU; hash tables and sort buffers are memory.
//!
//! ## Cost Accumulation
//!
//! Costs are **additive**: the cost of a plan is the local cost of its root (computed by
//! the cost model for that operator alone) plus the costs of the inputs' best plans.
//! The planner performs this accumulation; the model only ever sees one node.
//!
//! ## Non-implementable Operators
//!
//! A `MultiJoin` only exists to collect joins for reordering and is never executed, so
//! its cost is infinite and it never wins against a tree of binary joins.

use crate::alg::{AlgKind, AlgNode};
use crate::metadata::MetadataQuery;
use crate::predicate::split_join_keys;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cost is a single comparable value. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    /// The total weighted cost. `f64::INFINITY` marks a plan that cannot be executed.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }

    pub fn infinite() -> Self {
        Self {
            total: f64::INFINITY,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.total.is_infinite()
    }

    pub fn plus(self, other: Cost) -> Cost {
        Cost::new(self.total + other.total)
    }
}

/// Epsilon-based equality to handle floating-point imprecision in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        if self.is_infinite() || other.is_infinite() {
            return self.total == other.total;
        }
        (self.total - other.total).abs() < f64::EPSILON
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.total.partial_cmp(&other.total)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "{{inf}}")
        } else {
            write!(f, "{{{:.1}}}", self.total)
        }
    }
}

/// Trait for pluggable cost models.
pub trait CostModel: Send + Sync {
    /// Local cost of `node` alone, excluding its inputs.
    fn compute_cost(&self, node: &AlgNode, mq: &dyn MetadataQuery) -> Cost;
}

/// Default cost model: a weighted sum of CPU, memory and I/O estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultCostModel {
    /// Weight for per-row evaluation (filters, projections, comparisons).
    pub cpu_weight: f64,
    /// Weight for data held in memory (hash tables, sort buffers).
    pub memory_weight: f64,
    /// Weight for reading from or writing to storage.
    pub io_weight: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 1.0,
            io_weight: 4.0,
        }
    }
}

impl CostModel for DefaultCostModel {
    fn compute_cost(&self, node: &AlgNode, mq: &dyn MetadataQuery) -> Cost {
        let input_rows = |i: usize| mq.row_count(node.input(i));
        let local = match node.kind() {
            // Every row is read from storage once.
            AlgKind::Scan { .. } => self.io_weight * mq.row_count(node),
            AlgKind::Values { tuples } => self.cpu_weight * tuples.len() as f64,
            // One expression evaluation per input row. A Calc does the work of a
            // Filter and a Project in one pass.
            AlgKind::Filter { .. } | AlgKind::Project { .. } | AlgKind::Calc { .. } => {
                self.cpu_weight * input_rows(0)
            }
            // Hash join when there are equi-keys: build on the smaller side, probe with
            // the other. Otherwise a nested loop over both inputs.
            AlgKind::Join { condition, .. } | AlgKind::SemiJoin { condition, .. } => {
                let (left, right) = (input_rows(0), input_rows(1));
                let (keys, _, _) = split_join_keys(node.input(0).field_count(), condition);
                if keys.is_empty() {
                    self.cpu_weight * left * right
                } else {
                    self.cpu_weight * (left + right) + self.memory_weight * left.min(right)
                }
            }
            AlgKind::MultiJoin { .. } => return Cost::infinite(),
            // Hash aggregate: hash every input row, keep one entry per group.
            AlgKind::Aggregate { .. } => {
                self.cpu_weight * input_rows(0) + self.memory_weight * mq.row_count(node)
            }
            // O(n log n) comparisons plus a buffer of all rows. A sort with no keys
            // (pure offset/fetch) only streams.
            AlgKind::Sort { collation, .. } => {
                let rows = input_rows(0);
                if collation.is_empty() {
                    self.cpu_weight * rows
                } else {
                    let n_log_n = if rows > 1.0 { rows * rows.log2() } else { 1.0 };
                    self.cpu_weight * n_log_n + self.memory_weight * rows
                }
            }
            AlgKind::Union { .. } => {
                self.cpu_weight * (0..node.inputs().len()).map(input_rows).sum::<f64>()
            }
            AlgKind::Modify { .. } => self.io_weight * input_rows(0),
        };
        Cost::new(local)
    }
}
