//! # Statistics and Cardinality Formulas
//!
//! Statistics feed the default metadata oracle's row-count estimates, which in turn
//! feed the cost model when the planner extracts a best plan.
//!
//! ## Statistics Hierarchy
//!
//! - **Entity-level**: row count.
//! - **Column-level**: number of distinct values (NDV) and null fraction, keyed by
//!   field ordinal.
//!
//! ## Derivation Formulas
//!
//! Row counts of intermediate nodes are derived bottom-up:
//!
//! - **Filter**: output_rows = input_rows * selectivity.
//! - **Join**: output_rows = |left| * |right| * selectivity(condition), with each
//!   equi-join key contributing 1 / max(NDV_left, NDV_right).
//! - **Aggregate**: output_rows = product of NDVs of group-by columns, capped by input
//!   rows. A grand total is always 1 row.
//!
//! ## Selectivity Estimation
//!
//! - **Equality** with a literal: 1 / NDV (uniform distribution assumption).
//! - **Range**: fixed 1/3 heuristic.
//! - **IS NULL**: the column's null fraction.
//! - **Default**: 0.1 (10%) when no better estimate is available.

use crate::rex::{Op, RexNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range comparison (`<`, `<=`, `>`, `>=`).
pub const RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// Row count assumed for entities the catalog does not know.
pub const DEFAULT_ROW_COUNT: f64 = 100.0;

/// Statistics for a stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    /// Column statistics keyed by field ordinal.
    pub column_stats: HashMap<usize, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, ordinal: usize, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(ordinal, stats);
        self
    }

    /// NDV of a column, falling back to the row count (all values distinct).
    pub fn distinct_count(&self, ordinal: usize) -> f64 {
        self.column_stats
            .get(&ordinal)
            .map(|s| s.distinct_count)
            .unwrap_or(self.row_count)
    }
}

/// Per-column statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
        }
    }
}

/// Estimate the fraction of rows a condition keeps.
///
/// `stats` describes the row the condition is evaluated over, when known. Conjuncts
/// are treated as independent.
pub fn estimate_selectivity(condition: &RexNode, stats: Option<&Statistics>) -> f64 {
    if condition.is_always_true() {
        return 1.0;
    }
    if condition.is_always_false() {
        return 0.0;
    }
    match condition {
        RexNode::Call { op: Op::And, operands, .. } => operands
            .iter()
            .map(|o| estimate_selectivity(o, stats))
            .product(),
        RexNode::Call { op: Op::Or, operands, .. } => {
            1.0 - operands
                .iter()
                .map(|o| 1.0 - estimate_selectivity(o, stats))
                .product::<f64>()
        }
        RexNode::Call { op: Op::Not, operands, .. } => {
            1.0 - operands.first().map_or(DEFAULT_FILTER_SELECTIVITY, |o| estimate_selectivity(o, stats))
        }
        RexNode::Call { op: Op::Eq, operands, .. } => column_of(operands)
            .and_then(|c| stats.map(|s| 1.0 / s.distinct_count(c).max(1.0)))
            .unwrap_or(DEFAULT_FILTER_SELECTIVITY),
        RexNode::Call { op: Op::IsNull, operands, .. } => operands
            .first()
            .and_then(RexNode::as_input_ref)
            .and_then(|c| stats?.column_stats.get(&c).map(|cs| cs.null_fraction))
            .unwrap_or(DEFAULT_FILTER_SELECTIVITY),
        RexNode::Call { op, .. } if op.is_comparison() => RANGE_SELECTIVITY,
        _ => DEFAULT_FILTER_SELECTIVITY,
    }
}

/// The column of a `column op literal` comparison.
fn column_of(operands: &[RexNode]) -> Option<usize> {
    match operands {
        [a, b] if b.is_literal() => a.as_input_ref(),
        [a, b] if a.is_literal() => b.as_input_ref(),
        _ => None,
    }
}

/// Row count after a filter, floored at 1.
pub fn derive_filter_rows(input_rows: f64, selectivity: f64) -> f64 {
    (input_rows * selectivity).max(1.0)
}

/// Row count of an equi-join given the NDV pairs of its keys.
///
/// ```text
/// |A JOIN B| = |A| * |B| / max(NDV(A.key), NDV(B.key))
/// ```
///
/// Multiple keys multiply their selectivities (independence assumption). A join
/// without keys is a cross product scaled by `residual_selectivity`.
pub fn derive_join_rows(left_rows: f64, right_rows: f64, key_ndvs: &[(f64, f64)], residual_selectivity: f64) -> f64 {
    let mut selectivity = residual_selectivity;
    for (l, r) in key_ndvs {
        selectivity /= l.max(*r).max(1.0);
    }
    (left_rows * right_rows * selectivity).max(1.0)
}

/// Number of groups an aggregate produces, capped by the input row count.
pub fn derive_aggregate_rows(input_rows: f64, group_ndvs: &[f64]) -> f64 {
    if group_ndvs.is_empty() {
        return 1.0;
    }
    group_ndvs
        .iter()
        .product::<f64>()
        .min(input_rows)
        .max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn col(i: usize) -> RexNode {
        RexNode::input_ref(i, DataType::integer())
    }

    #[test]
    fn test_equality_selectivity_uses_ndv() {
        let stats = Statistics::new(1000.0).with_column(0, ColumnStatistics::new(50.0, 0.0));
        let eq = RexNode::call(Op::Eq, vec![col(0), RexNode::int_literal(3)]);
        assert!((estimate_selectivity(&eq, Some(&stats)) - 0.02).abs() < 1e-9);
        assert_eq!(estimate_selectivity(&eq, None), DEFAULT_FILTER_SELECTIVITY);
    }

    #[test]
    fn test_conjunction_and_disjunction() {
        let lt = RexNode::call(Op::Lt, vec![col(1), RexNode::int_literal(3)]);
        let and = RexNode::call(Op::And, vec![lt.clone(), lt.clone()]);
        assert!((estimate_selectivity(&and, None) - 1.0 / 9.0).abs() < 1e-9);
        let or = RexNode::call(Op::Or, vec![lt.clone(), lt]);
        assert!((estimate_selectivity(&or, None) - 5.0 / 9.0).abs() < 1e-9);
        assert_eq!(estimate_selectivity(&RexNode::bool_literal(true), None), 1.0);
    }

    #[test]
    fn test_join_and_aggregate_rows() {
        assert_eq!(derive_join_rows(1000.0, 100.0, &[(50.0, 100.0)], 1.0), 1000.0);
        assert_eq!(derive_join_rows(10.0, 10.0, &[], 1.0), 100.0);
        assert_eq!(derive_aggregate_rows(1000.0, &[10.0, 5.0]), 50.0);
        assert_eq!(derive_aggregate_rows(20.0, &[10.0, 5.0]), 20.0);
        assert_eq!(derive_aggregate_rows(0.0, &[]), 1.0);
    }
}
