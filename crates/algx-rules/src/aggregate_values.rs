//! # Aggregate Values Rule
//!
//! Folds a grand-total aggregate over provably empty input into a single literal row.
//!
//! ```text
//! Before: Aggregate(group=[], COUNT(*), SUM($0))     After: Values([0, null])
//!              |
//!         Values([])  (no rows)
//! ```
//!
//! An aggregate without grouping keys always yields exactly one row. Over empty input
//! that row holds:
//!
//! | Aggregate       | Result                      |
//! |-----------------|-----------------------------|
//! | `COUNT`, `SUM0` | zero of the result type     |
//! | `MIN`, `MAX`, `SUM` | NULL of the result type |
//!
//! Any other aggregate kind makes the rule decline. Aggregates with grouping keys
//! yield no rows over empty input and are handled by empty-propagation elsewhere.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::rex::{AggKind, RexLiteral};
use algx_core::rule::{Rule, RuleCall};
use tracing::debug;

/// Fold `Aggregate(group=[])` over empty `Values` into one literal row.
pub struct AggregateValuesRule {
    operand: Operand,
}

impl AggregateValuesRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Aggregate)
                .with_guard(|n| matches!(n.kind(), AlgKind::Aggregate { group_set, .. } if group_set.is_empty()))
                .input(Operand::of(AlgKindTag::Values).with_guard(|n| n.is_empty_values())),
        }
    }
}

impl Default for AggregateValuesRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for AggregateValuesRule {
    fn description(&self) -> &str {
        "AggregateValuesRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let aggregate = call.rel(0);
        let AlgKind::Aggregate { calls, .. } = aggregate.kind() else {
            return Ok(());
        };

        let mut row = Vec::with_capacity(calls.len());
        for agg in calls {
            let literal = match agg.kind {
                AggKind::Count | AggKind::Sum0 => RexLiteral::zero(agg.ty),
                AggKind::Min | AggKind::Max | AggKind::Sum => Some(RexLiteral::null(agg.ty)),
                _ => None,
            };
            let Some(literal) = literal else {
                debug!("AggregateValuesRule declined: cannot fold {} over empty input", agg);
                return Ok(());
            };
            row.push(literal);
        }

        let row_type = aggregate.row_type().clone();
        let folded = call.builder().values(vec![row], row_type).build();
        call.transform_to(folded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::fire;
    use algx_core::alg::{AggregateCall, AlgNode};
    use algx_core::rex::ScalarValue;
    use algx_core::types::{DataType, RowType};

    fn empty() -> algx_core::alg::AlgRef {
        AlgNode::values(vec![], RowType::from_pairs([("x", DataType::integer())]))
    }

    fn folded_row(calls: Vec<AggregateCall>) -> Option<Vec<RexLiteral>> {
        let aggregate = AlgNode::aggregate(empty(), vec![], calls);
        let results = fire(&AggregateValuesRule::new(), &aggregate);
        let result = results.first()?;
        match result.kind() {
            AlgKind::Values { tuples } => Some(tuples[0].clone()),
            _ => panic!("expected values, got {result}"),
        }
    }

    #[test]
    fn test_count_and_sum_fold() {
        let row = folded_row(vec![
            AggregateCall::new(AggKind::Count, vec![], false, DataType::bigint(), "c"),
            AggregateCall::new(AggKind::Sum, vec![0], false, DataType::integer().with_nullable(true), "s"),
            AggregateCall::new(AggKind::Min, vec![0], false, DataType::integer().with_nullable(true), "m"),
            AggregateCall::new(AggKind::Sum0, vec![0], false, DataType::integer(), "z"),
        ])
        .unwrap();
        assert_eq!(row[0].value, ScalarValue::Int64(0));
        assert_eq!(row[0].ty, DataType::bigint());
        assert!(row[1].value.is_null());
        assert!(row[2].value.is_null());
        assert_eq!(row[3].value, ScalarValue::Int64(0));
    }

    #[test]
    fn test_other_kinds_decline() {
        let row = folded_row(vec![
            AggregateCall::new(AggKind::Count, vec![], false, DataType::bigint(), "c"),
            AggregateCall::new(AggKind::Avg, vec![0], false, DataType::integer().with_nullable(true), "a"),
        ]);
        assert!(row.is_none());
    }

    #[test]
    fn test_grouped_aggregate_does_not_match() {
        let aggregate = AlgNode::aggregate(
            empty(),
            vec![0],
            vec![AggregateCall::new(AggKind::Count, vec![], false, DataType::bigint(), "c")],
        );
        assert!(AggregateValuesRule::new().operand().match_tree(&aggregate).is_none());
    }
}
