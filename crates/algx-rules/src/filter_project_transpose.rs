//! # Filter Project Transpose Rule
//!
//! Moves a filter below the projection it sits on, so it can keep sinking towards the
//! scans.
//!
//! ```text
//! Before: Filter(>($0, 10))                After: Project(x=[+($0, 1)], ...)
//!              |                                        |
//!         Project(x=[+($0, 1)], ...)               Filter(>(+($0, 1), 10))
//!              |                                        |
//!              X                                        X
//! ```
//!
//! The condition is rewritten over the projection's input by substituting each
//! referenced output field with the expression that computes it. A condition or
//! projection involving a windowed aggregate is left alone: below the projection the
//! filter would change the rows the window is computed over.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::predicate::push_past_project;
use algx_core::rex::RexNode;
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;
use tracing::trace;

/// Push a filter past the projection below it.
pub struct FilterProjectTransposeRule {
    operand: Operand,
}

impl FilterProjectTransposeRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Filter).input(Operand::of(AlgKindTag::Project)),
        }
    }
}

impl Default for FilterProjectTransposeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterProjectTransposeRule {
    fn description(&self) -> &str {
        "FilterProjectTransposeRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let (filter, project) = (Arc::clone(call.rel(0)), Arc::clone(call.rel(1)));
        let (AlgKind::Filter { condition }, AlgKind::Project { exprs }) = (filter.kind(), project.kind()) else {
            return Ok(());
        };
        if condition.contains_over() || exprs.iter().any(RexNode::contains_over) {
            trace!("FilterProjectTransposeRule declined: windowed aggregate under {}", filter.digest());
            return Ok(());
        }
        let Some(pushed) = push_past_project(condition, &project) else {
            return Ok(());
        };

        let replacement = call
            .builder()
            .push(Arc::clone(project.input(0)))
            .filter([pushed])
            .project(exprs.clone(), project.row_type().field_names())
            .build();
        call.transform_to(replacement);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{col, emp, fire};
    use algx_core::alg::{AlgNode, AlgRef};
    use algx_core::rex::{AggKind, Op};
    use algx_core::types::DataType;

    fn plus_one(scan: &AlgRef) -> AlgRef {
        AlgNode::project(
            Arc::clone(scan),
            vec![
                RexNode::call(Op::Plus, vec![col(scan, 0), RexNode::int_literal(1)]),
                col(scan, 1),
            ],
            vec!["next_id".into(), "name".into()],
        )
    }

    #[test]
    fn test_filter_moves_below_project() {
        let scan = emp();
        let project = plus_one(&scan);
        let filter = AlgNode::filter(
            Arc::clone(&project),
            RexNode::call(Op::Gt, vec![col(&project, 0), RexNode::int_literal(10)]),
        );
        let results = fire(&FilterProjectTransposeRule::new(), &filter);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].explain(),
            "LogicalProject(next_id=[+($0, 1)], name=[$1])\n\
             \x20 LogicalFilter(condition=[>(+($0, 1), 10)])\n\
             \x20   LogicalScan(entity=[hr.emp])\n"
        );
    }

    #[test]
    fn test_windowed_project_declines() {
        let scan = emp();
        let over = RexNode::Over {
            agg: AggKind::Max,
            operands: vec![col(&scan, 0)],
            partition_keys: vec![],
            order_keys: vec![],
            ty: DataType::integer().with_nullable(true),
        };
        let project = AlgNode::project(Arc::clone(&scan), vec![over], vec!["top_id".into()]);
        let filter = AlgNode::filter(
            Arc::clone(&project),
            RexNode::call(Op::Gt, vec![col(&project, 0), RexNode::int_literal(10)]),
        );
        assert!(fire(&FilterProjectTransposeRule::new(), &filter).is_empty());
    }
}
