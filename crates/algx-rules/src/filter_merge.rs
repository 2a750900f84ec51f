//! # Filter Merge Rule
//!
//! Merges two stacked filters into one whose condition is the AND of both.
//!
//! ```text
//! Before: Filter(top)              After: Filter(AND(bottom, top))
//!              |                                |
//!         Filter(bottom)                        X
//!              |
//!              X
//! ```
//!
//! The merge goes through [`merge_programs`]: each filter is read as a program that
//! keeps every field, the two programs are composed and the merged condition is
//! expanded back into a plain expression. Duplicate conjuncts collapse on the way.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::program::{merge_programs, RexProgram};
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;

/// Merge a filter into the filter below it.
pub struct FilterMergeRule {
    operand: Operand,
}

impl FilterMergeRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Filter).input(Operand::of(AlgKindTag::Filter)),
        }
    }
}

impl Default for FilterMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterMergeRule {
    fn description(&self) -> &str {
        "FilterMergeRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let (top, bottom) = (Arc::clone(call.rel(0)), Arc::clone(call.rel(1)));
        let (AlgKind::Filter { condition: top_cond }, AlgKind::Filter { condition: bottom_cond }) =
            (top.kind(), bottom.kind())
        else {
            return Ok(());
        };
        let input = Arc::clone(bottom.input(0));

        let top_program = RexProgram::from_filter(bottom.row_type(), top_cond);
        let bottom_program = RexProgram::from_filter(input.row_type(), bottom_cond);
        let merged = merge_programs(&top_program, &bottom_program);
        let conditions: Vec<_> = merged.expanded_condition().into_iter().collect();

        let replacement = call.builder().push(input).filter(conditions).build();
        call.transform_to(replacement);
        Ok(())
    }
}
