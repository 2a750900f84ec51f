//! # Union Eliminator Rule
//!
//! A `UNION ALL` with a single input is that input. A distinct union of one input
//! still removes duplicates, so only the `ALL` form is eliminated.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;

/// Replace a single-input `UNION ALL` with its input.
pub struct UnionEliminatorRule {
    operand: Operand,
}

impl UnionEliminatorRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Union)
                .with_guard(|n| n.inputs().len() == 1 && matches!(n.kind(), AlgKind::Union { all: true })),
        }
    }
}

impl Default for UnionEliminatorRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for UnionEliminatorRule {
    fn description(&self) -> &str {
        "UnionEliminatorRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let input = Arc::clone(call.rel(0).input(0));
        call.transform_to(input);
        Ok(())
    }
}
