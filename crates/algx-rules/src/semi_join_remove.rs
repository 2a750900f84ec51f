//! # Semi-Join Remove Rule
//!
//! Replaces a semi-join with its left input.
//!
//! Semi-joins are introduced speculatively as filters that could be pushed into a
//! scan. If nothing consumed one, this rule drops it, which is only correct when the
//! semi-join was redundant to begin with. It is therefore not part of the default rule
//! set; callers that introduce such semi-joins opt in.

use algx_core::alg::AlgKindTag;
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;

/// Drop a speculative semi-join.
pub struct SemiJoinRemoveRule {
    operand: Operand,
}

impl SemiJoinRemoveRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::SemiJoin),
        }
    }
}

impl Default for SemiJoinRemoveRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for SemiJoinRemoveRule {
    fn description(&self) -> &str {
        "SemiJoinRemoveRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let left = Arc::clone(call.rel(0).input(0));
        call.transform_to(left);
        Ok(())
    }
}
