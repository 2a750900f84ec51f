//! # Project Merge Rule
//!
//! Merges two stacked projections into one.
//!
//! ```text
//! Before: Project(top exprs)           After: Project(top exprs with $i := bottom.exprs[i])
//!              |                                   |
//!         Project(bottom exprs)                    X
//!              |
//!              X
//! ```
//!
//! ## Permutations
//!
//! When both projections only reorder fields, the merged projection is the composed
//! permutation, `merged[i] = bottom[top[i]]`. If the composition is the identity the
//! rule still emits it and leaves its removal to `ProjectRemoveRule`. When either the top
//! or the bottom projection is itself the identity, the rule declines and leaves it to
//! that rule too.
//!
//! ## Windowed Aggregates
//!
//! Substituting through a projection that computes an `OVER` call could evaluate the
//! window more than once per row, so the rule declines when either side has one.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::rex::RexNode;
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;
use tracing::trace;

/// Merge a projection into the projection below it.
pub struct ProjectMergeRule {
    operand: Operand,
}

impl ProjectMergeRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Project).input(Operand::of(AlgKindTag::Project)),
        }
    }
}

impl Default for ProjectMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ProjectMergeRule {
    fn description(&self) -> &str {
        "ProjectMergeRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let (top, bottom) = (Arc::clone(call.rel(0)), Arc::clone(call.rel(1)));
        let (AlgKind::Project { exprs: top_exprs }, AlgKind::Project { exprs: bottom_exprs }) =
            (top.kind(), bottom.kind())
        else {
            return Ok(());
        };
        let input = Arc::clone(bottom.input(0));
        let names = top.row_type().field_names();

        if let Some(top_perm) = top.permutation() {
            if top.is_trivial_project() {
                return Ok(());
            }
            if let Some(bottom_perm) = bottom.permutation() {
                if bottom.is_trivial_project() {
                    return Ok(());
                }
                let product: Vec<usize> = top_perm.iter().map(|&i| bottom_perm[i]).collect();
                let exprs = product
                    .iter()
                    .map(|&i| RexNode::input_ref(i, input.row_type().field(i).ty))
                    .collect();
                let merged = call.builder().push(input).project(exprs, names).build();
                call.transform_to(merged);
                return Ok(());
            }
        }

        if top_exprs.iter().chain(bottom_exprs).any(RexNode::contains_over) {
            trace!("ProjectMergeRule declined: windowed aggregate in {}", top.digest());
            return Ok(());
        }
        let exprs = top_exprs
            .iter()
            .map(|e| e.map_inputs(|i, _| bottom_exprs[i].clone()).into_owned())
            .collect();
        let merged = call.builder().push(input).project(exprs, names).build();
        call.transform_to(merged);
        Ok(())
    }
}
