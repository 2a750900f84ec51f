//! # Project Remove Rule
//!
//! Removes a projection that passes every input field through unchanged.
//!
//! ```text
//! Before: Project($0, $1, $2)          After: X
//!              |
//!              X  (3 fields)
//! ```
//!
//! A trivial projection may still rename fields. Names do not affect equivalence, so
//! the input replaces it as is, with one exception: when the input is itself a
//! projection, the rule re-emits that projection under the eliminated projection's
//! names, so a plan that asked for specific names keeps them where it costs nothing.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;

/// Eliminate trivial projections.
pub struct ProjectRemoveRule {
    operand: Operand,
}

impl ProjectRemoveRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Project).with_guard(|n| n.is_trivial_project()),
        }
    }
}

impl Default for ProjectRemoveRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ProjectRemoveRule {
    fn description(&self) -> &str {
        "ProjectRemoveRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let project = call.rel(0);
        let input = Arc::clone(project.input(0));
        let names = project.row_type().field_names();

        let child_exprs = match input.kind() {
            AlgKind::Project { exprs } if input.row_type().field_names() != names => Some(exprs.clone()),
            _ => None,
        };
        let replacement = match child_exprs {
            Some(exprs) => call.builder().push(Arc::clone(input.input(0))).project(exprs, names).build(),
            None => input,
        };
        call.transform_to(replacement);
        Ok(())
    }
}
