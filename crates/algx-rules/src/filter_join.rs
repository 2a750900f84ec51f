//! # Filter Into Join Rules
//!
//! Two rules move conjuncts across a join so that rows are discarded as early as
//! possible:
//!
//! - [`FilterJoinRule`] pushes the conjuncts of a filter sitting on top of a join into
//!   the join's inputs, or into the join condition.
//! - [`JoinConditionPushRule`] pushes conjuncts of the join's own `ON` clause that
//!   reference a single input into that input.
//!
//! ```text
//! Before: Filter(=($1, 5) AND >($4, 0) AND =($0, $3))
//!                    |
//!         Join(inner, cond)
//!           /          \
//!          A (3)        B (2)
//!
//! After:  Join(inner, cond AND =($0, $3))
//!           /                 \
//!   Filter(=($1, 5))     Filter(>($1, 0))
//!          |                   |
//!          A                   B
//! ```
//!
//! ## Null-Generating Sides
//!
//! The two rules face opposite restrictions on outer joins:
//!
//! | Join  | Filter above may enter | `ON` conjunct may enter |
//! |-------|------------------------|-------------------------|
//! | INNER | left, right, condition | left, right             |
//! | LEFT  | left                   | right                   |
//! | RIGHT | right                  | left                    |
//! | FULL  | nothing                | nothing                 |
//!
//! A filter above a LEFT join that only reads right fields also sees the NULL-extended
//! rows; pushed into the right input it could no longer reject them. An `ON` conjunct
//! on left fields of a LEFT join never removes a left row (it only decides which rows
//! match), so it may not become a filter on the left input.
//!
//! ## Smart Mode
//!
//! [`FilterJoinRule::smart`] first strengthens the join type with
//! [`simplify_join_type`]: a conjunct above a LEFT join that rejects NULL right fields
//! makes the join INNER, after which everything may be pushed. The default rule keeps
//! the join type unchanged.
//!
//! An INNER join reports the formerly NULL-extended fields as NOT NULL, so the smart
//! rewrite ends in a projection casting them back to the filter's row type.

use algx_core::alg::{AlgKind, AlgKindTag, JoinType};
use algx_core::builder::AlgBuilder;
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::predicate::{classify_filters, conjunctions, simplify_join_type};
use algx_core::rex::RexNode;
use algx_core::rule::{Rule, RuleCall};
use algx_core::types::RowType;
use std::sync::Arc;
use tracing::trace;

/// Push the conjuncts of a filter into the join below it.
pub struct FilterJoinRule {
    operand: Operand,
    smart: bool,
    description: &'static str,
}

impl FilterJoinRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Filter).input(Operand::of(AlgKindTag::Join)),
            smart: false,
            description: "FilterJoinRule",
        }
    }

    /// A variant that turns outer joins into inner joins when the filter above rejects
    /// their NULL-extended rows.
    pub fn smart() -> Self {
        Self {
            smart: true,
            description: "FilterJoinRule:smart",
            ..Self::new()
        }
    }
}

impl Default for FilterJoinRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterJoinRule {
    fn description(&self) -> &str {
        self.description
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let (filter, join) = (Arc::clone(call.rel(0)), Arc::clone(call.rel(1)));
        let (AlgKind::Filter { condition: above }, AlgKind::Join { join_type, condition }) =
            (filter.kind(), join.kind())
        else {
            return Ok(());
        };

        let above = conjunctions(above);
        let original_type = *join_type;
        let join_type = if self.smart {
            simplify_join_type(&join, &above).unwrap_or(original_type)
        } else {
            original_type
        };

        let classified = classify_filters(
            &join,
            above,
            join_type == JoinType::Inner,
            !join_type.generates_nulls_on_left(),
            !join_type.generates_nulls_on_right(),
        );
        if !classified.pushed_any() && join_type == original_type {
            trace!("{} declined: nothing can move below {}", self.description, join.digest());
            return Ok(());
        }

        let mut builder = call.builder();
        let left = builder.push(Arc::clone(join.input(0))).filter(classified.left).build();
        let right = builder.push(Arc::clone(join.input(1))).filter(classified.right).build();
        let mut join_conditions = conjunctions(condition);
        join_conditions.extend(classified.join);
        builder
            .push(left)
            .push(right)
            .join(join_type, join_conditions)
            .filter(classified.remaining);
        if join_type != original_type {
            cast_to(&mut builder, filter.row_type());
        }
        let replacement = builder.build();
        call.transform_to(replacement);
        Ok(())
    }
}

/// Project the top of the stack onto `row_type`, casting the fields whose type differs.
fn cast_to(builder: &mut AlgBuilder, row_type: &RowType) {
    let current = builder.peek().row_type().clone();
    let exprs = current
        .fields()
        .iter()
        .zip(row_type.fields())
        .enumerate()
        .map(|(i, (have, want))| {
            let field = RexNode::input_ref(i, have.ty);
            if have.ty == want.ty {
                field
            } else {
                RexNode::cast(field, want.ty)
            }
        })
        .collect();
    builder.project(exprs, row_type.field_names());
}

/// Push single-input conjuncts of a join condition into the join's inputs.
pub struct JoinConditionPushRule {
    operand: Operand,
}

impl JoinConditionPushRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Join),
        }
    }
}

impl Default for JoinConditionPushRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for JoinConditionPushRule {
    fn description(&self) -> &str {
        "JoinConditionPushRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let join = Arc::clone(call.rel(0));
        let AlgKind::Join { join_type, condition } = join.kind() else {
            return Ok(());
        };

        let classified = classify_filters(
            &join,
            conjunctions(condition),
            false,
            !join_type.generates_nulls_on_right(),
            !join_type.generates_nulls_on_left(),
        );
        if !classified.pushed_any() {
            return Ok(());
        }

        let mut builder = call.builder();
        let left = builder.push(Arc::clone(join.input(0))).filter(classified.left).build();
        let right = builder.push(Arc::clone(join.input(1))).filter(classified.right).build();
        let replacement = builder
            .push(left)
            .push(right)
            .join(*join_type, classified.remaining)
            .build();
        call.transform_to(replacement);
        Ok(())
    }
}
