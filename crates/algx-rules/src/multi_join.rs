//! # Multi-Join Rules
//!
//! Flatten trees of binary joins into a single n-ary `MultiJoin`, the input of
//! join-order enumeration.
//!
//! ```text
//! Before: Join(inner, c2)                  After: MultiJoin([A, B, C],
//!           /        \                                     joinFilter = AND(c2, c1'))
//!   MultiJoin([A, B], c1)   C
//! ```
//!
//! [`JoinToMultiJoinRule`] fires on every join. An input that is already a multi-join
//! is absorbed, and its inputs, join filter and post-join filter are carried over.
//! Filters of a right-hand input are shifted past the left input's fields. An input is
//! only absorbed when it contains no outer joins itself and is not on the
//! null-generating side of the join being flattened; otherwise it stays a single
//! opaque input.
//!
//! For a LEFT or RIGHT join, the condition is recorded as the outer condition of the
//! null-generating input instead of being AND-ed into the join filter.
//!
//! [`FilterMultiJoinMergeRule`] then folds a filter sitting on top of a multi-join into
//! its post-join filter.
//!
//! A multi-join cannot be executed, so the cost model gives it infinite cost. These
//! rules are kept out of the default rule set; see [`crate::multi_join_rule_set`].

use algx_core::alg::{AlgKind, AlgKindTag, AlgNode, AlgRef, JoinType};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::predicate::{accumulate_post_join_filter, compose_conjunction, conjunctions, shift};
use algx_core::rex::RexNode;
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;
use tracing::trace;

/// Flatten a binary join and any absorbable multi-join inputs into one `MultiJoin`.
pub struct JoinToMultiJoinRule {
    operand: Operand,
}

impl JoinToMultiJoinRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Join).inputs(vec![Operand::any_node(), Operand::any_node()]),
        }
    }
}

impl Default for JoinToMultiJoinRule {
    fn default() -> Self {
        Self::new()
    }
}

/// The multi-join pieces contributed by one input of the join being flattened.
struct Side {
    inputs: Vec<AlgRef>,
    join_types: Vec<JoinType>,
    outer_conditions: Vec<Option<RexNode>>,
    join_filter: Option<RexNode>,
    post_join_filter: Option<RexNode>,
}

impl Side {
    /// Absorb `node` when allowed, shifting its conditions right by `offset` fields.
    fn of(node: &AlgRef, null_generating: bool, offset: usize) -> Side {
        let delta = offset as isize;
        match node.kind() {
            AlgKind::MultiJoin {
                join_filter,
                full_outer,
                outer_conditions,
                join_types,
                post_join_filter,
            } if can_combine(*full_outer, join_types, null_generating) => Side {
                inputs: node.inputs().to_vec(),
                join_types: join_types.clone(),
                outer_conditions: outer_conditions
                    .iter()
                    .map(|c| c.as_ref().map(|c| shift(c, 0, delta)))
                    .collect(),
                join_filter: Some(shift(join_filter, 0, delta)),
                post_join_filter: post_join_filter.as_ref().map(|f| shift(f, 0, delta)),
            },
            _ => Side {
                inputs: vec![Arc::clone(node)],
                join_types: vec![JoinType::Inner],
                outer_conditions: vec![None],
                join_filter: None,
                post_join_filter: None,
            },
        }
    }
}

/// Whether a multi-join input can be merged into its parent.
fn can_combine(full_outer: bool, join_types: &[JoinType], null_generating: bool) -> bool {
    !full_outer && !join_types.iter().any(JoinType::is_outer) && !null_generating
}

impl Rule for JoinToMultiJoinRule {
    fn description(&self) -> &str {
        "JoinToMultiJoinRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let join = Arc::clone(call.rel(0));
        let AlgKind::Join { join_type, condition } = join.kind() else {
            return Ok(());
        };
        let (left, right) = (call.rel(1), call.rel(2));
        let lhs = Side::of(left, join_type.generates_nulls_on_left(), 0);
        let rhs = Side::of(right, join_type.generates_nulls_on_right(), left.field_count());

        let mut join_types = lhs.join_types;
        join_types.extend(rhs.join_types);
        let mut outer_conditions = lhs.outer_conditions;
        outer_conditions.extend(rhs.outer_conditions);
        // A null-generating input is never absorbed, so it is a single entry at the
        // edge of its side.
        let outer_slot = match join_type {
            JoinType::Left => Some(join_types.len() - 1),
            JoinType::Right => Some(0),
            JoinType::Inner | JoinType::Full => None,
        };
        if let Some(slot) = outer_slot {
            join_types[slot] = *join_type;
            outer_conditions[slot] = Some(condition.clone());
        }

        let mut join_filters = Vec::new();
        if outer_slot.is_none() {
            join_filters.extend(conjunctions(condition));
        }
        join_filters.extend(lhs.join_filter.iter().flat_map(conjunctions));
        join_filters.extend(rhs.join_filter.iter().flat_map(conjunctions));

        let post_filters: Vec<RexNode> = rhs
            .post_join_filter
            .into_iter()
            .chain(lhs.post_join_filter)
            .collect();
        let post_join_filter = accumulate_post_join_filter(None, post_filters);

        let mut inputs = lhs.inputs;
        inputs.extend(rhs.inputs);
        trace!("JoinToMultiJoinRule: {} flattened into {} inputs", join.digest(), inputs.len());

        let multi_join = AlgNode::multi_join(
            inputs,
            compose_conjunction(join_filters),
            join.row_type().clone(),
            *join_type == JoinType::Full,
            outer_conditions,
            join_types,
            post_join_filter,
        );
        call.transform_to(multi_join);
        Ok(())
    }
}

/// Fold a filter on top of a multi-join into the multi-join's post-join filter.
///
/// Multi-joins containing outer joins are left alone.
pub struct FilterMultiJoinMergeRule {
    operand: Operand,
}

impl FilterMultiJoinMergeRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Filter).input(Operand::of(AlgKindTag::MultiJoin)),
        }
    }
}

impl Default for FilterMultiJoinMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterMultiJoinMergeRule {
    fn description(&self) -> &str {
        "FilterMultiJoinMergeRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let (filter, multi_join) = (call.rel(0), Arc::clone(call.rel(1)));
        let (
            AlgKind::Filter { condition },
            AlgKind::MultiJoin {
                join_filter,
                full_outer,
                outer_conditions,
                join_types,
                post_join_filter,
            },
        ) = (filter.kind(), multi_join.kind())
        else {
            return Ok(());
        };
        if *full_outer || join_types.iter().any(JoinType::is_outer) {
            return Ok(());
        }

        let post_join_filter = accumulate_post_join_filter(post_join_filter.as_ref(), conjunctions(condition));
        let merged = AlgNode::multi_join(
            multi_join.inputs().to_vec(),
            join_filter.clone(),
            multi_join.row_type().clone(),
            false,
            outer_conditions.clone(),
            join_types.clone(),
            post_join_filter,
        );
        call.transform_to(merged);
        Ok(())
    }
}
