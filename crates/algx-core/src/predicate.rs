//! # Predicate Algebra
//!
//! Helpers for taking boolean conditions apart, deciding where each piece may be
//! evaluated, and putting them back together. Every filter-pushdown rule is built on
//! these functions.
//!
//! ## Conjuncts
//!
//! A condition is treated as the AND of its top-level **conjuncts**.
//! [`conjunctions`] flattens nested ANDs; [`compose_conjunction`] is the inverse and
//! returns a single conjunct unchanged. Recomposing a decomposition is semantically
//! the original condition.
//!
//! ## Classification Across a Join
//!
//! ```text
//!           Filter(=($1, 5) AND >($4, 0) AND =($0, $3))
//!                          |
//!                  Join(left: 3 fields, right: 2 fields)
//!
//!   =($1, 5)   refs {1}     subset of left [0, 3)   -> left
//!   >($4, 0)   refs {4}     subset of right [3, 5)  -> right, rewritten >($1, 0)
//!   =($0, $3)  refs {0, 3}  both sides              -> join condition / remains
//! ```
//!
//! A conjunct is only pushed into an input when the caller allows pushing to that
//! side. For a filter above an outer join the caller must never allow the
//! null-generating side: a filter there would remove the NULL-extended rows the join
//! is required to produce. [`simplify_join_type`] handles the opposite case, where a
//! filter above the join already rejects those rows.

use crate::alg::{AlgKind, AlgNode, JoinType};
use crate::rex::{Op, RexNode};
use bit_set::BitSet;
use std::collections::HashSet;

/// Top-level conjuncts of a condition.
///
/// Nested ANDs are flattened. A condition that is not an AND is its own single
/// conjunct, except the literal TRUE, which has none.
pub fn conjunctions(condition: &RexNode) -> Vec<RexNode> {
    let mut out = Vec::new();
    decompose(condition, &Op::And, &mut out);
    out
}

/// Top-level disjuncts of a condition. The literal FALSE has none.
pub fn disjunctions(condition: &RexNode) -> Vec<RexNode> {
    let mut out = Vec::new();
    decompose(condition, &Op::Or, &mut out);
    out
}

fn decompose(e: &RexNode, op: &Op, out: &mut Vec<RexNode>) {
    if e.is_a(op) {
        for operand in e.operands() {
            decompose(operand, op, out);
        }
        return;
    }
    let identity = match op {
        Op::And => e.is_always_true(),
        _ => e.is_always_false(),
    };
    if !identity {
        out.push(e.clone());
    }
}

/// AND a list of conjuncts.
///
/// An empty list is TRUE and a single conjunct is returned unchanged. Otherwise
/// nested ANDs are flattened, TRUE conjuncts and duplicates dropped, and a FALSE
/// conjunct makes the whole result FALSE.
pub fn compose_conjunction(conjuncts: Vec<RexNode>) -> RexNode {
    compose(conjuncts, Op::And)
}

/// OR a list of disjuncts. An empty list is FALSE.
pub fn compose_disjunction(disjuncts: Vec<RexNode>) -> RexNode {
    compose(disjuncts, Op::Or)
}

fn compose(mut nodes: Vec<RexNode>, op: Op) -> RexNode {
    let is_and = op == Op::And;
    if nodes.len() == 1 {
        return nodes.swap_remove(0);
    }
    let mut flat = Vec::with_capacity(nodes.len());
    for n in &nodes {
        decompose(n, &op, &mut flat);
    }
    let absorbing = |e: &RexNode| {
        if is_and {
            e.is_always_false()
        } else {
            e.is_always_true()
        }
    };
    if flat.iter().any(absorbing) {
        return RexNode::bool_literal(!is_and);
    }
    let mut seen = HashSet::new();
    flat.retain(|e| seen.insert(e.clone()));
    match flat.len() {
        0 => RexNode::bool_literal(is_and),
        1 => flat.swap_remove(0),
        _ => RexNode::call(op, flat),
    }
}

/// AND two conditions, skipping either one that is always TRUE.
pub fn and_join_filters(a: &RexNode, b: &RexNode) -> RexNode {
    if a.is_always_true() {
        return b.clone();
    }
    if b.is_always_true() {
        return a.clone();
    }
    compose_conjunction(vec![a.clone(), b.clone()])
}

/// Split a condition into the conjuncts that only reference `child_bits` and the rest.
pub fn split_filters(child_bits: &BitSet, condition: &RexNode) -> (Vec<RexNode>, Vec<RexNode>) {
    conjunctions(condition)
        .into_iter()
        .partition(|c| c.input_bits().is_subset(child_bits))
}

/// Bit set of the field range `[start, end)`.
pub fn range_bits(start: usize, end: usize) -> BitSet {
    (start..end).collect()
}

/// Shift every input reference at or above `start` by `delta`.
///
/// Panics if a reference would become negative.
pub fn shift(e: &RexNode, start: usize, delta: isize) -> RexNode {
    e.map_inputs(|i, ty| {
        if i < start {
            return RexNode::input_ref(i, ty);
        }
        let shifted = i
            .checked_add_signed(delta)
            .unwrap_or_else(|| panic!("shifting ${i} by {delta} goes below zero"));
        RexNode::input_ref(shifted, ty)
    })
    .into_owned()
}

/// Rewrite a condition over a projection's output into one over the projection's
/// input, by substituting each referenced output field with its expression.
///
/// Returns `None` if `node` is neither a `Project` nor a `Calc`.
pub fn push_past_project(e: &RexNode, node: &AlgNode) -> Option<RexNode> {
    let exprs = match node.kind() {
        AlgKind::Project { exprs } => exprs.clone(),
        AlgKind::Calc { program } => program.expanded_projects(),
        _ => return None,
    };
    Some(e.map_inputs(|i, _| exprs[i].clone()).into_owned())
}

/// Where each conjunct of a filter can be evaluated relative to a join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedFilters {
    /// Pushable into the left input, in left-input field space.
    pub left: Vec<RexNode>,
    /// Pushable into the right input, already shifted into right-input field space.
    pub right: Vec<RexNode>,
    /// Moved into the join condition, in join field space.
    pub join: Vec<RexNode>,
    /// Must stay where it was.
    pub remaining: Vec<RexNode>,
}

impl ClassifiedFilters {
    /// Whether any conjunct moved.
    pub fn pushed_any(&self) -> bool {
        !self.left.is_empty() || !self.right.is_empty() || !self.join.is_empty()
    }
}

/// Classify conjuncts over a join's output by the inputs they reference.
///
/// - `push_left` / `push_right` allow moving single-side conjuncts into that input.
///   Right-side conjuncts are shifted down by the left field count.
/// - `push_into` allows moving the conjuncts that reference both sides (or were not
///   pushable) into the join condition.
///
/// The flags are the caller's statement of what is safe. For a filter above an outer
/// join, the null-generating side must not be allowed; for conjuncts of the join's own
/// condition, it is the preserved side that must not be allowed.
pub fn classify_filters(
    join: &AlgNode,
    filters: Vec<RexNode>,
    push_into: bool,
    push_left: bool,
    push_right: bool,
) -> ClassifiedFilters {
    let left_count = join.input(0).field_count();
    let right_count = join.inputs().get(1).map_or(0, |r| r.field_count());
    let left_bits = range_bits(0, left_count);
    let right_bits = range_bits(left_count, left_count + right_count);

    let mut out = ClassifiedFilters::default();
    for filter in filters {
        let bits = filter.input_bits();
        if push_left && bits.is_subset(&left_bits) {
            out.left.push(filter);
        } else if push_right && !bits.is_empty() && bits.is_subset(&right_bits) {
            out.right.push(shift(&filter, left_count, -(left_count as isize)));
        } else if push_into {
            if !out.join.contains(&filter) {
                out.join.push(filter);
            }
        } else {
            out.remaining.push(filter);
        }
    }
    out
}

/// Whether `e`, used as a filter, rejects every row in which all fields of `bits` are
/// NULL (evaluates to NULL or FALSE for such rows).
pub fn rejects_nulls(e: &RexNode, bits: &BitSet) -> bool {
    match e {
        RexNode::Call { op: Op::And, operands, .. } => operands.iter().any(|o| rejects_nulls(o, bits)),
        RexNode::Call { op: Op::Or, operands, .. } => operands.iter().all(|o| rejects_nulls(o, bits)),
        RexNode::Call { op: Op::IsNotNull, operands, .. } => operands.iter().any(|o| is_null_when(o, bits)),
        _ => is_null_when(e, bits),
    }
}

/// Whether `e` is certainly NULL when every field of `bits` is NULL.
fn is_null_when(e: &RexNode, bits: &BitSet) -> bool {
    match e {
        RexNode::InputRef { index, .. } => bits.contains(*index),
        RexNode::Literal(lit) => lit.value.is_null(),
        RexNode::Call { op, operands, .. } if op.is_strict() => {
            operands.iter().any(|o| is_null_when(o, bits))
        }
        _ => false,
    }
}

/// Strengthen an outer join given the conjuncts of a filter above it.
///
/// A null-generating side whose NULL rows are rejected by some conjunct produces no
/// surviving NULL rows, so the join can stop generating them (LEFT becomes INNER when
/// a conjunct rejects NULL right fields, and so on).
pub fn simplify_join_type(join: &AlgNode, above: &[RexNode]) -> Option<JoinType> {
    let mut join_type = join.join_type()?;
    let left_count = join.input(0).field_count();
    let total = join.field_count();
    let left_bits = range_bits(0, left_count);
    let right_bits = range_bits(left_count, total);
    for conjunct in above {
        if join_type.generates_nulls_on_left() && rejects_nulls(conjunct, &left_bits) {
            join_type = join_type.cancel_nulls_on_left();
        }
        if join_type.generates_nulls_on_right() && rejects_nulls(conjunct, &right_bits) {
            join_type = join_type.cancel_nulls_on_right();
        }
    }
    Some(join_type)
}

/// AND newly pushed conjuncts into an existing post-join filter of a multi-join.
pub fn accumulate_post_join_filter(existing: Option<&RexNode>, pushed: Vec<RexNode>) -> Option<RexNode> {
    if pushed.is_empty() {
        return existing.cloned();
    }
    let pushed = compose_conjunction(pushed);
    Some(match existing {
        Some(e) => and_join_filters(e, &pushed),
        None => pushed,
    })
}

/// Equi-join keys of a join condition.
///
/// Returns the left keys, the right keys (in right-input field space) and the
/// conjuncts that are not `left = right` field comparisons.
pub fn split_join_keys(left_count: usize, condition: &RexNode) -> (Vec<usize>, Vec<usize>, Vec<RexNode>) {
    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    let mut residual = Vec::new();
    for conjunct in conjunctions(condition) {
        let key = match conjunct.operands() {
            [a, b] if conjunct.is_a(&Op::Eq) => match (a.as_input_ref(), b.as_input_ref()) {
                (Some(x), Some(y)) if x < left_count && y >= left_count => Some((x, y - left_count)),
                (Some(x), Some(y)) if y < left_count && x >= left_count => Some((y, x - left_count)),
                _ => None,
            },
            _ => None,
        };
        match key {
            Some((l, r)) => {
                left_keys.push(l);
                right_keys.push(r);
            }
            None => residual.push(conjunct),
        }
    }
    (left_keys, right_keys, residual)
}
