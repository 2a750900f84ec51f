//! # Scalar Programs (`RexProgram`)
//!
//! A program is the fused form of a filter and a projection over one input row. It is
//! the payload of a `Calc` node and the unit that program composition works on.
//!
//! ## Layout
//!
//! ```text
//! exprs:     [$0, $1, $2,  1,  =($t0, $t3),  +($t1, $t3)]
//!             \_inputs_/   \____internal expressions____/
//! projects:  [a=$t0, b=$t5]
//! condition: $t4
//! ```
//!
//! - The first `n` entries of the expression list are the input references
//!   `$0..$n-1`, one per input field.
//! - Every later entry is a literal, or a call whose operands are local references to
//!   *earlier* entries. A program never references forward.
//! - Structurally identical sub-expressions are stored once.
//! - `projects.len()` equals the output field count; the condition, if present, is a
//!   boolean local reference.
//!
//! Programs are built through [`RexProgramBuilder`], which enforces all of the above.
//!
//! ## Composition
//!
//! [`merge_programs`] composes two sequential programs into one that reads only the
//! bottom program's input. See its documentation for the algorithm and postcondition.

use crate::predicate::{compose_conjunction, conjunctions};
use crate::rex::RexNode;
use crate::types::{Field, RowType};
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;

/// A filter-and-project program over a single input row type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RexProgram {
    input_row_type: RowType,
    exprs: Vec<RexNode>,
    projects: Vec<usize>,
    condition: Option<usize>,
    output_row_type: RowType,
}

impl RexProgram {
    /// The identity program: every input field projected unchanged, no condition.
    pub fn identity(row_type: &RowType) -> RexProgram {
        let mut builder = RexProgramBuilder::new(row_type.clone());
        for (i, field) in row_type.fields().iter().enumerate() {
            builder.add_project(&RexNode::input_ref(i, field.ty), field.name.clone());
        }
        builder.build()
    }

    /// A program equivalent to projecting `exprs` (named `names`) from the input.
    pub fn from_project(input_row_type: &RowType, exprs: &[RexNode], names: &[String]) -> RexProgram {
        assert_eq!(exprs.len(), names.len(), "project expression/name count mismatch");
        let mut builder = RexProgramBuilder::new(input_row_type.clone());
        for (e, n) in exprs.iter().zip(names) {
            builder.add_project(e, n.clone());
        }
        builder.build()
    }

    /// A program equivalent to filtering the input by `condition`.
    pub fn from_filter(input_row_type: &RowType, condition: &RexNode) -> RexProgram {
        let mut builder = RexProgramBuilder::new(input_row_type.clone());
        builder.add_identity();
        builder.add_condition(condition);
        builder.build()
    }

    pub fn input_row_type(&self) -> &RowType {
        &self.input_row_type
    }

    pub fn output_row_type(&self) -> &RowType {
        &self.output_row_type
    }

    pub fn expr_list(&self) -> &[RexNode] {
        &self.exprs
    }

    /// Local reference indexes of the projected expressions.
    pub fn project_list(&self) -> &[usize] {
        &self.projects
    }

    pub fn condition(&self) -> Option<usize> {
        self.condition
    }

    pub fn input_count(&self) -> usize {
        self.input_row_type.field_count()
    }

    /// Expand a local reference into a tree over input references only.
    pub fn expand_local_ref(&self, index: usize) -> RexNode {
        let expr = &self.exprs[index];
        match expr {
            RexNode::Literal(_) | RexNode::InputRef { .. } => expr.clone(),
            RexNode::LocalRef { index, .. } => self.expand_local_ref(*index),
            RexNode::Call { op, operands, ty } => RexNode::Call {
                op: op.clone(),
                operands: operands.iter().map(|o| self.expand(o)).collect(),
                ty: *ty,
            },
            RexNode::Over {
                agg,
                operands,
                partition_keys,
                order_keys,
                ty,
            } => RexNode::Over {
                agg: agg.clone(),
                operands: operands.iter().map(|o| self.expand(o)).collect(),
                partition_keys: partition_keys.iter().map(|o| self.expand(o)).collect(),
                order_keys: order_keys.iter().map(|o| self.expand(o)).collect(),
                ty: *ty,
            },
        }
    }

    fn expand(&self, operand: &RexNode) -> RexNode {
        match operand {
            RexNode::LocalRef { index, .. } => self.expand_local_ref(*index),
            other => other.clone(),
        }
    }

    /// Projected expressions expanded over the input.
    pub fn expanded_projects(&self) -> Vec<RexNode> {
        self.projects.iter().map(|&p| self.expand_local_ref(p)).collect()
    }

    /// Condition expanded over the input, if any.
    pub fn expanded_condition(&self) -> Option<RexNode> {
        self.condition.map(|c| self.expand_local_ref(c))
    }

    /// Whether the condition is absent or the literal TRUE.
    pub fn has_trivial_condition(&self) -> bool {
        match self.condition {
            None => true,
            Some(c) => self.exprs[c].is_always_true(),
        }
    }

    /// Whether the program projects exactly its input, in order, and filters nothing.
    /// Field names are not considered.
    pub fn is_trivial(&self) -> bool {
        self.has_trivial_condition()
            && self.projects.len() == self.input_count()
            && self.projects.iter().enumerate().all(|(i, &p)| p == i)
    }

    /// The input ordinal each output field reads, when the program projects only
    /// input fields with no condition. Fields may repeat or be dropped.
    pub fn projected_inputs(&self) -> Option<Vec<usize>> {
        if !self.has_trivial_condition() {
            return None;
        }
        let n = self.input_count();
        self.projects
            .iter()
            .map(|&p| (p < n).then_some(p))
            .collect()
    }

    /// Whether the program is a pure reordering of every input field exactly once.
    pub fn is_permutation(&self) -> bool {
        match self.projected_inputs() {
            Some(targets) => {
                targets.len() == self.input_count() && targets.iter().all_unique()
            }
            None => false,
        }
    }

    /// Whether any expression is a windowed aggregate.
    pub fn contains_windowed_agg(&self) -> bool {
        self.exprs.iter().any(RexNode::contains_over)
    }

    /// Canonical form: expressions re-registered in project-then-condition order,
    /// unused expressions dropped, duplicate conjuncts collapsed and an always-true
    /// condition removed. Two programs computing the same thing the same way have
    /// equal normalized forms.
    pub fn normalize(&self) -> RexProgram {
        let mut builder = RexProgramBuilder::new(self.input_row_type.clone());
        for (p, field) in self.projects.iter().zip(self.output_row_type.fields()) {
            builder.add_project(&self.expand_local_ref(*p), field.name.clone());
        }
        if let Some(condition) = self.expanded_condition() {
            builder.add_condition(&condition);
        }
        builder.build()
    }
}

impl fmt::Display for RexProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.input_count();
        if n > 0 {
            write!(f, "expr#0..{}=[{{inputs}}]", n - 1)?;
        }
        for (i, e) in self.exprs.iter().enumerate().skip(n) {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "expr#{i}=[{e}]")?;
        }
        for (p, field) in self.projects.iter().zip(self.output_row_type.fields()) {
            if n > 0 || !self.exprs.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{}=[$t{p}]", field.name)?;
        }
        if let Some(c) = self.condition {
            write!(f, ", $condition=[$t{c}]")?;
        }
        Ok(())
    }
}

/// Incremental, deduplicating builder of a [`RexProgram`].
///
/// Expressions passed in are trees over input references; the builder flattens them
/// into the local-reference form.
#[derive(Debug)]
pub struct RexProgramBuilder {
    input_row_type: RowType,
    exprs: Vec<RexNode>,
    index: HashMap<RexNode, usize>,
    projects: Vec<(usize, String)>,
    conditions: Vec<RexNode>,
}

impl RexProgramBuilder {
    pub fn new(input_row_type: RowType) -> Self {
        let mut builder = Self {
            exprs: Vec::new(),
            index: HashMap::new(),
            projects: Vec::new(),
            conditions: Vec::new(),
            input_row_type,
        };
        for i in 0..builder.input_row_type.field_count() {
            let ty = builder.input_row_type.field(i).ty;
            builder.intern(RexNode::input_ref(i, ty));
        }
        builder
    }

    /// Register an expression and return its local reference index.
    ///
    /// Panics on a local reference (expand it first) or an out-of-range input.
    pub fn register(&mut self, expr: &RexNode) -> usize {
        match expr {
            RexNode::InputRef { index, .. } => {
                assert!(
                    *index < self.input_row_type.field_count(),
                    "input reference ${index} out of range for {}",
                    self.input_row_type
                );
                *index
            }
            RexNode::LocalRef { .. } => {
                panic!("local reference {expr} must be expanded before registration")
            }
            RexNode::Literal(_) => self.intern(expr.clone()),
            RexNode::Call { op, operands, ty } => {
                let operands = self.register_operands(operands);
                self.intern(RexNode::Call {
                    op: op.clone(),
                    operands,
                    ty: *ty,
                })
            }
            RexNode::Over {
                agg,
                operands,
                partition_keys,
                order_keys,
                ty,
            } => {
                let operands = self.register_operands(operands);
                let partition_keys = self.register_operands(partition_keys);
                let order_keys = self.register_operands(order_keys);
                self.intern(RexNode::Over {
                    agg: agg.clone(),
                    operands,
                    partition_keys,
                    order_keys,
                    ty: *ty,
                })
            }
        }
    }

    fn register_operands(&mut self, operands: &[RexNode]) -> Vec<RexNode> {
        operands
            .iter()
            .map(|o| {
                let i = self.register(o);
                RexNode::local_ref(i, self.exprs[i].ty())
            })
            .collect()
    }

    fn intern(&mut self, expr: RexNode) -> usize {
        if let Some(&i) = self.index.get(&expr) {
            return i;
        }
        let i = self.exprs.len();
        self.index.insert(expr.clone(), i);
        self.exprs.push(expr);
        i
    }

    pub fn add_project(&mut self, expr: &RexNode, name: impl Into<String>) -> usize {
        let i = self.register(expr);
        self.projects.push((i, name.into()));
        i
    }

    /// Project every input field under its own name.
    pub fn add_identity(&mut self) {
        for i in 0..self.input_row_type.field_count() {
            let name = self.input_row_type.field(i).name.clone();
            self.projects.push((i, name));
        }
    }

    /// AND a condition into the program's filter.
    pub fn add_condition(&mut self, condition: &RexNode) {
        assert!(
            condition.ty().is_boolean(),
            "program condition {condition} is not boolean"
        );
        for conjunct in conjunctions(condition) {
            if !self.conditions.contains(&conjunct) {
                self.conditions.push(conjunct);
            }
        }
    }

    pub fn build(mut self) -> RexProgram {
        let condition = if self.conditions.is_empty() {
            None
        } else {
            let composed = compose_conjunction(std::mem::take(&mut self.conditions));
            (!composed.is_always_true()).then(|| self.register(&composed))
        };
        let output_row_type = RowType::new(
            self.projects
                .iter()
                .map(|(i, name)| Field::new(name.clone(), self.exprs[*i].ty()))
                .collect(),
        );
        RexProgram {
            input_row_type: self.input_row_type,
            exprs: self.exprs,
            projects: self.projects.into_iter().map(|(i, _)| i).collect(),
            condition,
            output_row_type,
        }
    }
}

/// Compose `bottom` followed by `top` into one program over `bottom`'s input.
///
/// Every input reference `$i` in `top` is replaced by `bottom`'s `i`-th projected
/// expression (with local references inlined), and the result is re-registered into a
/// fresh builder, so structurally identical sub-expressions from both programs are
/// shared. The merged condition is `bottom.condition AND top.condition`; the merged
/// projects are `top`'s substituted projects under `top`'s names.
///
/// Callers must not pass a `top` containing windowed aggregates; composing through
/// them would change how many rows the window sees.
///
/// # Panics
///
/// If `top` does not read `bottom`'s output shape, or if the merged output row type is
/// not exactly `top`'s output row type.
pub fn merge_programs(top: &RexProgram, bottom: &RexProgram) -> RexProgram {
    assert!(
        top.input_row_type.equals_sans_names(&bottom.output_row_type),
        "top program input {} does not read bottom output {}",
        top.input_row_type,
        bottom.output_row_type
    );
    let bottom_projects = bottom.expanded_projects();
    let substitute = |e: &RexNode| -> RexNode {
        e.map_inputs(|i, _| bottom_projects[i].clone()).into_owned()
    };

    let mut builder = RexProgramBuilder::new(bottom.input_row_type.clone());
    if let Some(c) = bottom.expanded_condition() {
        builder.add_condition(&c);
    }
    if let Some(c) = top.expanded_condition() {
        builder.add_condition(&substitute(&c));
    }
    for (p, field) in top.expanded_projects().iter().zip(top.output_row_type.fields()) {
        builder.add_project(&substitute(p), field.name.clone());
    }
    let merged = builder.build();
    assert_eq!(
        merged.output_row_type, top.output_row_type,
        "merged program row type {} differs from top program row type {}",
        merged.output_row_type, top.output_row_type
    );
    merged
}
