//! # Relational Algebra Nodes (`AlgNode`)
//!
//! This module defines the immutable operator tree the rewrite engine works on.
//!
//! ## Closed Operator Set
//!
//! Operators are a closed tagged variant, [`AlgKind`], one case per operator kind with
//! its parameters. Pattern matching uses the data-free [`AlgKindTag`] discriminant or a
//! [`Capability`] query (e.g. "is join-like") instead of class hierarchies. Physical
//! implementations reuse the same kinds under a different [`Convention`] trait.
//!
//! ## Invariants
//!
//! - A node is never mutated after construction. Every rewrite builds a new node;
//!   unchanged subtrees are shared through [`AlgRef`] (`Arc<AlgNode>`).
//! - The row type is derived (or validated) by the constructor and never changes.
//! - The digest is a pure function of the subtree: operator kind, traits, the inputs'
//!   digests and the operator parameters. Two independently built identical subtrees
//!   have equal digests, which is what the search space deduplicates on. `Eq` and
//!   `Hash` on nodes are defined by the digest.
//!
//! Constructors assert their structural preconditions (boolean conditions, matching
//! row types); a failure there is a bug in the caller, not a runtime condition.

use crate::program::RexProgram;
use crate::rex::{AggKind, RexLiteral, RexNode};
use crate::traits::{Collation, Convention, DataModel, TraitSet};
use crate::types::{DataType, Field, RowType};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared handle to an immutable node.
pub type AlgRef = Arc<AlgNode>;

/// SQL join types.
///
/// Only inner joins allow predicates to move freely across both inputs. Outer joins
/// have null-generating sides that block pushdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    /// Preserves all left rows; the right side generates NULLs.
    Left,
    /// Preserves all right rows; the left side generates NULLs.
    Right,
    /// Both sides generate NULLs.
    Full,
}

impl JoinType {
    pub fn generates_nulls_on_left(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    pub fn generates_nulls_on_right(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    pub fn is_outer(&self) -> bool {
        !matches!(self, JoinType::Inner)
    }

    /// The join type once the left side is known not to generate NULLs.
    pub fn cancel_nulls_on_left(&self) -> JoinType {
        match self {
            JoinType::Right => JoinType::Inner,
            JoinType::Full => JoinType::Left,
            other => *other,
        }
    }

    /// The join type once the right side is known not to generate NULLs.
    pub fn cancel_nulls_on_right(&self) -> JoinType {
        match self {
            JoinType::Left => JoinType::Inner,
            JoinType::Full => JoinType::Right,
            other => *other,
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "inner"),
            JoinType::Left => write!(f, "left"),
            JoinType::Right => write!(f, "right"),
            JoinType::Full => write!(f, "full"),
        }
    }
}

/// A storage entity (table, collection, graph) bound to the adapter that stores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: u64,
    pub namespace: String,
    pub name: String,
    /// Identity of the adapter holding this entity; keys the adapter registry.
    pub adapter: String,
}

impl EntityRef {
    pub fn new(
        id: u64,
        namespace: impl Into<String>,
        name: impl Into<String>,
        adapter: impl Into<String>,
    ) -> Self {
        Self {
            id,
            namespace: namespace.into(),
            name: name.into(),
            adapter: adapter.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifyOperation {
    Insert,
    Update,
    Delete,
    Merge,
}

/// One aggregate function application inside an `Aggregate` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateCall {
    pub kind: AggKind,
    /// Input field ordinals. Empty for `COUNT(*)`.
    pub args: Vec<usize>,
    pub distinct: bool,
    pub ty: DataType,
    pub name: String,
}

impl AggregateCall {
    pub fn new(
        kind: AggKind,
        args: Vec<usize>,
        distinct: bool,
        ty: DataType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            args,
            distinct,
            ty,
            name: name.into(),
        }
    }

    /// Return type of a built-in aggregate.
    ///
    /// `grand_total` is true when the aggregate has no grouping columns; in that case
    /// the result of SUM/MIN/MAX/AVG over an empty input is NULL, so the type is
    /// nullable. Returns `None` for user-defined kinds and missing arguments.
    pub fn infer_type(kind: &AggKind, arg_types: &[DataType], grand_total: bool) -> Option<DataType> {
        match kind {
            AggKind::Count => Some(DataType::bigint()),
            AggKind::Sum0 => arg_types.first().map(|t| t.with_nullable(false)),
            AggKind::Sum | AggKind::Min | AggKind::Max | AggKind::Avg => arg_types
                .first()
                .map(|t| t.with_nullable(t.nullable || grand_total)),
            AggKind::SingleValue => arg_types.first().map(|t| t.with_nullable(true)),
            AggKind::Other(_) => None,
        }
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}{})",
            self.kind,
            if self.distinct { "DISTINCT " } else { "" },
            self.args.iter().map(|a| format!("${a}")).join(", ")
        )
    }
}

/// Operator kinds with their parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlgKind {
    /// Reads a storage entity. Always a leaf.
    Scan { entity: EntityRef },
    /// Literal rows. Always a leaf; zero tuples means provably empty.
    Values { tuples: Vec<Vec<RexLiteral>> },
    Filter { condition: RexNode },
    Project { exprs: Vec<RexNode> },
    /// Filter and project fused into one scalar program.
    Calc { program: RexProgram },
    Join { join_type: JoinType, condition: RexNode },
    /// Emits left rows that have at least one match on the right.
    SemiJoin {
        condition: RexNode,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    },
    /// N-ary join accumulated from a tree of binary joins.
    ///
    /// `join_types[i]` / `outer_conditions[i]` describe input `i` when it is the
    /// null-generating side of an outer join; otherwise they are `Inner` / `None`.
    /// `post_join_filter` holds conditions applied after all joins.
    MultiJoin {
        join_filter: RexNode,
        full_outer: bool,
        outer_conditions: Vec<Option<RexNode>>,
        join_types: Vec<JoinType>,
        post_join_filter: Option<RexNode>,
    },
    Aggregate {
        group_set: Vec<usize>,
        calls: Vec<AggregateCall>,
    },
    Sort {
        collation: Collation,
        offset: Option<u64>,
        fetch: Option<u64>,
    },
    Union { all: bool },
    Modify {
        entity: EntityRef,
        operation: ModifyOperation,
    },
}

/// Data-free discriminant of [`AlgKind`], used by operand patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgKindTag {
    Scan,
    Values,
    Filter,
    Project,
    Calc,
    Join,
    SemiJoin,
    MultiJoin,
    Aggregate,
    Sort,
    Union,
    Modify,
}

impl AlgKind {
    pub fn tag(&self) -> AlgKindTag {
        match self {
            AlgKind::Scan { .. } => AlgKindTag::Scan,
            AlgKind::Values { .. } => AlgKindTag::Values,
            AlgKind::Filter { .. } => AlgKindTag::Filter,
            AlgKind::Project { .. } => AlgKindTag::Project,
            AlgKind::Calc { .. } => AlgKindTag::Calc,
            AlgKind::Join { .. } => AlgKindTag::Join,
            AlgKind::SemiJoin { .. } => AlgKindTag::SemiJoin,
            AlgKind::MultiJoin { .. } => AlgKindTag::MultiJoin,
            AlgKind::Aggregate { .. } => AlgKindTag::Aggregate,
            AlgKind::Sort { .. } => AlgKindTag::Sort,
            AlgKind::Union { .. } => AlgKindTag::Union,
            AlgKind::Modify { .. } => AlgKindTag::Modify,
        }
    }
}

impl fmt::Display for AlgKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Structural capabilities shared by several operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Exactly one input.
    SingleInput,
    /// Binary join family: `Join` and `SemiJoin`.
    JoinLike,
    /// Set operations.
    SetOp,
    /// No inputs.
    Leaf,
    /// Carries a boolean condition (`Filter`, joins).
    Conditional,
}

/// An immutable relational-algebra node.
#[derive(Debug, Clone)]
pub struct AlgNode {
    kind: AlgKind,
    inputs: Vec<AlgRef>,
    traits: TraitSet,
    row_type: RowType,
    digest: String,
}

impl AlgNode {
    fn new(kind: AlgKind, inputs: Vec<AlgRef>, traits: TraitSet, row_type: RowType) -> Self {
        let digest = compute_digest(&kind, &inputs, &traits, &row_type);
        Self {
            kind,
            inputs,
            traits,
            row_type,
            digest,
        }
    }

    pub fn scan(entity: EntityRef, row_type: RowType) -> AlgRef {
        Arc::new(Self::new(AlgKind::Scan { entity }, vec![], TraitSet::logical(), row_type))
    }

    /// A scan of a non-relational entity (documents, graphs).
    pub fn scan_model(entity: EntityRef, row_type: RowType, model: DataModel) -> AlgRef {
        Arc::new(Self::new(
            AlgKind::Scan { entity },
            vec![],
            TraitSet::logical().with_model(model),
            row_type,
        ))
    }

    pub fn values(tuples: Vec<Vec<RexLiteral>>, row_type: RowType) -> AlgRef {
        for tuple in &tuples {
            assert_eq!(
                tuple.len(),
                row_type.field_count(),
                "values tuple width does not match {row_type}"
            );
            for (lit, field) in tuple.iter().zip(row_type.fields()) {
                assert!(
                    field.ty.is_assignable_from(&lit.ty),
                    "literal {lit} is not assignable to field {}",
                    field.name
                );
            }
        }
        Arc::new(Self::new(AlgKind::Values { tuples }, vec![], TraitSet::logical(), row_type))
    }

    pub fn filter(input: AlgRef, condition: RexNode) -> AlgRef {
        assert!(
            condition.ty().is_boolean(),
            "filter condition {condition} is not boolean"
        );
        let row_type = input.row_type.clone();
        let traits = input.traits.clone();
        Arc::new(Self::new(AlgKind::Filter { condition }, vec![input], traits, row_type))
    }

    pub fn project(input: AlgRef, exprs: Vec<RexNode>, names: Vec<String>) -> AlgRef {
        assert_eq!(exprs.len(), names.len(), "project expression/name count mismatch");
        let row_type = RowType::new(
            exprs
                .iter()
                .zip(names)
                .map(|(e, n)| Field::new(n, e.ty()))
                .collect(),
        );
        let traits = TraitSet::logical()
            .with_convention(input.traits.convention.clone())
            .with_model(input.traits.model);
        Arc::new(Self::new(AlgKind::Project { exprs }, vec![input], traits, row_type))
    }

    pub fn calc(input: AlgRef, program: RexProgram) -> AlgRef {
        assert!(
            program.input_row_type().equals_sans_names(&input.row_type),
            "calc program input {} does not match {}",
            program.input_row_type(),
            input.row_type
        );
        let row_type = program.output_row_type().clone();
        let traits = TraitSet::logical()
            .with_convention(input.traits.convention.clone())
            .with_model(input.traits.model);
        Arc::new(Self::new(AlgKind::Calc { program }, vec![input], traits, row_type))
    }

    pub fn join(left: AlgRef, right: AlgRef, join_type: JoinType, condition: RexNode) -> AlgRef {
        assert!(
            condition.ty().is_boolean(),
            "join condition {condition} is not boolean"
        );
        let row_type = join_row_type(&left.row_type, &right.row_type, join_type);
        let traits = TraitSet::logical().with_convention(left.traits.convention.clone());
        Arc::new(Self::new(
            AlgKind::Join {
                join_type,
                condition,
            },
            vec![left, right],
            traits,
            row_type,
        ))
    }

    pub fn semi_join(
        left: AlgRef,
        right: AlgRef,
        condition: RexNode,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    ) -> AlgRef {
        assert_eq!(left_keys.len(), right_keys.len(), "semi-join key count mismatch");
        let row_type = left.row_type.clone();
        let traits = TraitSet::logical().with_convention(left.traits.convention.clone());
        Arc::new(Self::new(
            AlgKind::SemiJoin {
                condition,
                left_keys,
                right_keys,
            },
            vec![left, right],
            traits,
            row_type,
        ))
    }

    pub fn multi_join(
        inputs: Vec<AlgRef>,
        join_filter: RexNode,
        row_type: RowType,
        full_outer: bool,
        outer_conditions: Vec<Option<RexNode>>,
        join_types: Vec<JoinType>,
        post_join_filter: Option<RexNode>,
    ) -> AlgRef {
        let width: usize = inputs.iter().map(|i| i.field_count()).sum();
        assert_eq!(width, row_type.field_count(), "multi-join row type width mismatch");
        assert_eq!(inputs.len(), join_types.len(), "one join type per multi-join input");
        assert_eq!(inputs.len(), outer_conditions.len(), "one outer condition per multi-join input");
        Arc::new(Self::new(
            AlgKind::MultiJoin {
                join_filter,
                full_outer,
                outer_conditions,
                join_types,
                post_join_filter,
            },
            inputs,
            TraitSet::logical(),
            row_type,
        ))
    }

    /// Panics if an aggregate argument or group key is out of range.
    pub fn aggregate(input: AlgRef, group_set: Vec<usize>, calls: Vec<AggregateCall>) -> AlgRef {
        let n = input.field_count();
        let mut fields = Vec::with_capacity(group_set.len() + calls.len());
        for &g in &group_set {
            assert!(g < n, "group key ${g} out of range for {n} fields");
            fields.push(input.row_type.field(g).clone());
        }
        for call in &calls {
            assert!(call.args.iter().all(|&a| a < n), "aggregate argument out of range in {call}");
            fields.push(Field::new(call.name.clone(), call.ty));
        }
        let traits = TraitSet::logical().with_convention(input.traits.convention.clone());
        Arc::new(Self::new(
            AlgKind::Aggregate { group_set, calls },
            vec![input],
            traits,
            RowType::new(fields),
        ))
    }

    pub fn sort(input: AlgRef, collation: Collation, offset: Option<u64>, fetch: Option<u64>) -> AlgRef {
        let n = input.field_count();
        assert!(
            collation.keys().iter().all(|k| k.field < n),
            "sort key out of range for {n} fields"
        );
        let row_type = input.row_type.clone();
        let traits = input.traits.clone().with_collation(collation.clone());
        Arc::new(Self::new(
            AlgKind::Sort {
                collation,
                offset,
                fetch,
            },
            vec![input],
            traits,
            row_type,
        ))
    }

    /// Panics if the inputs do not share a row shape.
    pub fn union(inputs: Vec<AlgRef>, all: bool) -> AlgRef {
        assert!(!inputs.is_empty(), "union needs at least one input");
        let row_type = inputs[0].row_type.clone();
        for input in &inputs[1..] {
            assert!(
                row_type.is_assignable_from(&input.row_type),
                "union input {} does not match {}",
                input.row_type,
                row_type
            );
        }
        Arc::new(Self::new(AlgKind::Union { all }, inputs, TraitSet::logical(), row_type))
    }

    pub fn modify(input: AlgRef, entity: EntityRef, operation: ModifyOperation) -> AlgRef {
        let row_type = RowType::from_pairs([("ROWCOUNT", DataType::bigint())]);
        Arc::new(Self::new(
            AlgKind::Modify { entity, operation },
            vec![input],
            TraitSet::logical(),
            row_type,
        ))
    }

    /// Same operator and inputs with other traits (a converted or re-sorted copy).
    pub fn copy_with_traits(&self, traits: TraitSet) -> AlgRef {
        Arc::new(Self::new(
            self.kind.clone(),
            self.inputs.clone(),
            traits,
            self.row_type.clone(),
        ))
    }

    /// Same operator with equivalent inputs. The row type is kept, so each new input
    /// must have exactly the field types of the one it replaces (names may differ).
    pub fn copy_with_inputs(&self, inputs: Vec<AlgRef>) -> AlgRef {
        assert_eq!(inputs.len(), self.inputs.len(), "input count changed on copy");
        for (old, new) in self.inputs.iter().zip(&inputs) {
            assert!(
                old.row_type.equals_sans_names(&new.row_type),
                "input {} is not equivalent to {}",
                new.row_type,
                old.row_type
            );
        }
        Arc::new(Self::new(
            self.kind.clone(),
            inputs,
            self.traits.clone(),
            self.row_type.clone(),
        ))
    }

    pub fn kind(&self) -> &AlgKind {
        &self.kind
    }

    pub fn tag(&self) -> AlgKindTag {
        self.kind.tag()
    }

    pub fn inputs(&self) -> &[AlgRef] {
        &self.inputs
    }

    pub fn input(&self, i: usize) -> &AlgRef {
        &self.inputs[i]
    }

    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    pub fn convention(&self) -> &Convention {
        &self.traits.convention
    }

    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    pub fn field_count(&self) -> usize {
        self.row_type.field_count()
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::SingleInput => self.inputs.len() == 1,
            Capability::JoinLike => matches!(self.tag(), AlgKindTag::Join | AlgKindTag::SemiJoin),
            Capability::SetOp => matches!(self.tag(), AlgKindTag::Union),
            Capability::Leaf => self.inputs.is_empty(),
            Capability::Conditional => self.condition().is_some(),
        }
    }

    pub fn join_type(&self) -> Option<JoinType> {
        match &self.kind {
            AlgKind::Join { join_type, .. } => Some(*join_type),
            AlgKind::SemiJoin { .. } => Some(JoinType::Inner),
            _ => None,
        }
    }

    pub fn condition(&self) -> Option<&RexNode> {
        match &self.kind {
            AlgKind::Filter { condition }
            | AlgKind::Join { condition, .. }
            | AlgKind::SemiJoin { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Whether this node is a `Values` with no rows.
    pub fn is_empty_values(&self) -> bool {
        matches!(&self.kind, AlgKind::Values { tuples } if tuples.is_empty())
    }

    /// For a `Project` that only reorders its input's fields (each exactly once), the
    /// input ordinal of every output field.
    pub fn permutation(&self) -> Option<Vec<usize>> {
        let AlgKind::Project { exprs } = &self.kind else {
            return None;
        };
        if exprs.len() != self.inputs[0].field_count() {
            return None;
        }
        let targets: Option<Vec<usize>> = exprs.iter().map(RexNode::as_input_ref).collect();
        targets.filter(|t| t.iter().all_unique())
    }

    /// Whether this is a `Project` reading every input field in order with the
    /// input's own types. Field names may differ.
    pub fn is_trivial_project(&self) -> bool {
        let AlgKind::Project { exprs } = &self.kind else {
            return false;
        };
        let input = self.inputs[0].row_type();
        exprs.len() == input.field_count()
            && exprs
                .iter()
                .enumerate()
                .all(|(i, e)| e.as_input_ref() == Some(i) && e.ty() == input.field(i).ty)
    }

    /// Multi-line plan rendering, one node per line, inputs indented.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        out.push_str(&"  ".repeat(indent));
        out.push_str(&format!("{}{}", self.display_name(), self.params()));
        out.push('\n');
        for input in &self.inputs {
            input.explain_into(out, indent + 1);
        }
    }

    fn display_name(&self) -> String {
        let prefix = match &self.traits.convention {
            Convention::Logical => "Logical".to_string(),
            Convention::Enumerable => "Enumerable".to_string(),
            Convention::Adapter(name) => capitalize(name),
        };
        format!("{prefix}{}", self.tag())
    }

    fn params(&self) -> String {
        operator_params(&self.kind, &self.row_type)
    }
}

impl PartialEq for AlgNode {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for AlgNode {}

impl Hash for AlgNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for AlgNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explain().trim_end())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_row_type(left: &RowType, right: &RowType, join_type: JoinType) -> RowType {
    let left = if join_type.generates_nulls_on_left() {
        left.to_nullable()
    } else {
        left.clone()
    };
    let right = if join_type.generates_nulls_on_right() {
        right.to_nullable()
    } else {
        right.clone()
    };
    left.concat(&right)
}

fn operator_params(kind: &AlgKind, row_type: &RowType) -> String {
    match kind {
        AlgKind::Scan { entity } => format!("(entity=[{}])", entity),
        AlgKind::Values { tuples } => format!(
            "(type=[{}], tuples=[{}])",
            row_type,
            tuples
                .iter()
                .map(|t| format!("[{}]", t.iter().join(", ")))
                .join(", ")
        ),
        AlgKind::Filter { condition } => format!("(condition=[{condition}])"),
        AlgKind::Project { exprs } => format!(
            "({})",
            exprs
                .iter()
                .zip(row_type.fields())
                .map(|(e, f)| format!("{}=[{}]", f.name, e))
                .join(", ")
        ),
        AlgKind::Calc { program } => format!("({program})"),
        AlgKind::Join {
            join_type,
            condition,
        } => format!("(condition=[{condition}], joinType=[{join_type}])"),
        AlgKind::SemiJoin {
            condition,
            left_keys,
            right_keys,
        } => format!(
            "(condition=[{condition}], leftKeys=[{}], rightKeys=[{}])",
            left_keys.iter().join(", "),
            right_keys.iter().join(", ")
        ),
        AlgKind::MultiJoin {
            join_filter,
            full_outer,
            outer_conditions,
            join_types,
            post_join_filter,
        } => format!(
            "(joinFilter=[{}], isFullOuterJoin=[{}], joinTypes=[{}], outerJoinConditions=[{}], postJoinFilter=[{}])",
            join_filter,
            full_outer,
            join_types.iter().join(", "),
            outer_conditions
                .iter()
                .map(|c| c.as_ref().map_or_else(|| "NULL".to_string(), ToString::to_string))
                .join(", "),
            post_join_filter
                .as_ref()
                .map_or_else(|| "NULL".to_string(), ToString::to_string)
        ),
        AlgKind::Aggregate { group_set, calls } => {
            let mut parts = vec![format!("group=[{{{}}}]", group_set.iter().join(", "))];
            parts.extend(calls.iter().map(|c| format!("{}=[{}]", c.name, c)));
            format!("({})", parts.join(", "))
        }
        AlgKind::Sort {
            collation,
            offset,
            fetch,
        } => {
            let mut parts = vec![format!("sort=[{collation}]")];
            if let Some(o) = offset {
                parts.push(format!("offset=[{o}]"));
            }
            if let Some(l) = fetch {
                parts.push(format!("fetch=[{l}]"));
            }
            format!("({})", parts.join(", "))
        }
        AlgKind::Union { all } => format!("(all=[{all}])"),
        AlgKind::Modify { entity, operation } => {
            format!("(entity=[{entity}], operation=[{operation:?}])")
        }
    }
}

fn compute_digest(kind: &AlgKind, inputs: &[AlgRef], traits: &TraitSet, row_type: &RowType) -> String {
    let mut digest = format!("{}.{}(", kind.tag(), traits);
    for (i, input) in inputs.iter().enumerate() {
        digest.push_str(&format!("input#{i}={{{}}},", input.digest));
    }
    digest.push_str(&operator_params(kind, row_type));
    digest.push(')');
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::{Op, ScalarValue};
    use crate::traits::FieldCollation;

    fn emp() -> AlgRef {
        AlgNode::scan(
            EntityRef::new(1, "public", "emp", "hsqldb"),
            RowType::from_pairs([
                ("id", DataType::integer()),
                ("name", DataType::varchar()),
                ("dept", DataType::integer().with_nullable(true)),
            ]),
        )
    }

    fn dept() -> AlgRef {
        AlgNode::scan(
            EntityRef::new(2, "public", "dept", "hsqldb"),
            RowType::from_pairs([("id", DataType::integer()), ("title", DataType::varchar())]),
        )
    }

    #[test]
    fn test_project_keeps_document_model() {
        let docs = AlgNode::scan_model(
            EntityRef::new(3, "public", "orders", "mongo"),
            RowType::from_pairs([("d", DataType::varchar())]),
            crate::traits::DataModel::Document,
        );
        let project = AlgNode::project(
            Arc::clone(&docs),
            vec![RexNode::input_ref(0, DataType::varchar())],
            vec!["doc".into()],
        );
        assert_eq!(project.traits().model, crate::traits::DataModel::Document);
        assert_ne!(docs.digest(), emp().digest());
    }

    #[test]
    fn test_digest_is_structural() {
        let cond = || RexNode::call(Op::Gt, vec![RexNode::input_ref(0, DataType::integer()), RexNode::int_literal(10)]);
        let a = AlgNode::filter(emp(), cond());
        let b = AlgNode::filter(emp(), cond());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a, b);

        let c = AlgNode::filter(dept(), cond());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_project_names_are_part_of_digest() {
        let e = vec![RexNode::input_ref(0, DataType::integer())];
        let a = AlgNode::project(emp(), e.clone(), vec!["id".into()]);
        let b = AlgNode::project(emp(), e, vec!["emp_id".into()]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_outer_join_row_type_is_nullable_on_generated_side() {
        let cond = RexNode::bool_literal(true);
        let j = AlgNode::join(emp(), dept(), JoinType::Left, cond);
        assert_eq!(j.field_count(), 5);
        assert!(!j.row_type().field(0).ty.nullable);
        assert!(j.row_type().field(3).ty.nullable);
        assert!(j.has_capability(Capability::JoinLike));
        assert_eq!(j.join_type(), Some(JoinType::Left));
    }

    #[test]
    fn test_aggregate_row_type() {
        let count = AggregateCall::new(AggKind::Count, vec![], false, DataType::bigint(), "c");
        let sum_ty = AggregateCall::infer_type(&AggKind::Sum, &[DataType::integer()], false).unwrap();
        let sum = AggregateCall::new(AggKind::Sum, vec![0], false, sum_ty, "s");
        let agg = AlgNode::aggregate(emp(), vec![2], vec![count, sum]);
        assert_eq!(agg.row_type().field_names(), vec!["dept", "c", "s"]);
        assert_eq!(
            AggregateCall::infer_type(&AggKind::Sum, &[DataType::integer()], true),
            Some(DataType::integer().with_nullable(true))
        );
        assert_eq!(AggregateCall::infer_type(&AggKind::Other("MEDIAN".into()), &[DataType::integer()], true), None);
    }

    #[test]
    fn test_sort_sets_collation_trait() {
        let s = AlgNode::sort(emp(), Collation(vec![FieldCollation::asc(1)]), None, Some(10));
        assert_eq!(s.traits().collation.keys().len(), 1);
        assert!(s.explain().starts_with("LogicalSort(sort=[[1]], fetch=[10])"));
    }

    #[test]
    fn test_explain() {
        let f = AlgNode::filter(
            emp(),
            RexNode::call(Op::Eq, vec![RexNode::input_ref(1, DataType::varchar()), RexNode::string_literal("bob")]),
        );
        assert_eq!(
            f.explain(),
            "LogicalFilter(condition=[=($1, 'bob')])\n  LogicalScan(entity=[public.emp])\n"
        );
    }

    #[test]
    fn test_empty_values() {
        let rt = RowType::from_pairs([("x", DataType::integer())]);
        let empty = AlgNode::values(vec![], rt.clone());
        assert!(empty.is_empty_values());
        let one = AlgNode::values(
            vec![vec![RexLiteral::new(ScalarValue::Int64(1), DataType::integer())]],
            rt,
        );
        assert!(!one.is_empty_values());
        assert_ne!(empty.digest(), one.digest());
    }

    #[test]
    #[should_panic(expected = "is not equivalent to")]
    fn test_copy_with_inputs_rejects_changed_nullability() {
        let join = AlgNode::join(emp(), dept(), JoinType::Inner, RexNode::bool_literal(true));
        let nullable_dept = AlgNode::scan(
            EntityRef::new(2, "public", "dept", "hsqldb"),
            RowType::from_pairs([
                ("id", DataType::integer().with_nullable(true)),
                ("title", DataType::varchar()),
            ]),
        );
        join.copy_with_inputs(vec![emp(), nullable_dept]);
    }

    #[test]
    fn test_copy_with_inputs_accepts_renamed_input() {
        let filter = AlgNode::filter(dept(), RexNode::bool_literal(true));
        let renamed = AlgNode::project(
            dept(),
            vec![RexNode::input_ref(0, DataType::integer()), RexNode::input_ref(1, DataType::varchar())],
            vec!["dept_id".into(), "dept_title".into()],
        );
        let copy = filter.copy_with_inputs(vec![renamed]);
        assert_eq!(copy.row_type(), filter.row_type());
    }

    #[test]
    #[should_panic(expected = "is not boolean")]
    fn test_non_boolean_filter_is_rejected() {
        AlgNode::filter(emp(), RexNode::int_literal(1));
    }
}
