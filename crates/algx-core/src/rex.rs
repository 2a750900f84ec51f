//! # Scalar Expressions (`RexNode`)
//!
//! Scalar expressions are the row-level computations that appear inside relational
//! operators: filter conditions, projection lists, join conditions and the internal
//! expression list of a [`RexProgram`](crate::program::RexProgram).
//!
//! ## Node Forms
//!
//! - `Literal`: a typed constant.
//! - `InputRef`: positional reference to a field of the operator's input row.
//! - `LocalRef`: reference to an earlier entry of a program's internal expression list.
//!   Only meaningful inside a program.
//! - `Call`: an operator applied to an ordered operand list.
//! - `Over`: a windowed aggregate. Its presence changes cardinality semantics, so
//!   program composition refuses to look through it.
//!
//! ## Immutability and Sharing
//!
//! Expressions are never mutated. Rewrites go through a [`RexShuttle`], which rebuilds
//! a parent only when one of its children changed and otherwise hands back the original
//! node by reference (`Cow::Borrowed`). The derived `Eq`/`Hash` are structural, which is
//! what program deduplication and node digests rely on.

use crate::types::DataType;
use bit_set::BitSet;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Constant value carried by a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    /// Wrapped in `OrderedFloat` so literals can take part in structural Eq/Hash.
    Float64(OrderedFloat<f64>),
    Decimal { unscaled: i128, scale: u8 },
    Utf8(String),
    /// Days since 1970-01-01.
    Date(i32),
}

impl ScalarValue {
    /// The zero value of a numeric type, or `None` for non-numeric types.
    pub fn zero_of(ty: &DataType) -> Option<ScalarValue> {
        use crate::types::TypeKind;
        match ty.kind {
            TypeKind::Integer | TypeKind::BigInt => Some(ScalarValue::Int64(0)),
            TypeKind::Double => Some(ScalarValue::Float64(OrderedFloat(0.0))),
            TypeKind::Decimal { scale, .. } => Some(ScalarValue::Decimal { unscaled: 0, scale }),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{:?}", v.0),
            ScalarValue::Decimal { unscaled, scale } => {
                if *scale == 0 {
                    write!(f, "{unscaled}")
                } else {
                    let div = 10i128.pow(u32::from(*scale));
                    let sign = if *unscaled < 0 { "-" } else { "" };
                    let abs = unscaled.abs();
                    write!(f, "{sign}{}.{:0width$}", abs / div, abs % div, width = *scale as usize)
                }
            }
            ScalarValue::Utf8(s) => write!(f, "'{s}'"),
            ScalarValue::Date(d) => write!(f, "DATE {d}"),
        }
    }
}

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RexLiteral {
    pub value: ScalarValue,
    pub ty: DataType,
}

impl RexLiteral {
    pub fn new(value: ScalarValue, ty: DataType) -> Self {
        Self { value, ty }
    }

    /// A NULL of the given type (the type is forced nullable).
    pub fn null(ty: DataType) -> Self {
        Self::new(ScalarValue::Null, ty.with_nullable(true))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(ScalarValue::Bool(b), DataType::boolean())
    }

    /// Zero of a numeric type, or `None` if the type has no zero.
    pub fn zero(ty: DataType) -> Option<Self> {
        ScalarValue::zero_of(&ty).map(|v| Self::new(v, ty))
    }
}

impl fmt::Display for RexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            ScalarValue::Null => write!(f, "null:{}", self.ty.kind),
            _ => write!(f, "{}", self.value),
        }
    }
}

/// Aggregate function kinds, used by aggregate calls and windowed aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggKind {
    Count,
    Sum,
    /// SUM that returns 0 instead of NULL over an empty input.
    Sum0,
    Min,
    Max,
    Avg,
    SingleValue,
    /// User-defined aggregate, identified by name.
    Other(String),
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggKind::Count => write!(f, "COUNT"),
            AggKind::Sum => write!(f, "SUM"),
            AggKind::Sum0 => write!(f, "$SUM0"),
            AggKind::Min => write!(f, "MIN"),
            AggKind::Max => write!(f, "MAX"),
            AggKind::Avg => write!(f, "AVG"),
            AggKind::SingleValue => write!(f, "SINGLE_VALUE"),
            AggKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Scalar operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    And,
    Or,
    Not,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    IsNull,
    IsNotNull,
    Plus,
    Minus,
    Times,
    Divide,
    Negate,
    Cast,
    /// `CASE WHEN c1 THEN v1 ... ELSE e END`, operands `[c1, v1, ..., e]`.
    Case,
    /// Deterministic named function; its return type is always given explicitly.
    Function(String),
}

impl Op {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Op::Eq | Op::NotEq | Op::Lt | Op::LtEq | Op::Gt | Op::GtEq
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Op::Plus | Op::Minus | Op::Times | Op::Divide | Op::Negate)
    }

    /// Whether a NULL operand always yields NULL.
    pub fn is_strict(&self) -> bool {
        self.is_comparison() || self.is_arithmetic() || matches!(self, Op::Not | Op::Cast)
    }

    /// Derive the return type of a call from its operands.
    ///
    /// `Cast` and `Function` never derive a type; they must be built with an explicit one.
    pub fn derive_type(&self, operands: &[RexNode]) -> Option<DataType> {
        let any_nullable = operands.iter().any(|o| o.ty().nullable);
        match self {
            Op::And | Op::Or | Op::Not => Some(DataType::boolean().with_nullable(any_nullable)),
            op if op.is_comparison() => Some(DataType::boolean().with_nullable(any_nullable)),
            Op::IsNull | Op::IsNotNull => Some(DataType::boolean()),
            Op::Negate => operands.first().map(|o| o.ty()),
            Op::Plus | Op::Minus | Op::Times | Op::Divide => operands
                .iter()
                .map(|o| Some(o.ty()))
                .reduce(|a, b| DataType::least_restrictive(&a?, &b?))
                .flatten(),
            Op::Case => {
                // Result branches are the odd positions plus the trailing ELSE.
                let mut branches: Vec<DataType> = operands
                    .iter()
                    .skip(1)
                    .step_by(2)
                    .map(|o| o.ty())
                    .collect();
                if operands.len() % 2 == 1 {
                    if let Some(e) = operands.last() {
                        branches.push(e.ty());
                    }
                }
                branches
                    .into_iter()
                    .map(Some)
                    .reduce(|a, b| DataType::least_restrictive(&a?, &b?))
                    .flatten()
            }
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Eq => "=",
            Op::NotEq => "<>",
            Op::Lt => "<",
            Op::LtEq => "<=",
            Op::Gt => ">",
            Op::GtEq => ">=",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Times => "*",
            Op::Divide => "/",
            Op::Negate => "-",
            Op::Cast => "CAST",
            Op::Case => "CASE",
            Op::Function(name) => name.as_str(),
        };
        write!(f, "{name}")
    }
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RexNode {
    Literal(RexLiteral),
    InputRef {
        index: usize,
        ty: DataType,
    },
    LocalRef {
        index: usize,
        ty: DataType,
    },
    Call {
        op: Op,
        operands: Vec<RexNode>,
        ty: DataType,
    },
    Over {
        agg: AggKind,
        operands: Vec<RexNode>,
        partition_keys: Vec<RexNode>,
        order_keys: Vec<RexNode>,
        ty: DataType,
    },
}

impl RexNode {
    pub fn input_ref(index: usize, ty: DataType) -> Self {
        RexNode::InputRef { index, ty }
    }

    pub fn local_ref(index: usize, ty: DataType) -> Self {
        RexNode::LocalRef { index, ty }
    }

    pub fn literal(value: ScalarValue, ty: DataType) -> Self {
        RexNode::Literal(RexLiteral::new(value, ty))
    }

    pub fn bool_literal(b: bool) -> Self {
        RexNode::Literal(RexLiteral::boolean(b))
    }

    pub fn int_literal(v: i64) -> Self {
        RexNode::literal(ScalarValue::Int64(v), DataType::integer())
    }

    pub fn string_literal(s: impl Into<String>) -> Self {
        RexNode::literal(ScalarValue::Utf8(s.into()), DataType::varchar())
    }

    pub fn null_literal(ty: DataType) -> Self {
        RexNode::Literal(RexLiteral::null(ty))
    }

    /// Build a call whose return type is derived from the operands.
    ///
    /// Panics if the operator cannot derive a type (use [`RexNode::call_typed`]).
    pub fn call(op: Op, operands: Vec<RexNode>) -> Self {
        let ty = op
            .derive_type(&operands)
            .unwrap_or_else(|| panic!("cannot derive return type of {op} over {operands:?}"));
        RexNode::Call { op, operands, ty }
    }

    pub fn call_typed(op: Op, operands: Vec<RexNode>, ty: DataType) -> Self {
        RexNode::Call { op, operands, ty }
    }

    pub fn cast(operand: RexNode, ty: DataType) -> Self {
        RexNode::call_typed(Op::Cast, vec![operand], ty)
    }

    pub fn not(operand: RexNode) -> Self {
        RexNode::call(Op::Not, vec![operand])
    }

    pub fn ty(&self) -> DataType {
        match self {
            RexNode::Literal(lit) => lit.ty,
            RexNode::InputRef { ty, .. }
            | RexNode::LocalRef { ty, .. }
            | RexNode::Call { ty, .. }
            | RexNode::Over { ty, .. } => *ty,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, RexNode::Literal(_))
    }

    pub fn is_always_true(&self) -> bool {
        matches!(
            self,
            RexNode::Literal(RexLiteral {
                value: ScalarValue::Bool(true),
                ..
            })
        )
    }

    pub fn is_always_false(&self) -> bool {
        matches!(
            self,
            RexNode::Literal(RexLiteral {
                value: ScalarValue::Bool(false),
                ..
            })
        )
    }

    /// Whether this is a call of the given operator.
    pub fn is_a(&self, kind: &Op) -> bool {
        matches!(self, RexNode::Call { op, .. } if op == kind)
    }

    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            RexNode::InputRef { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&RexLiteral> {
        match self {
            RexNode::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn operands(&self) -> &[RexNode] {
        match self {
            RexNode::Call { operands, .. } | RexNode::Over { operands, .. } => operands,
            _ => &[],
        }
    }

    /// Whether a windowed aggregate occurs anywhere in this expression.
    pub fn contains_over(&self) -> bool {
        match self {
            RexNode::Over { .. } => true,
            RexNode::Call { operands, .. } => operands.iter().any(RexNode::contains_over),
            _ => false,
        }
    }

    /// Indexes of all input fields referenced by this expression.
    pub fn input_bits(&self) -> BitSet {
        let mut bits = BitSet::new();
        self.collect_inputs(&mut bits);
        bits
    }

    fn collect_inputs(&self, bits: &mut BitSet) {
        match self {
            RexNode::InputRef { index, .. } => {
                bits.insert(*index);
            }
            RexNode::Literal(_) | RexNode::LocalRef { .. } => {}
            RexNode::Call { operands, .. } => {
                for o in operands {
                    o.collect_inputs(bits);
                }
            }
            RexNode::Over {
                operands,
                partition_keys,
                order_keys,
                ..
            } => {
                for o in operands.iter().chain(partition_keys).chain(order_keys) {
                    o.collect_inputs(bits);
                }
            }
        }
    }

    /// Apply a shuttle; unchanged subtrees come back borrowed.
    pub fn accept<'a, S: RexShuttle + ?Sized>(&'a self, shuttle: &mut S) -> Cow<'a, RexNode> {
        match self {
            RexNode::Literal(_) => shuttle.visit_literal(self),
            RexNode::InputRef { .. } => shuttle.visit_input_ref(self),
            RexNode::LocalRef { .. } => shuttle.visit_local_ref(self),
            RexNode::Call { .. } | RexNode::Over { .. } => shuttle.visit_call(self),
        }
    }

    /// Replace every input reference through `f`, sharing untouched subtrees.
    pub fn map_inputs<F>(&self, f: F) -> Cow<'_, RexNode>
    where
        F: FnMut(usize, DataType) -> RexNode,
    {
        struct InputMapper<F>(F);

        impl<F: FnMut(usize, DataType) -> RexNode> RexShuttle for InputMapper<F> {
            fn visit_input_ref<'a>(&mut self, node: &'a RexNode) -> Cow<'a, RexNode> {
                match node {
                    RexNode::InputRef { index, ty } => {
                        let mapped = (self.0)(*index, *ty);
                        if &mapped == node {
                            Cow::Borrowed(node)
                        } else {
                            Cow::Owned(mapped)
                        }
                    }
                    _ => Cow::Borrowed(node),
                }
            }
        }

        self.accept(&mut InputMapper(f))
    }
}

/// Non-mutating recursive rewriter over [`RexNode`] trees.
///
/// Default methods keep leaves and rebuild calls only when an operand changed.
pub trait RexShuttle {
    fn visit_literal<'a>(&mut self, node: &'a RexNode) -> Cow<'a, RexNode> {
        Cow::Borrowed(node)
    }

    fn visit_input_ref<'a>(&mut self, node: &'a RexNode) -> Cow<'a, RexNode> {
        Cow::Borrowed(node)
    }

    fn visit_local_ref<'a>(&mut self, node: &'a RexNode) -> Cow<'a, RexNode> {
        Cow::Borrowed(node)
    }

    fn visit_call<'a>(&mut self, node: &'a RexNode) -> Cow<'a, RexNode> {
        walk_call(self, node)
    }
}

/// Transform the operands of a call or window node; rebuild only on change.
pub fn walk_call<'a, S: RexShuttle + ?Sized>(shuttle: &mut S, node: &'a RexNode) -> Cow<'a, RexNode> {
    match node {
        RexNode::Call { op, operands, ty } => match walk_list(shuttle, operands) {
            Some(operands) => Cow::Owned(RexNode::Call {
                op: op.clone(),
                operands,
                ty: *ty,
            }),
            None => Cow::Borrowed(node),
        },
        RexNode::Over {
            agg,
            operands,
            partition_keys,
            order_keys,
            ty,
        } => {
            let new_operands = walk_list(shuttle, operands);
            let new_partition = walk_list(shuttle, partition_keys);
            let new_order = walk_list(shuttle, order_keys);
            if new_operands.is_none() && new_partition.is_none() && new_order.is_none() {
                return Cow::Borrowed(node);
            }
            Cow::Owned(RexNode::Over {
                agg: agg.clone(),
                operands: new_operands.unwrap_or_else(|| operands.clone()),
                partition_keys: new_partition.unwrap_or_else(|| partition_keys.clone()),
                order_keys: new_order.unwrap_or_else(|| order_keys.clone()),
                ty: *ty,
            })
        }
        _ => node.accept(shuttle),
    }
}

/// `Some(new list)` if any element changed, `None` otherwise.
fn walk_list<S: RexShuttle + ?Sized>(shuttle: &mut S, nodes: &[RexNode]) -> Option<Vec<RexNode>> {
    let mut changed = false;
    let mapped: Vec<Cow<'_, RexNode>> = nodes
        .iter()
        .map(|n| {
            let m = n.accept(shuttle);
            changed |= matches!(m, Cow::Owned(_));
            m
        })
        .collect();
    changed.then(|| mapped.into_iter().map(Cow::into_owned).collect())
}

impl fmt::Display for RexNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RexNode::Literal(lit) => write!(f, "{lit}"),
            RexNode::InputRef { index, .. } => write!(f, "${index}"),
            RexNode::LocalRef { index, .. } => write!(f, "$t{index}"),
            RexNode::Call {
                op: Op::Cast,
                operands,
                ty,
            } => write!(f, "CAST({}):{}", operands.iter().join(", "), ty),
            RexNode::Call { op, operands, .. } => {
                write!(f, "{}({})", op, operands.iter().join(", "))
            }
            RexNode::Over {
                agg,
                operands,
                partition_keys,
                order_keys,
                ..
            } => {
                write!(f, "{}({}) OVER (", agg, operands.iter().join(", "))?;
                if !partition_keys.is_empty() {
                    write!(f, "PARTITION BY {}", partition_keys.iter().join(", "))?;
                }
                if !order_keys.is_empty() {
                    if !partition_keys.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(f, "ORDER BY {}", order_keys.iter().join(", "))?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(i: usize) -> RexNode {
        RexNode::input_ref(i, DataType::integer())
    }

    #[test]
    fn test_display() {
        let e = RexNode::call(
            Op::And,
            vec![
                RexNode::call(Op::Eq, vec![col(0), RexNode::int_literal(1)]),
                RexNode::call(Op::IsNull, vec![col(2)]),
            ],
        );
        assert_eq!(e.to_string(), "AND(=($0, 1), IS NULL($2))");
        assert_eq!(
            RexNode::null_literal(DataType::bigint()).to_string(),
            "null:BIGINT"
        );
        assert_eq!(
            RexNode::literal(
                ScalarValue::Decimal {
                    unscaled: -1205,
                    scale: 2
                },
                DataType::decimal(10, 2)
            )
            .to_string(),
            "-12.05"
        );
    }

    #[test]
    fn test_type_derivation() {
        let nullable = RexNode::input_ref(0, DataType::bigint().with_nullable(true));
        let sum = RexNode::call(Op::Plus, vec![nullable.clone(), RexNode::int_literal(1)]);
        assert_eq!(sum.ty(), DataType::bigint().with_nullable(true));
        let cmp = RexNode::call(Op::Lt, vec![col(0), RexNode::int_literal(3)]);
        assert_eq!(cmp.ty(), DataType::boolean());
        let is_null = RexNode::call(Op::IsNull, vec![nullable]);
        assert!(!is_null.ty().nullable);
    }

    #[test]
    fn test_unchanged_subtrees_are_shared() {
        let e = RexNode::call(
            Op::And,
            vec![
                RexNode::call(Op::Eq, vec![col(0), RexNode::int_literal(1)]),
                RexNode::call(Op::Gt, vec![col(3), RexNode::int_literal(2)]),
            ],
        );
        let untouched = e.map_inputs(|i, ty| RexNode::input_ref(i, ty));
        assert!(matches!(untouched, Cow::Borrowed(_)));

        let shifted = e.map_inputs(|i, ty| RexNode::input_ref(if i >= 3 { i - 3 } else { i }, ty));
        assert_eq!(shifted.to_string(), "AND(=($0, 1), >($0, 2))");
    }

    #[test]
    fn test_input_bits_and_over() {
        let over = RexNode::Over {
            agg: AggKind::Sum,
            operands: vec![col(1)],
            partition_keys: vec![col(0)],
            order_keys: vec![col(4)],
            ty: DataType::integer().with_nullable(true),
        };
        let e = RexNode::call(Op::Plus, vec![over, col(2)]);
        assert!(e.contains_over());
        let bits: Vec<usize> = e.input_bits().iter().collect();
        assert_eq!(bits, vec![0, 1, 2, 4]);
        assert_eq!(
            e.to_string(),
            "+(SUM($1) OVER (PARTITION BY $0 ORDER BY $4), $2)"
        );
    }
}
