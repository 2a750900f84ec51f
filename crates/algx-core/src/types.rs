//! # Data Types and Row Types
//!
//! Every relational-algebra node carries a **row type**: the ordered list of
//! `(name, type)` pairs describing one output row. Scalar expressions carry a single
//! [`DataType`]. Both are plain immutable values; a node's row type is computed once
//! when the node is constructed and never changes afterwards.
//!
//! ## Compatibility
//!
//! Two notions of type equality are used by the rewrite engine:
//!
//! - **Exact equality** (`==`): same field names, same kinds, same nullability. Program
//!   composition asserts this between the merged program and the top program.
//! - **Equality without names** ([`RowType::equals_sans_names`]): same field count and
//!   identical field types, nullability included. `transform_to`, `copy_with_inputs`
//!   and program composition require this between equivalent row shapes.
//! - **Assignment compatibility** ([`RowType::is_assignable_from`]): same field count and
//!   each field type assignable (same kind, numeric widening, or the NULL type).
//!   Names and nullability are ignored. Only literal rows and union inputs use it.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a scalar type, without nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean,
    Integer,
    BigInt,
    Decimal { precision: u8, scale: u8 },
    Double,
    Varchar,
    Date,
    /// Type of an untyped NULL literal. Assignable to every other kind.
    Null,
}

impl TypeKind {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeKind::Integer | TypeKind::BigInt | TypeKind::Decimal { .. } | TypeKind::Double
        )
    }

    /// Rank used for numeric widening; larger ranks can hold smaller ones.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            TypeKind::Integer => Some(0),
            TypeKind::BigInt => Some(1),
            TypeKind::Decimal { .. } => Some(2),
            TypeKind::Double => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Boolean => write!(f, "BOOLEAN"),
            TypeKind::Integer => write!(f, "INTEGER"),
            TypeKind::BigInt => write!(f, "BIGINT"),
            TypeKind::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            TypeKind::Double => write!(f, "DOUBLE"),
            TypeKind::Varchar => write!(f, "VARCHAR"),
            TypeKind::Date => write!(f, "DATE"),
            TypeKind::Null => write!(f, "NULL"),
        }
    }
}

/// A scalar data type: a kind plus nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl DataType {
    pub const fn new(kind: TypeKind, nullable: bool) -> Self {
        Self { kind, nullable }
    }

    pub const fn boolean() -> Self {
        Self::new(TypeKind::Boolean, false)
    }

    pub const fn integer() -> Self {
        Self::new(TypeKind::Integer, false)
    }

    pub const fn bigint() -> Self {
        Self::new(TypeKind::BigInt, false)
    }

    pub const fn double() -> Self {
        Self::new(TypeKind::Double, false)
    }

    pub const fn decimal(precision: u8, scale: u8) -> Self {
        Self::new(TypeKind::Decimal { precision, scale }, false)
    }

    pub const fn varchar() -> Self {
        Self::new(TypeKind::Varchar, false)
    }

    pub const fn date() -> Self {
        Self::new(TypeKind::Date, false)
    }

    /// The type of an untyped NULL literal.
    pub const fn null() -> Self {
        Self::new(TypeKind::Null, true)
    }

    /// Same kind with the given nullability.
    pub const fn with_nullable(self, nullable: bool) -> Self {
        Self::new(self.kind, nullable)
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == TypeKind::Boolean
    }

    pub fn is_numeric(&self) -> bool {
        self.kind.is_numeric()
    }

    /// Whether a value of `other` can be stored into a slot of this type.
    pub fn is_assignable_from(&self, other: &DataType) -> bool {
        if self.kind == other.kind || other.kind == TypeKind::Null {
            return true;
        }
        match (self.kind.numeric_rank(), other.kind.numeric_rank()) {
            (Some(to), Some(from)) => from <= to,
            _ => false,
        }
    }

    /// Least restrictive common type of two types, used to type arithmetic calls.
    ///
    /// Returns `None` when the kinds have no common supertype (e.g. VARCHAR and DATE).
    pub fn least_restrictive(a: &DataType, b: &DataType) -> Option<DataType> {
        let nullable = a.nullable || b.nullable;
        if a.kind == b.kind {
            return Some(a.with_nullable(nullable));
        }
        if a.kind == TypeKind::Null {
            return Some(b.with_nullable(true));
        }
        if b.kind == TypeKind::Null {
            return Some(a.with_nullable(true));
        }
        match (a.kind.numeric_rank(), b.kind.numeric_rank()) {
            (Some(ra), Some(rb)) => {
                let kind = if ra >= rb { a.kind } else { b.kind };
                Some(DataType::new(kind, nullable))
            }
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable || self.kind == TypeKind::Null {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} NOT NULL", self.kind)
        }
    }
}

/// One named column of a row type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered list of fields produced by a relational operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowType {
    fields: Vec<Field>,
}

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a row type from `(name, type)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Fields of `self` followed by the fields of `other` (the shape of a join).
    pub fn concat(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        RowType { fields }
    }

    /// Every field made nullable (the shape of a null-generating join side).
    pub fn to_nullable(&self) -> RowType {
        RowType {
            fields: self
                .fields
                .iter()
                .map(|f| Field::new(f.name.clone(), f.ty.with_nullable(true)))
                .collect(),
        }
    }

    /// Same field count and identical field types; names are ignored.
    pub fn equals_sans_names(&self, other: &RowType) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a.ty == b.ty)
    }

    /// Same field count and every field type assignable; names are ignored.
    pub fn is_assignable_from(&self, other: &RowType) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(to, from)| to.ty.is_assignable_from(&from.ty))
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordType({})",
            self.fields
                .iter()
                .map(|field| format!("{} {}", field.ty, field.name))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening_is_one_way() {
        assert!(DataType::bigint().is_assignable_from(&DataType::integer()));
        assert!(DataType::double().is_assignable_from(&DataType::decimal(10, 2)));
        assert!(!DataType::integer().is_assignable_from(&DataType::double()));
        assert!(!DataType::varchar().is_assignable_from(&DataType::integer()));
        assert!(DataType::date().is_assignable_from(&DataType::null()));
    }

    #[test]
    fn test_row_type_compatibility_ignores_names_and_nullability() {
        let a = RowType::from_pairs([("a", DataType::integer()), ("b", DataType::varchar())]);
        let b = RowType::from_pairs([
            ("x", DataType::integer().with_nullable(true)),
            ("y", DataType::varchar()),
        ]);
        assert!(a.is_assignable_from(&b));
        assert_ne!(a, b);

        let short = RowType::from_pairs([("a", DataType::integer())]);
        assert!(!a.is_assignable_from(&short));
    }

    #[test]
    fn test_equality_without_names_is_strict_on_types() {
        let a = RowType::from_pairs([("a", DataType::integer()), ("b", DataType::varchar())]);
        let renamed = RowType::from_pairs([("x", DataType::integer()), ("y", DataType::varchar())]);
        assert!(a.equals_sans_names(&renamed));

        let nullable = RowType::from_pairs([("a", DataType::integer().with_nullable(true)), ("b", DataType::varchar())]);
        assert!(!a.equals_sans_names(&nullable));
        let widened = RowType::from_pairs([("a", DataType::bigint()), ("b", DataType::varchar())]);
        assert!(!widened.equals_sans_names(&a));
        assert!(widened.is_assignable_from(&a));
    }

    #[test]
    fn test_least_restrictive() {
        let t = DataType::least_restrictive(&DataType::integer(), &DataType::double().with_nullable(true));
        assert_eq!(t, Some(DataType::double().with_nullable(true)));
        assert_eq!(
            DataType::least_restrictive(&DataType::varchar(), &DataType::date()),
            None
        );
    }

    #[test]
    fn test_display() {
        let rt = RowType::from_pairs([("a", DataType::integer()), ("b", DataType::varchar().with_nullable(true))]);
        assert_eq!(rt.to_string(), "RecordType(INTEGER NOT NULL a, VARCHAR b)");
    }
}
