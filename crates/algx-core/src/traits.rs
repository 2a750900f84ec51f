//! # Traits
//!
//! Traits are cross-cutting physical properties attached to every relational node:
//!
//! - **Convention**: the calling convention that will execute the node. Logical nodes
//!   use [`Convention::Logical`]; adapter rules convert them into an adapter's
//!   convention.
//! - **Collation**: the sort order of the node's output.
//! - **Distribution**: how rows are partitioned across workers.
//! - **Data model**: relational, document or graph (the polystore's three models).
//!
//! An operand pattern may constrain a single trait ([`Trait`]); a node satisfies the
//! constraint when its [`TraitSet`] provides at least what the trait requires.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calling convention of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Convention {
    /// Not yet implemented by anything; the convention of every logical operator.
    Logical,
    /// Executed by the built-in row engine.
    Enumerable,
    /// Executed by the named storage adapter.
    Adapter(String),
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convention::Logical => write!(f, "NONE"),
            Convention::Enumerable => write!(f, "ENUMERABLE"),
            Convention::Adapter(name) => write!(f, "{}", name.to_uppercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullDirection {
    First,
    Last,
}

/// Ordering on one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldCollation {
    pub field: usize,
    pub direction: Direction,
    pub nulls: NullDirection,
}

impl FieldCollation {
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
            nulls: NullDirection::Last,
        }
    }

    pub fn desc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Descending,
            nulls: NullDirection::First,
        }
    }
}

impl fmt::Display for FieldCollation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ascending => write!(f, "{}", self.field)?,
            Direction::Descending => write!(f, "{} DESC", self.field)?,
        }
        match (self.direction, self.nulls) {
            (Direction::Ascending, NullDirection::First) => write!(f, " NULLS FIRST"),
            (Direction::Descending, NullDirection::Last) => write!(f, " NULLS LAST"),
            _ => Ok(()),
        }
    }
}

/// Sort order of a node's output. Empty means "unordered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collation(pub Vec<FieldCollation>);

impl Collation {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn keys(&self) -> &[FieldCollation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A provided order satisfies a required one when the requirement is a prefix of it.
    /// "ORDER BY a, b, c" satisfies "ORDER BY a, b".
    pub fn satisfies(&self, required: &Collation) -> bool {
        required.0.len() <= self.0.len() && required.0.iter().zip(&self.0).all(|(r, p)| r == p)
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// Data distribution across workers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    /// No requirement / unknown.
    #[default]
    Any,
    Single,
    Broadcast,
    Hash(Vec<usize>),
    RoundRobin,
}

impl Distribution {
    pub fn satisfies(&self, required: &Distribution) -> bool {
        matches!(required, Distribution::Any) || self == required
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Any => write!(f, "any"),
            Distribution::Single => write!(f, "single"),
            Distribution::Broadcast => write!(f, "broadcast"),
            Distribution::Hash(keys) => write!(f, "hash[{}]", keys.iter().join(", ")),
            Distribution::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// Data model of the entities a node reads or produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataModel {
    #[default]
    Relational,
    Document,
    Graph,
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataModel::Relational => write!(f, "RELATIONAL"),
            DataModel::Document => write!(f, "DOCUMENT"),
            DataModel::Graph => write!(f, "GRAPH"),
        }
    }
}

/// A single trait, as used by operand constraints and trait conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trait {
    Convention(Convention),
    Collation(Collation),
    Distribution(Distribution),
    Model(DataModel),
}

/// The full set of traits of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraitSet {
    pub convention: Convention,
    pub collation: Collation,
    pub distribution: Distribution,
    pub model: DataModel,
}

impl TraitSet {
    /// Traits of a freshly translated logical node.
    pub fn logical() -> Self {
        Self {
            convention: Convention::Logical,
            collation: Collation::empty(),
            distribution: Distribution::Any,
            model: DataModel::Relational,
        }
    }

    pub fn with_convention(mut self, convention: Convention) -> Self {
        self.convention = convention;
        self
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_model(mut self, model: DataModel) -> Self {
        self.model = model;
        self
    }

    /// Replace the one trait of the same kind.
    pub fn replace(self, t: Trait) -> Self {
        match t {
            Trait::Convention(c) => self.with_convention(c),
            Trait::Collation(c) => self.with_collation(c),
            Trait::Distribution(d) => self.with_distribution(d),
            Trait::Model(m) => self.with_model(m),
        }
    }

    /// Whether this set provides what `required` asks for.
    pub fn satisfies(&self, required: &Trait) -> bool {
        match required {
            Trait::Convention(c) => &self.convention == c,
            Trait::Collation(c) => self.collation.satisfies(c),
            Trait::Distribution(d) => self.distribution.satisfies(d),
            Trait::Model(m) => &self.model == m,
        }
    }
}

impl Default for TraitSet {
    fn default() -> Self {
        Self::logical()
    }
}

impl fmt::Display for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.convention, self.collation)?;
        if self.distribution != Distribution::Any {
            write!(f, ".{}", self.distribution)?;
        }
        if self.model != DataModel::Relational {
            write!(f, ".{}", self.model)?;
        }
        Ok(())
    }
}
