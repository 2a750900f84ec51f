//! # algx-core: Relational-Algebra Rewrite Engine Core
//!
//! This crate implements the data structures and the search space of a rule-based
//! rewrite engine for relational algebra. Rules (in `algx-rules`) match subtrees and
//! register logically equivalent alternatives; the planner explores them and extracts
//! the cheapest plan.
//!
//! ## Module Overview
//!
//! - **`types`**: SQL data types and row types, with assignment compatibility.
//! - **`rex`**: Scalar expressions (literals, input refs, local refs, calls, `OVER`)
//!   and the non-mutating `RexShuttle` transformer.
//! - **`program`**: `RexProgram`, the filter+project pair a `Calc` evaluates, and
//!   `merge_programs` for stacking two of them.
//! - **`predicate`**: Conjunct decomposition, filter classification over joins, index
//!   shifting and the null-generating-side rules.
//! - **`alg`**: The immutable `AlgNode` tree with canonical digests.
//! - **`traits`**: Convention, collation, distribution and data model traits.
//! - **`pattern`**: Operand patterns rules declare to say what they match.
//! - **`rule`**: The `Rule` trait, `RuleCall` firing protocol and rule sets.
//! - **`builder`**: `AlgBuilder`, a stack-based tree builder with correct row types.
//! - **`metadata`**: Metadata oracle (row count, uniqueness, pulled-up predicates).
//! - **`catalog`** / **`stats`**: Entity statistics and cardinality formulas.
//! - **`adapter`**: Storage adapter capabilities consumed by converter rules.
//! - **`cost`**: Cost model trait and default implementation.
//! - **`planner`**: Equivalence sets, the match queue and best-plan extraction.
//! - **`error`**: `PlannerError`.

pub mod adapter;
pub mod alg;
pub mod builder;
pub mod catalog;
pub mod cost;
pub mod error;
pub mod metadata;
pub mod pattern;
pub mod planner;
pub mod predicate;
pub mod program;
pub mod rex;
pub mod rule;
pub mod stats;
pub mod traits;
pub mod types;

pub use alg::{AlgKind, AlgKindTag, AlgNode, AlgRef, JoinType};
pub use builder::{AlgBuilder, AlgBuilderFactory};
pub use error::{PlannerError, PlannerResult};
pub use pattern::Operand;
pub use planner::{Planner, SearchConfig};
pub use rex::RexNode;
pub use rule::{Rule, RuleCall, RuleSet};
pub use types::{DataType, RowType};
