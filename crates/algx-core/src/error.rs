//! Errors returned from a planning session.
//!
//! Only conditions the caller can act on are errors. A rule that does not apply simply
//! declines, and a broken invariant inside a rule (e.g. a replacement with the wrong
//! row type) panics.

/// Errors that can occur while registering rules or running the planner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PlannerError {
    /// A rule needed an adapter capability that no registered adapter provides.
    #[error("no adapter registered for '{adapter}'")]
    MissingAdapter { adapter: String },
    /// Two rules with the same description were added to one rule set.
    #[error("duplicate rule description '{description}'")]
    DuplicateRule { description: String },
    /// The planner was run before a root was set.
    #[error("planner has no root")]
    NoRoot,
    /// No member of an equivalence set could be costed without reading its own output.
    #[error("no implementable plan for set #{set}")]
    NoPlan { set: usize },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type PlannerResult<T> = Result<T, PlannerError>;
