//! # Built-in Rewrite Rules
//!
//! This crate provides the rule library for the `algx-core` planner. Every rule is an
//! immutable value: an operand pattern, a description and an `on_match` that either
//! declines or registers equivalent trees through the `RuleCall`.
//!
//! ## Simplification Rules
//!
//! - **`ProjectRemoveRule`**: drops projections that pass every field through.
//! - **`ProjectMergeRule`**: merges stacked projections, composing pure permutations.
//! - **`FilterMergeRule`**: merges stacked filters through program composition.
//! - **`SortRemoveConstantKeysRule`**: drops sort keys bound to constants below.
//! - **`AggregateValuesRule`**: folds a grand-total aggregate over empty `Values`.
//! - **`UnionEliminatorRule`**: replaces a `UNION ALL` of one input with the input.
//!
//! ## Pushdown Rules
//!
//! - **`FilterJoinRule`**: pushes filter conjuncts into a join's inputs or condition,
//!   never into a null-generating side.
//! - **`JoinConditionPushRule`**: pushes single-input `ON` conjuncts into the inputs.
//! - **`FilterProjectTransposeRule`**: moves a filter below a projection.
//!
//! ## Opt-In Rule Sets
//!
//! - [`calc_rule_set`]: filter/project to `Calc` conversion and calc merging.
//! - [`multi_join_rule_set`]: flattening joins into `MultiJoin` for join ordering.
//! - [`adapter_rule_set`]: converter rules for one storage adapter.
//! - `SemiJoinRemoveRule` is never added by this crate; sessions that introduce
//!   speculative semi-joins add it themselves.
//!
//! ```text
//! let mut registry = default_rule_registry()?;
//! registry.add_source_rule_set("csv", adapter_rule_set("csv")?)?;
//! let rules = registry.to_rule_set(&["csv"])?;
//! ```

pub mod adapter_rules;
pub mod aggregate_values;
pub mod calc;
pub mod filter_join;
pub mod filter_merge;
pub mod filter_project_transpose;
pub mod multi_join;
pub mod project_merge;
pub mod project_remove;
pub mod semi_join_remove;
pub mod sort_remove_constant_keys;
pub mod union_eliminator;

pub use adapter_rules::{AdapterModifyRule, AdapterScanRule};
pub use aggregate_values::AggregateValuesRule;
pub use calc::{CalcMergeRule, CalcRemoveRule, FilterToCalcRule, ProjectToCalcRule};
pub use filter_join::{FilterJoinRule, JoinConditionPushRule};
pub use filter_merge::FilterMergeRule;
pub use filter_project_transpose::FilterProjectTransposeRule;
pub use multi_join::{FilterMultiJoinMergeRule, JoinToMultiJoinRule};
pub use project_merge::ProjectMergeRule;
pub use project_remove::ProjectRemoveRule;
pub use semi_join_remove::SemiJoinRemoveRule;
pub use sort_remove_constant_keys::SortRemoveConstantKeysRule;
pub use union_eliminator::UnionEliminatorRule;

use algx_core::error::PlannerResult;
use algx_core::rule::{RuleRegistry, RuleSet};
use std::sync::Arc;

/// The simplification and pushdown rules every session runs.
pub fn default_rule_set() -> PlannerResult<RuleSet> {
    RuleSet::new("default")
        .with(Arc::new(ProjectRemoveRule::new()))?
        .with(Arc::new(ProjectMergeRule::new()))?
        .with(Arc::new(FilterMergeRule::new()))?
        .with(Arc::new(SortRemoveConstantKeysRule::new()))?
        .with(Arc::new(AggregateValuesRule::new()))?
        .with(Arc::new(UnionEliminatorRule::new()))?
        .with(Arc::new(FilterJoinRule::new()))?
        .with(Arc::new(JoinConditionPushRule::new()))?
        .with(Arc::new(FilterProjectTransposeRule::new()))
}

/// Rules that rewrite filters and projections into merged `Calc` programs.
pub fn calc_rule_set() -> PlannerResult<RuleSet> {
    RuleSet::new("calc")
        .with(Arc::new(FilterToCalcRule::new()))?
        .with(Arc::new(ProjectToCalcRule::new()))?
        .with(Arc::new(CalcMergeRule::new()))?
        .with(Arc::new(CalcRemoveRule::new()))
}

/// Rules that accumulate join trees into `MultiJoin` nodes.
pub fn multi_join_rule_set() -> PlannerResult<RuleSet> {
    RuleSet::new("multi-join")
        .with(Arc::new(JoinToMultiJoinRule::new()))?
        .with(Arc::new(FilterMultiJoinMergeRule::new()))
}

/// Converter rules for the adapter with the given id.
pub fn adapter_rule_set(adapter: &str) -> PlannerResult<RuleSet> {
    RuleSet::new(adapter)
        .with(Arc::new(AdapterScanRule::new(adapter)))?
        .with(Arc::new(AdapterModifyRule::new(adapter)))
}

/// A registry whose base rules are [`default_rule_set`].
///
/// Adapter-specific converter rules are added per source with
/// `add_source_rule_set(id, adapter_rule_set(id)?)`.
pub fn default_rule_registry() -> PlannerResult<RuleRegistry> {
    let mut registry = RuleRegistry::new();
    for rule in default_rule_set()?.rules() {
        registry.add_rule(Arc::clone(rule))?;
    }
    Ok(registry)
}


#[cfg(test)]
mod tests {
    use super::*;
    use algx_core::error::PlannerError;

    #[test]
    fn test_rule_sets_have_unique_descriptions() {
        let default = default_rule_set().unwrap();
        assert_eq!(default.len(), 9);
        assert!(!default.contains("SemiJoinRemoveRule"));
        assert_eq!(calc_rule_set().unwrap().len(), 4);
        assert_eq!(multi_join_rule_set().unwrap().len(), 2);
        assert!(adapter_rule_set("csv").unwrap().contains("AdapterScanRule(csv)"));
    }

    #[test]
    fn test_registry_activates_adapter_rules_per_source() {
        let mut registry = default_rule_registry().unwrap();
        registry.add_source_rule_set("csv", adapter_rule_set("csv").unwrap()).unwrap();
        registry.add_source_rule_set("mem", adapter_rule_set("mem").unwrap()).unwrap();

        assert_eq!(registry.active_rules(&[]).len(), 9);
        let rules = registry.to_rule_set(&["csv"]).unwrap();
        assert!(rules.contains("AdapterScanRule(csv)"));
        assert!(!rules.contains("AdapterScanRule(mem)"));
    }

    #[test]
    fn test_default_rule_cannot_be_registered_twice() {
        let mut registry = default_rule_registry().unwrap();
        let err = registry.add_rule(Arc::new(FilterMergeRule::new())).unwrap_err();
        assert!(matches!(err, PlannerError::DuplicateRule { description } if description == "FilterMergeRule"));
    }
}
