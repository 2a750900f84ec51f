//! # Sort Remove Constant Keys Rule
//!
//! Removes sort keys that are known to be constant. A column bound to a literal by a
//! predicate below the sort (`Sort($1) over Filter($1 = 10)`) has one value in every
//! row, so ordering by it does nothing.
//!
//! Constant columns come from the metadata oracle's pulled-up predicates. When every
//! key is constant and the sort has no offset or fetch, the sort disappears entirely;
//! otherwise it is re-emitted with the remaining keys. The original sort is demoted.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::metadata::constant_binding;
use algx_core::pattern::Operand;
use algx_core::rule::{Rule, RuleCall};
use algx_core::traits::Collation;
use std::collections::HashSet;
use std::sync::Arc;

/// Drop sort keys bound to constants.
pub struct SortRemoveConstantKeysRule {
    operand: Operand,
}

impl SortRemoveConstantKeysRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Sort),
        }
    }
}

impl Default for SortRemoveConstantKeysRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for SortRemoveConstantKeysRule {
    fn description(&self) -> &str {
        "SortRemoveConstantKeysRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let sort = Arc::clone(call.rel(0));
        let AlgKind::Sort {
            collation,
            offset,
            fetch,
        } = sort.kind()
        else {
            return Ok(());
        };
        let input = Arc::clone(sort.input(0));

        let constants: HashSet<usize> = call
            .metadata()
            .pulled_up_predicates(&input)
            .iter()
            .filter_map(|p| match constant_binding(p) {
                (Some(field), Some(_)) => Some(field),
                _ => None,
            })
            .collect();
        let kept: Vec<_> = collation
            .keys()
            .iter()
            .filter(|k| !constants.contains(&k.field))
            .cloned()
            .collect();
        if kept.len() == collation.keys().len() {
            return Ok(());
        }

        let replacement = if kept.is_empty() && offset.is_none() && fetch.is_none() {
            input
        } else {
            call.builder()
                .push(input)
                .sort_limit(*offset, *fetch, Collation(kept))
                .build()
        };
        call.transform_to(replacement);
        call.set_importance(&sort, 0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{col, emp, fire};
    use algx_core::alg::AlgNode;
    use algx_core::rex::{Op, RexNode};
    use algx_core::traits::FieldCollation;

    fn dept_is_10() -> algx_core::alg::AlgRef {
        let scan = emp();
        let cond = RexNode::call(Op::Eq, vec![col(&scan, 2), RexNode::int_literal(10)]);
        AlgNode::filter(scan, cond)
    }

    #[test]
    fn test_all_keys_constant_drops_sort() {
        let filter = dept_is_10();
        let sort = AlgNode::sort(
            Arc::clone(&filter),
            Collation(vec![FieldCollation::asc(2)]),
            None,
            None,
        );
        let results = fire(&SortRemoveConstantKeysRule::new(), &sort);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].digest(), filter.digest());
    }

    #[test]
    fn test_remaining_keys_are_kept() {
        let filter = dept_is_10();
        let sort = AlgNode::sort(
            Arc::clone(&filter),
            Collation(vec![FieldCollation::asc(2), FieldCollation::desc(0)]),
            None,
            Some(5),
        );
        let results = fire(&SortRemoveConstantKeysRule::new(), &sort);
        assert_eq!(results.len(), 1);
        let AlgKind::Sort { collation, fetch, .. } = results[0].kind() else {
            panic!("expected a sort, got {}", results[0]);
        };
        assert_eq!(collation.keys(), &[FieldCollation::desc(0)]);
        assert_eq!(*fetch, Some(5));
    }

    #[test]
    fn test_fetch_keeps_sort_without_keys() {
        let filter = dept_is_10();
        let sort = AlgNode::sort(filter, Collation(vec![FieldCollation::asc(2)]), Some(1), None);
        let results = fire(&SortRemoveConstantKeysRule::new(), &sort);
        let AlgKind::Sort { collation, offset, .. } = results[0].kind() else {
            panic!("expected a sort, got {}", results[0]);
        };
        assert!(collation.is_empty());
        assert_eq!(*offset, Some(1));
    }

    #[test]
    fn test_no_constant_keys_declines() {
        let sort = AlgNode::sort(emp(), Collation(vec![FieldCollation::asc(0)]), None, None);
        assert!(fire(&SortRemoveConstantKeysRule::new(), &sort).is_empty());
    }
}
