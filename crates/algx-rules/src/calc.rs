//! # Calc Rules
//!
//! A `Calc` fuses a filter and a projection into one [`RexProgram`]. Converting
//! filters and projections into calcs and merging adjacent calcs collapses a chain of
//! scalar operators into a single node with shared sub-expressions.
//!
//! | Rule                 | Matches        | Produces                      |
//! |----------------------|----------------|-------------------------------|
//! | [`FilterToCalcRule`]  | `Filter`       | `Calc` with a condition       |
//! | [`ProjectToCalcRule`] | `Project`      | `Calc` with projections       |
//! | [`CalcMergeRule`]     | `Calc(Calc)`   | one `Calc` via program merge  |
//! | [`CalcRemoveRule`]    | trivial `Calc` | its input                     |
//!
//! ## Windowed Aggregates
//!
//! `CalcMergeRule` will not merge a top program that contains a windowed aggregate:
//! that would move the window below the bottom program's condition and change which
//! rows it aggregates over.
//!
//! ## Identity Demotion
//!
//! When the merged program normalizes to the bottom program, the top calc computed
//! nothing. The merged calc is still registered, and the top calc is demoted to
//! importance zero so no further rule spends time on it.

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::program::{merge_programs, RexProgram};
use algx_core::rule::{Rule, RuleCall};
use std::sync::Arc;
use tracing::debug;

/// Convert a `Filter` into a `Calc`.
pub struct FilterToCalcRule {
    operand: Operand,
}

impl FilterToCalcRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Filter),
        }
    }
}

impl Default for FilterToCalcRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterToCalcRule {
    fn description(&self) -> &str {
        "FilterToCalcRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let filter = Arc::clone(call.rel(0));
        let AlgKind::Filter { condition } = filter.kind() else {
            return Ok(());
        };
        let input = Arc::clone(filter.input(0));
        let program = RexProgram::from_filter(input.row_type(), condition);
        let calc = call.builder().push(input).calc(program).build();
        call.transform_to(calc);
        Ok(())
    }
}

/// Convert a `Project` into a `Calc`.
pub struct ProjectToCalcRule {
    operand: Operand,
}

impl ProjectToCalcRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Project),
        }
    }
}

impl Default for ProjectToCalcRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ProjectToCalcRule {
    fn description(&self) -> &str {
        "ProjectToCalcRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let project = Arc::clone(call.rel(0));
        let AlgKind::Project { exprs } = project.kind() else {
            return Ok(());
        };
        let input = Arc::clone(project.input(0));
        let program = RexProgram::from_project(input.row_type(), exprs, &project.row_type().field_names());
        let calc = call.builder().push(input).calc(program).build();
        call.transform_to(calc);
        Ok(())
    }
}

/// Merge a `Calc` into the `Calc` below it.
pub struct CalcMergeRule {
    operand: Operand,
}

impl CalcMergeRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Calc).input(Operand::of(AlgKindTag::Calc)),
        }
    }
}

impl Default for CalcMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for CalcMergeRule {
    fn description(&self) -> &str {
        "CalcMergeRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let (top, bottom) = (Arc::clone(call.rel(0)), Arc::clone(call.rel(1)));
        let (AlgKind::Calc { program: top_program }, AlgKind::Calc { program: bottom_program }) =
            (top.kind(), bottom.kind())
        else {
            return Ok(());
        };
        if top_program.contains_windowed_agg() {
            debug!("CalcMergeRule declined: windowed aggregate in {}", top.digest());
            return Ok(());
        }

        let merged = merge_programs(top_program, bottom_program);
        let demote = merged.normalize() == bottom_program.normalize();
        let calc = call.builder().push(Arc::clone(bottom.input(0))).calc(merged).build();
        call.transform_to(calc);
        if demote {
            call.set_importance(&top, 0.0);
        }
        Ok(())
    }
}

/// Replace a `Calc` whose program is trivial with its input.
pub struct CalcRemoveRule {
    operand: Operand,
}

impl CalcRemoveRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(AlgKindTag::Calc)
                .with_guard(|n| matches!(n.kind(), AlgKind::Calc { program } if program.is_trivial())),
        }
    }
}

impl Default for CalcRemoveRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for CalcRemoveRule {
    fn description(&self) -> &str {
        "CalcRemoveRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let input = Arc::clone(call.rel(0).input(0));
        call.transform_to(input);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{col, emp, fire, fire_outcome};
    use algx_core::alg::{AlgNode, AlgRef};
    use algx_core::rex::{AggKind, Op, RexNode};
    use algx_core::types::DataType;

    fn calc_of(node: &AlgRef) -> &RexProgram {
        match node.kind() {
            AlgKind::Calc { program } => program,
            _ => panic!("expected a calc, got {node}"),
        }
    }

    fn filtered_calc() -> AlgRef {
        let scan = emp();
        let cond = RexNode::call(Op::Gt, vec![col(&scan, 0), RexNode::int_literal(1)]);
        let program = RexProgram::from_filter(scan.row_type(), &cond);
        AlgNode::calc(scan, program)
    }

    #[test]
    fn test_filter_and_project_become_calcs() {
        let scan = emp();
        let cond = RexNode::call(Op::Gt, vec![col(&scan, 0), RexNode::int_literal(1)]);
        let filter = AlgNode::filter(Arc::clone(&scan), cond.clone());
        let results = fire(&FilterToCalcRule::new(), &filter);
        assert_eq!(calc_of(&results[0]).expanded_condition(), Some(cond));

        let project = AlgNode::project(
            Arc::clone(&scan),
            vec![RexNode::call(Op::Plus, vec![col(&scan, 0), col(&scan, 2)])],
            vec!["total".into()],
        );
        let results = fire(&ProjectToCalcRule::new(), &project);
        let program = calc_of(&results[0]);
        assert_eq!(program.expanded_projects()[0].to_string(), "+($0, $2)");
        assert_eq!(results[0].row_type().field_names(), vec!["total"]);
    }

    #[test]
    fn test_merge_composes_programs() {
        let bottom = filtered_calc();
        let top_program = RexProgram::from_project(
            bottom.row_type(),
            &[RexNode::call(Op::Times, vec![col(&bottom, 2), RexNode::int_literal(2)])],
            &["double_dept".to_string()],
        );
        let top = AlgNode::calc(Arc::clone(&bottom), top_program);
        let (results, hints) = fire_outcome(&CalcMergeRule::new(), &top);
        assert_eq!(results.len(), 1);
        assert!(hints.is_empty());
        let merged = calc_of(&results[0]);
        assert_eq!(merged.expanded_projects()[0].to_string(), "*($2, 2)");
        assert_eq!(merged.expanded_condition().map(|c| c.to_string()), Some(">($0, 1)".to_string()));
        assert_eq!(results[0].input(0).digest(), bottom.input(0).digest());
    }

    #[test]
    fn test_identity_top_is_demoted() {
        let bottom = filtered_calc();
        let top = AlgNode::calc(Arc::clone(&bottom), RexProgram::identity(bottom.row_type()));
        let (results, hints) = fire_outcome(&CalcMergeRule::new(), &top);
        assert_eq!(results.len(), 1);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].0.digest(), top.digest());
        assert_eq!(hints[0].1, 0.0);
    }

    #[test]
    fn test_windowed_top_declines() {
        let bottom = filtered_calc();
        let over = RexNode::Over {
            agg: AggKind::Sum,
            operands: vec![col(&bottom, 0)],
            partition_keys: vec![col(&bottom, 2)],
            order_keys: vec![],
            ty: DataType::integer().with_nullable(true),
        };
        let top_program = RexProgram::from_project(bottom.row_type(), &[over], &["running".to_string()]);
        let top = AlgNode::calc(bottom, top_program);
        assert!(fire(&CalcMergeRule::new(), &top).is_empty());
    }

    #[test]
    fn test_trivial_calc_is_removed() {
        let scan = emp();
        let calc = AlgNode::calc(Arc::clone(&scan), RexProgram::identity(scan.row_type()));
        let results = fire(&CalcRemoveRule::new(), &calc);
        assert_eq!(results[0].digest(), scan.digest());
        assert!(CalcRemoveRule::new().operand().match_tree(&filtered_calc()).is_none());
    }
}
