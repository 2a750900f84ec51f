//! Program composition tests.
//!
//! Stacks two randomly generated programs and checks that merging them yields a
//! program over the bottom's input with exactly the top's output row type, and that
//! the conditions of both programs survive.

use algx_core::program::{merge_programs, RexProgram, RexProgramBuilder};
use algx_core::rex::{Op, RexNode};
use algx_core::types::{DataType, RowType};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn input_row_type(width: usize) -> RowType {
    RowType::from_pairs((0..width).map(|i| (format!("c{i}"), DataType::integer())))
}

/// Integer arithmetic over `width` input columns.
fn int_expr(width: usize) -> impl Strategy<Value = RexNode> {
    let leaf = prop_oneof![
        (0..width).prop_map(|i| RexNode::input_ref(i, DataType::integer())),
        (-5i64..5).prop_map(RexNode::int_literal),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        (
            inner.clone(),
            inner,
            prop_oneof![Just(Op::Plus), Just(Op::Minus), Just(Op::Times)],
        )
            .prop_map(|(a, b, op)| RexNode::call(op, vec![a, b]))
    })
}

fn program(input: &RowType, projects: &[RexNode], condition: Option<RexNode>) -> RexProgram {
    let mut builder = RexProgramBuilder::new(input.clone());
    for (i, p) in projects.iter().enumerate() {
        builder.add_project(p, format!("p{i}"));
    }
    if let Some(c) = condition {
        builder.add_condition(&c);
    }
    builder.build()
}

fn positive(e: RexNode) -> RexNode {
    RexNode::call(Op::Gt, vec![e, RexNode::int_literal(0)])
}

/// Bottom program over 3 columns producing 1..4 fields, top program over those.
fn stacked() -> impl Strategy<Value = (RexProgram, RexProgram)> {
    (1usize..4)
        .prop_flat_map(|bottom_width| {
            (
                prop::collection::vec(int_expr(3), bottom_width),
                prop::option::of(int_expr(3)),
                prop::collection::vec(int_expr(bottom_width), 1..4),
                prop::option::of(int_expr(bottom_width)),
            )
        })
        .prop_map(|(bottom_projects, bottom_cond, top_projects, top_cond)| {
            let bottom = program(&input_row_type(3), &bottom_projects, bottom_cond.map(positive));
            let top = program(bottom.output_row_type(), &top_projects, top_cond.map(positive));
            (top, bottom)
        })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn merged_program_keeps_top_row_type((top, bottom) in stacked()) {
        let merged = merge_programs(&top, &bottom);
        prop_assert_eq!(merged.output_row_type(), top.output_row_type());
        prop_assert_eq!(merged.input_row_type(), bottom.input_row_type());
        prop_assert_eq!(merged.project_list().len(), top.project_list().len());
        prop_assert_eq!(
            merged.condition().is_some(),
            top.condition().is_some() || bottom.condition().is_some()
        );
    }

    #[test]
    fn merged_program_reads_only_bottom_inputs((top, bottom) in stacked()) {
        let merged = merge_programs(&top, &bottom);
        let width = bottom.input_row_type().field_count();
        for e in merged.expanded_projects().iter().chain(merged.expanded_condition().iter()) {
            prop_assert!(e.input_bits().iter().all(|i| i < width));
        }
    }
}

// ---------------------------------------------------------------------------
// Examples
// ---------------------------------------------------------------------------

#[test]
fn test_merge_substitutes_bottom_projects() {
    let input = input_row_type(2);
    let a = RexNode::input_ref(0, DataType::integer());
    let b = RexNode::input_ref(1, DataType::integer());
    // bottom: x = a + b, keep rows with a > 0
    let bottom = program(&input, &[RexNode::call(Op::Plus, vec![a.clone(), b])], Some(positive(a.clone())));
    // top: y = x * 2, keep rows with x > 0
    let x = RexNode::input_ref(0, DataType::integer());
    let top = program(
        bottom.output_row_type(),
        &[RexNode::call(Op::Times, vec![x.clone(), RexNode::int_literal(2)])],
        Some(positive(x)),
    );

    let merged = merge_programs(&top, &bottom);
    assert_eq!(merged.expanded_projects()[0].to_string(), "*(+($0, $1), 2)");
    assert_eq!(
        merged.expanded_condition().unwrap().to_string(),
        "AND(>($0, 0), >(+($0, $1), 0))"
    );
}

#[test]
fn test_merge_with_identity_bottom_is_top() {
    let input = input_row_type(3);
    let top = program(
        &input,
        &[RexNode::input_ref(2, DataType::integer())],
        Some(positive(RexNode::input_ref(0, DataType::integer()))),
    );
    let merged = merge_programs(&top, &RexProgram::identity(&input));
    assert_eq!(merged.normalize(), top.normalize());
}
