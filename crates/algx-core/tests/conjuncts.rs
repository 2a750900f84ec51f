//! Conjunct decomposition round-trip tests.

use algx_core::predicate::{compose_conjunction, conjunctions, disjunctions};
use algx_core::rex::{Op, RexLiteral, RexNode, ScalarValue};
use algx_core::types::DataType;
use proptest::prelude::*;

/// A comparison of an input column against a small constant.
fn atom() -> impl Strategy<Value = RexNode> {
    (
        0usize..4,
        0i64..5,
        prop_oneof![Just(Op::Eq), Just(Op::Lt), Just(Op::Gt)],
    )
        .prop_map(|(i, v, op)| RexNode::call(op, vec![RexNode::input_ref(i, DataType::integer()), RexNode::int_literal(v)]))
}

fn distinct(atoms: Vec<RexNode>) -> Vec<RexNode> {
    let mut out: Vec<RexNode> = Vec::new();
    for a in atoms {
        if !out.contains(&a) {
            out.push(a);
        }
    }
    out
}

/// Evaluates the boolean shapes `atom` produces over an integer row.
fn eval(e: &RexNode, row: &[i64]) -> bool {
    match e {
        RexNode::Literal(lit) => matches!(lit.value, ScalarValue::Bool(true)),
        RexNode::Call { op: Op::And, operands, .. } => operands.iter().all(|o| eval(o, row)),
        RexNode::Call { op: Op::Or, operands, .. } => operands.iter().any(|o| eval(o, row)),
        RexNode::Call { op, operands, .. } => {
            let v = |o: &RexNode| match o {
                RexNode::InputRef { index, .. } => row[*index],
                RexNode::Literal(RexLiteral { value: ScalarValue::Int64(v), .. }) => *v,
                other => panic!("unexpected operand {}", other),
            };
            let (l, r) = (v(&operands[0]), v(&operands[1]));
            match op {
                Op::Eq => l == r,
                Op::Lt => l < r,
                Op::Gt => l > r,
                other => panic!("unexpected operator {:?}", other),
            }
        }
        other => panic!("unexpected expression {}", other),
    }
}

proptest! {
    #[test]
    fn compose_keeps_truth_value_with_repeated_conjuncts(
        atoms in prop::collection::vec(atom(), 1..6),
        repeats in prop::collection::vec(0usize..6, 0..4),
        row in prop::collection::vec(0i64..5, 4),
    ) {
        let mut with_repeats = atoms.clone();
        for i in repeats {
            with_repeats.push(atoms[i % atoms.len()].clone());
        }
        let nested = RexNode::call(Op::And, with_repeats.clone());
        let composed = compose_conjunction(with_repeats.clone());
        let expected = with_repeats.iter().all(|a| eval(a, &row));
        prop_assert_eq!(eval(&composed, &row), expected);
        prop_assert_eq!(eval(&compose_conjunction(conjunctions(&nested)), &row), expected);
    }

    #[test]
    fn compose_then_split_returns_distinct_conjuncts(atoms in prop::collection::vec(atom(), 0..8)) {
        let expected = distinct(atoms.clone());
        prop_assert_eq!(conjunctions(&compose_conjunction(atoms)), expected);
    }

    #[test]
    fn split_then_compose_is_identity(atoms in prop::collection::vec(atom(), 1..8)) {
        let e = compose_conjunction(distinct(atoms));
        prop_assert_eq!(compose_conjunction(conjunctions(&e)), e);
    }

    #[test]
    fn nested_ands_flatten(a in prop::collection::vec(atom(), 2..4), b in prop::collection::vec(atom(), 2..4)) {
        let a = distinct(a);
        let b: Vec<RexNode> = distinct(b).into_iter().filter(|x| !a.contains(x)).collect();
        let nested = RexNode::call(Op::And, vec![compose_conjunction(a.clone()), compose_conjunction(b.clone())]);
        let flat: Vec<RexNode> = a.into_iter().chain(b).collect();
        prop_assert_eq!(conjunctions(&nested), flat);
    }
}

#[test]
fn test_true_and_false_identities() {
    assert!(conjunctions(&RexNode::bool_literal(true)).is_empty());
    assert!(disjunctions(&RexNode::bool_literal(false)).is_empty());
    assert_eq!(compose_conjunction(vec![]), RexNode::bool_literal(true));

    let x = RexNode::call(Op::IsNull, vec![RexNode::input_ref(0, DataType::integer().with_nullable(true))]);
    assert_eq!(conjunctions(&x), vec![x.clone()]);
    assert_eq!(compose_conjunction(vec![x.clone()]), x);
    assert_eq!(
        compose_conjunction(vec![x, RexNode::bool_literal(false)]),
        RexNode::bool_literal(false)
    );
}
