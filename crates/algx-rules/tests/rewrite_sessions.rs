//! Planner sessions over the built-in rule sets.
//!
//! Each test registers a hand-built tree as the root, runs the planner to a fixed
//! point and inspects either the cheapest plan or the root set's members.

use algx_core::alg::{AggregateCall, AlgKind, AlgKindTag, AlgNode, AlgRef, EntityRef, JoinType};
use algx_core::catalog::InMemoryCatalog;
use algx_core::metadata::DefaultMetadataQuery;
use algx_core::planner::{Planner, SearchConfig, StopReason};
use algx_core::predicate::conjunctions;
use algx_core::rex::{AggKind, Op, RexLiteral, RexNode, ScalarValue};
use algx_core::rule::RuleSet;
use algx_core::stats::Statistics;
use algx_core::types::{DataType, RowType};
use algx_rules::{calc_rule_set, default_rule_set, multi_join_rule_set, FilterJoinRule};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("algx_core=debug".parse().unwrap())
                .add_directive("algx_rules=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

fn entity(name: &str) -> EntityRef {
    EntityRef::new(1, "hr", name, "mem")
}

/// `hr.<name>(id INTEGER, name VARCHAR, dept INTEGER)`.
fn scan(name: &str) -> AlgRef {
    AlgNode::scan(
        entity(name),
        RowType::from_pairs([
            ("id", DataType::integer()),
            ("name", DataType::varchar()),
            ("dept", DataType::integer()),
        ]),
    )
}

fn col(node: &AlgRef, i: usize) -> RexNode {
    RexNode::input_ref(i, node.row_type().field(i).ty)
}

fn cmp(op: Op, node: &AlgRef, i: usize, v: i64) -> RexNode {
    RexNode::call(op, vec![col(node, i), RexNode::int_literal(v)])
}

fn planner(rules: RuleSet) -> Planner {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_entity(&entity("emp"), Statistics::new(10_000.0));
    catalog.add_entity(&entity("dept"), Statistics::new(50.0));
    let mq = DefaultMetadataQuery::new(Arc::new(catalog));
    Planner::new(rules, Box::new(mq), SearchConfig::default()).unwrap()
}

/// Run the default rules to a fixed point and return the planner.
fn explore(root: AlgRef) -> Planner {
    init_tracing();
    let mut planner = planner(default_rule_set().unwrap());
    planner.set_root(root);
    let outcome = planner.run().unwrap();
    assert_eq!(outcome.stop_reason, StopReason::FixedPoint);
    planner
}

fn best(root: AlgRef) -> AlgRef {
    explore(root).find_best().unwrap()
}

fn root_members(planner: &Planner) -> Vec<AlgRef> {
    planner.set(planner.root().unwrap()).members().to_vec()
}

// ---------------------------------------------------------------------------
// Declining rules leave the search space alone
// ---------------------------------------------------------------------------

/// Trees on which default rules match but decline, or match nothing at all.
fn declining_root(case: usize, v: i64) -> AlgRef {
    let emp = scan("emp");
    match case {
        // Right-only conjunct above a LEFT join; the ON clause is a pure equi-join.
        0 => {
            let join = emp_join_dept(JoinType::Left);
            let field = if v % 2 == 0 { 3 } else { 5 };
            AlgNode::filter(Arc::clone(&join), cmp(Op::Gt, &join, field, v))
        }
        // Sort keys that nothing below binds to a constant.
        1 => {
            let key = if v % 2 == 0 { 0 } else { 2 };
            AlgNode::sort(
                emp,
                algx_core::traits::Collation(vec![algx_core::traits::FieldCollation::asc(key)]),
                None,
                None,
            )
        }
        // Grand total whose aggregate kind does not fold over empty input.
        2 => {
            let empty = AlgNode::values(vec![], RowType::from_pairs([("x", DataType::integer())]));
            AlgNode::aggregate(
                empty,
                vec![],
                vec![AggregateCall::new(AggKind::Avg, vec![0], false, DataType::integer().with_nullable(true), "a")],
            )
        }
        // Grouped aggregate over empty values.
        3 => {
            let empty = AlgNode::values(vec![], RowType::from_pairs([("x", DataType::integer())]));
            AlgNode::aggregate(
                empty,
                vec![0],
                vec![AggregateCall::new(AggKind::Count, vec![], false, DataType::bigint(), "c")],
            )
        }
        // Filter above a windowed projection.
        4 => {
            let over = RexNode::Over {
                agg: AggKind::Max,
                operands: vec![col(&emp, 0)],
                partition_keys: vec![col(&emp, 2)],
                order_keys: vec![],
                ty: DataType::integer().with_nullable(true),
            };
            let project = AlgNode::project(
                Arc::clone(&emp),
                vec![over, col(&emp, 2), RexNode::call(Op::Plus, vec![col(&emp, 0), RexNode::int_literal(v)])],
                vec!["top_id".into(), "dept".into(), "shifted".into()],
            );
            AlgNode::filter(Arc::clone(&project), cmp(Op::Gt, &project, 1, v))
        }
        // Distinct union of one input, and a union of two.
        5 => AlgNode::union(vec![emp], false),
        _ => AlgNode::union(vec![emp, scan("dept")], v % 2 == 0),
    }
}

proptest! {
    #[test]
    fn declines_register_nothing(case in 0usize..7, v in -100i64..100) {
        let root = declining_root(case, v);

        let mut planner = planner(default_rule_set().unwrap());
        planner.set_root(Arc::clone(&root));
        let before = (planner.node_count(), planner.set_count());
        let outcome = planner.run().unwrap();

        prop_assert_eq!((outcome.nodes, outcome.sets), before);
        let best = planner.find_best().unwrap();
        prop_assert_eq!(best.digest(), root.digest());
    }

    #[test]
    fn filters_on_a_scan_register_nothing(field in prop::sample::select(vec![0usize, 2]), v in -100i64..100, gt in any::<bool>()) {
        let emp = scan("emp");
        let op = if gt { Op::Gt } else { Op::Lt };
        let root = AlgNode::filter(Arc::clone(&emp), cmp(op, &emp, field, v));

        let mut planner = planner(default_rule_set().unwrap());
        planner.set_root(Arc::clone(&root));
        let before = (planner.node_count(), planner.set_count());
        let outcome = planner.run().unwrap();

        prop_assert_eq!((outcome.nodes, outcome.sets), before);
    }
}

// ---------------------------------------------------------------------------
// Simplification
// ---------------------------------------------------------------------------

#[test]
fn test_filter_merge_end_to_end() {
    let emp = scan("emp");
    let (c1, c2) = (cmp(Op::Gt, &emp, 0, 100), cmp(Op::Eq, &emp, 2, 10));
    let root = AlgNode::filter(AlgNode::filter(Arc::clone(&emp), c2.clone()), c1.clone());

    let plan = best(root);
    assert_eq!(plan.tag(), AlgKindTag::Filter);
    assert_eq!(plan.input(0).digest(), emp.digest());
    assert_eq!(plan.row_type(), emp.row_type());
    let got: HashSet<RexNode> = plan.condition().map(conjunctions).unwrap_or_default().into_iter().collect();
    assert_eq!(got, HashSet::from([c1, c2]));
}

#[test]
fn test_trivial_projections_collapse_to_scan() {
    let emp = scan("emp");
    let once = AlgNode::project(
        Arc::clone(&emp),
        (0..3).map(|i| col(&emp, i)).collect(),
        vec!["a".into(), "b".into(), "c".into()],
    );
    let twice = AlgNode::project(
        Arc::clone(&once),
        (0..3).map(|i| col(&once, i)).collect(),
        vec!["x".into(), "y".into(), "z".into()],
    );

    assert_eq!(best(Arc::clone(&once)).digest(), emp.digest());
    assert_eq!(best(twice).digest(), emp.digest());
}

#[test]
fn test_union_of_one() {
    let emp = scan("emp");
    assert_eq!(best(AlgNode::union(vec![Arc::clone(&emp)], true)).digest(), emp.digest());

    let distinct = AlgNode::union(vec![Arc::clone(&emp)], false);
    assert_eq!(best(Arc::clone(&distinct)).digest(), distinct.digest());
}

#[test]
fn test_aggregates_over_empty_values_fold() {
    let empty = AlgNode::values(vec![], RowType::from_pairs([("x", DataType::integer())]));
    let aggregate = AlgNode::aggregate(
        empty,
        vec![],
        vec![
            AggregateCall::new(AggKind::Count, vec![], false, DataType::bigint(), "c"),
            AggregateCall::new(AggKind::Sum, vec![0], false, DataType::integer().with_nullable(true), "s"),
        ],
    );
    let folded = AlgNode::values(
        vec![vec![
            RexLiteral::new(ScalarValue::Int64(0), DataType::bigint()),
            RexLiteral::null(DataType::integer()),
        ]],
        aggregate.row_type().clone(),
    );

    let planner = explore(Arc::clone(&aggregate));
    assert!(planner.is_equivalent(&aggregate, &folded));
}

#[test]
fn test_constant_sort_key_is_dropped() {
    let emp = scan("emp");
    let filter = AlgNode::filter(Arc::clone(&emp), cmp(Op::Eq, &emp, 2, 10));
    let sort = AlgNode::sort(
        Arc::clone(&filter),
        algx_core::traits::Collation(vec![algx_core::traits::FieldCollation::asc(2)]),
        None,
        None,
    );
    assert_eq!(best(sort).digest(), filter.digest());
}

// ---------------------------------------------------------------------------
// Pushdown null-safety
// ---------------------------------------------------------------------------

fn emp_join_dept(join_type: JoinType) -> AlgRef {
    let (emp, dept) = (scan("emp"), scan("dept"));
    let on = RexNode::call(Op::Eq, vec![col(&emp, 2), RexNode::input_ref(3, DataType::integer())]);
    AlgNode::join(emp, dept, join_type, on)
}

#[test]
fn test_right_only_filter_stays_above_left_join() {
    let join = emp_join_dept(JoinType::Left);
    let root = AlgNode::filter(Arc::clone(&join), cmp(Op::Gt, &join, 3, 5));
    let planner = explore(Arc::clone(&root));

    let members = root_members(&planner);
    assert!(members.iter().all(|m| m.tag() == AlgKindTag::Filter), "{members:?}");
    assert_eq!(planner.find_best().unwrap().digest(), root.digest());
}

#[test]
fn test_right_only_filter_enters_inner_join() {
    let join = emp_join_dept(JoinType::Inner);
    let root = AlgNode::filter(Arc::clone(&join), cmp(Op::Gt, &join, 3, 5));
    let planner = explore(root);

    let pushed = root_members(&planner)
        .into_iter()
        .find(|m| m.tag() == AlgKindTag::Join)
        .expect("no join alternative in the root set");
    assert_eq!(pushed.input(0).tag(), AlgKindTag::Scan);
    assert_eq!(
        pushed.input(1).condition().map(ToString::to_string),
        Some(">($0, 5)".to_string())
    );
}

// ---------------------------------------------------------------------------
// Opt-in rule sets
// ---------------------------------------------------------------------------

#[test]
fn test_calc_rules_fuse_filter_and_project() {
    init_tracing();
    let emp = scan("emp");
    let filter = AlgNode::filter(Arc::clone(&emp), cmp(Op::Gt, &emp, 0, 1));
    let project = AlgNode::project(
        Arc::clone(&filter),
        vec![RexNode::call(Op::Plus, vec![col(&filter, 2), RexNode::int_literal(1)])],
        vec!["next_dept".into()],
    );

    let mut planner = planner(calc_rule_set().unwrap());
    planner.set_root(project);
    planner.run().unwrap();
    let plan = planner.find_best().unwrap();

    let AlgKind::Calc { program } = plan.kind() else {
        panic!("expected a single calc, got\n{}", plan.explain());
    };
    assert_eq!(plan.input(0).digest(), emp.digest());
    assert_eq!(program.expanded_projects()[0].to_string(), "+($2, 1)");
    assert_eq!(program.expanded_condition().map(|c| c.to_string()), Some(">($0, 1)".to_string()));
}

#[test]
fn test_multi_join_is_explored_but_never_chosen() {
    init_tracing();
    let join = emp_join_dept(JoinType::Inner);
    let mut planner = planner(multi_join_rule_set().unwrap());
    planner.set_root(Arc::clone(&join));
    planner.run().unwrap();

    assert!(root_members(&planner).iter().any(|m| m.tag() == AlgKindTag::MultiJoin));
    assert_eq!(planner.find_best().unwrap().digest(), join.digest());
}

#[test]
fn test_smart_join_simplification_composes_with_calc_rules() {
    init_tracing();
    let join = emp_join_dept(JoinType::Left);
    let filter = AlgNode::filter(Arc::clone(&join), cmp(Op::Gt, &join, 3, 2));
    let dept_id = AlgNode::project(Arc::clone(&filter), vec![col(&filter, 3)], vec!["d".into()]);
    let root = AlgNode::project(
        Arc::clone(&dept_id),
        vec![RexNode::call(Op::Plus, vec![col(&dept_id, 0), RexNode::int_literal(1)])],
        vec!["next".into()],
    );

    let rules = calc_rule_set().unwrap().with(Arc::new(FilterJoinRule::smart())).unwrap();
    let mut planner = planner(rules);
    planner.set_root(Arc::clone(&root));
    let outcome = planner.run().unwrap();
    assert_eq!(outcome.stop_reason, StopReason::FixedPoint);

    let filter_set = planner.set(planner.set_of(&filter).unwrap());
    assert!(filter_set.members().iter().any(|m| m.tag() == AlgKindTag::Project));
    for member in filter_set.members() {
        assert!(member.row_type().equals_sans_names(filter.row_type()), "{member}");
    }
    assert_eq!(planner.find_best().unwrap().row_type(), root.row_type());
}
