//! # Metadata Queries
//!
//! Rules ask the metadata oracle questions about a node's output that cannot be read
//! off the node itself:
//!
//! - **Row count**: estimated cardinality.
//! - **Column uniqueness**: whether a set of output columns is a key.
//! - **Pulled-up predicates**: conditions known to hold on every output row (for
//!   instance `deptno = 10` below a filter on `deptno = 10`). Sort-key removal uses
//!   these to find columns that are constant.
//!
//! Answers are pure functions of the subtree, so [`DefaultMetadataQuery`] memoizes them
//! by `(query, digest)`. The oracle is read-only from a rule's point of view; rules
//! receive it through their `RuleCall`.

use crate::alg::{AlgKind, AlgNode, JoinType};
use crate::catalog::Catalog;
use crate::predicate::{conjunctions, range_bits, shift, split_join_keys};
use crate::rex::{Op, RexNode};
use crate::stats::{self, Statistics, DEFAULT_ROW_COUNT};
use bit_set::BitSet;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata questions rules may ask about a node.
pub trait MetadataQuery {
    fn row_count(&self, node: &AlgNode) -> f64;

    /// Whether `columns` is a unique key of the node's output. `None` when unknown.
    fn are_columns_unique(&self, node: &AlgNode, columns: &BitSet) -> Option<bool>;

    /// Conjuncts known to hold on every output row, over the node's output fields.
    fn pulled_up_predicates(&self, node: &AlgNode) -> Vec<RexNode>;
}

/// Catalog-backed metadata oracle with per-session memoization.
pub struct DefaultMetadataQuery {
    catalog: Arc<dyn Catalog>,
    rows: RefCell<HashMap<String, f64>>,
    unique: RefCell<HashMap<(String, Vec<usize>), Option<bool>>>,
    predicates: RefCell<HashMap<String, Vec<RexNode>>>,
}

impl DefaultMetadataQuery {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            rows: RefCell::new(HashMap::new()),
            unique: RefCell::new(HashMap::new()),
            predicates: RefCell::new(HashMap::new()),
        }
    }

    /// Number of memoized answers.
    pub fn cached(&self) -> usize {
        self.rows.borrow().len() + self.unique.borrow().len() + self.predicates.borrow().len()
    }

    fn entity_stats(&self, node: &AlgNode) -> Option<Statistics> {
        match node.kind() {
            AlgKind::Scan { entity } => self.catalog.entity_stats(entity),
            _ => None,
        }
    }

    fn compute_row_count(&self, node: &AlgNode) -> f64 {
        match node.kind() {
            AlgKind::Scan { .. } => self
                .entity_stats(node)
                .map_or(DEFAULT_ROW_COUNT, |s| s.row_count),
            AlgKind::Values { tuples } => tuples.len() as f64,
            AlgKind::Filter { condition } => {
                let input = node.input(0);
                stats::derive_filter_rows(
                    self.row_count(input),
                    stats::estimate_selectivity(condition, self.entity_stats(input).as_ref()),
                )
            }
            AlgKind::Calc { program } => {
                let input = node.input(0);
                let rows = self.row_count(input);
                match program.expanded_condition() {
                    Some(c) => stats::derive_filter_rows(
                        rows,
                        stats::estimate_selectivity(&c, self.entity_stats(input).as_ref()),
                    ),
                    None => rows,
                }
            }
            AlgKind::Project { .. } | AlgKind::Modify { .. } => self.row_count(node.input(0)),
            AlgKind::Join { join_type, condition } => {
                let (left, right) = (node.input(0), node.input(1));
                let rows = self.join_rows(left, right, condition);
                match join_type {
                    JoinType::Inner => rows,
                    JoinType::Left => rows.max(self.row_count(left)),
                    JoinType::Right => rows.max(self.row_count(right)),
                    JoinType::Full => rows.max(self.row_count(left)).max(self.row_count(right)),
                }
            }
            AlgKind::SemiJoin { condition, .. } => {
                let left = node.input(0);
                self.join_rows(left, node.input(1), condition).min(self.row_count(left))
            }
            AlgKind::MultiJoin { .. } => node
                .inputs()
                .iter()
                .map(|i| self.row_count(i))
                .product::<f64>()
                .max(1.0),
            AlgKind::Aggregate { group_set, .. } => {
                let input = node.input(0);
                let rows = self.row_count(input);
                let ndvs: Vec<f64> = match self.entity_stats(input) {
                    Some(s) => group_set.iter().map(|&g| s.distinct_count(g)).collect(),
                    None => group_set.iter().map(|_| rows).collect(),
                };
                stats::derive_aggregate_rows(rows, &ndvs)
            }
            AlgKind::Sort { offset, fetch, .. } => {
                let rows = (self.row_count(node.input(0)) - offset.unwrap_or(0) as f64).max(0.0);
                fetch.map_or(rows, |f| rows.min(f as f64))
            }
            AlgKind::Union { .. } => node.inputs().iter().map(|i| self.row_count(i)).sum(),
        }
    }

    fn join_rows(&self, left: &AlgNode, right: &AlgNode, condition: &RexNode) -> f64 {
        let (left_keys, right_keys, residual) = split_join_keys(left.field_count(), condition);
        let left_stats = self.entity_stats(left);
        let right_stats = self.entity_stats(right);
        let left_rows = self.row_count(left);
        let right_rows = self.row_count(right);
        let ndvs: Vec<(f64, f64)> = left_keys
            .iter()
            .zip(&right_keys)
            .map(|(&l, &r)| {
                (
                    left_stats.as_ref().map_or(left_rows, |s| s.distinct_count(l)),
                    right_stats.as_ref().map_or(right_rows, |s| s.distinct_count(r)),
                )
            })
            .collect();
        let residual_selectivity = residual
            .iter()
            .map(|c| stats::estimate_selectivity(c, None))
            .product();
        stats::derive_join_rows(left_rows, right_rows, &ndvs, residual_selectivity)
    }

    fn compute_unique(&self, node: &AlgNode, columns: &BitSet) -> Option<bool> {
        match node.kind() {
            AlgKind::Scan { entity } => {
                let keys = self.catalog.unique_keys(entity);
                if keys.is_empty() {
                    return None;
                }
                Some(keys.iter().any(|k| k.iter().all(|c| columns.contains(*c))))
            }
            AlgKind::Values { tuples } => {
                if tuples.len() <= 1 {
                    return Some(true);
                }
                let mut seen = std::collections::HashSet::new();
                Some(tuples.iter().all(|t| {
                    let key: Vec<_> = columns.iter().map(|c| &t[c]).collect();
                    seen.insert(key)
                }))
            }
            AlgKind::Filter { .. } | AlgKind::Sort { .. } | AlgKind::SemiJoin { .. } => {
                self.are_columns_unique(node.input(0), columns)
            }
            AlgKind::Project { exprs } => {
                let mut mapped = BitSet::new();
                for c in columns.iter() {
                    mapped.insert(exprs[c].as_input_ref()?);
                }
                self.are_columns_unique(node.input(0), &mapped)
            }
            AlgKind::Calc { program } => {
                let n = program.input_count();
                let mut mapped = BitSet::new();
                for c in columns.iter() {
                    let p = program.project_list()[c];
                    if p >= n {
                        return None;
                    }
                    mapped.insert(p);
                }
                self.are_columns_unique(node.input(0), &mapped)
            }
            AlgKind::Aggregate { group_set, .. } => {
                let groups = range_bits(0, group_set.len());
                Some(groups.is_subset(columns))
            }
            _ => None,
        }
    }

    fn compute_predicates(&self, node: &AlgNode) -> Vec<RexNode> {
        match node.kind() {
            AlgKind::Filter { condition } => {
                let mut preds = self.pulled_up_predicates(node.input(0));
                for c in conjunctions(condition) {
                    if !preds.contains(&c) {
                        preds.push(c);
                    }
                }
                preds
            }
            AlgKind::Calc { program } => {
                let mut below = self.pulled_up_predicates(node.input(0));
                if let Some(c) = program.expanded_condition() {
                    below.extend(conjunctions(&c));
                }
                remap_through(&below, &program.expanded_projects())
            }
            AlgKind::Project { exprs } => {
                let below = self.pulled_up_predicates(node.input(0));
                remap_through(&below, exprs)
            }
            AlgKind::Sort { .. } | AlgKind::SemiJoin { .. } => self.pulled_up_predicates(node.input(0)),
            AlgKind::Join { join_type, .. } => {
                let left_count = node.input(0).field_count();
                let mut preds = Vec::new();
                if !join_type.generates_nulls_on_left() {
                    preds.extend(self.pulled_up_predicates(node.input(0)));
                }
                if !join_type.generates_nulls_on_right() {
                    preds.extend(
                        self.pulled_up_predicates(node.input(1))
                            .iter()
                            .map(|p| shift(p, 0, left_count as isize)),
                    );
                }
                preds
            }
            AlgKind::Aggregate { group_set, .. } => self
                .pulled_up_predicates(node.input(0))
                .iter()
                .filter(|p| p.input_bits().iter().all(|i| group_set.contains(&i)))
                .map(|p| {
                    p.map_inputs(|i, ty| {
                        let pos = group_set.iter().position(|&g| g == i).unwrap_or(i);
                        RexNode::input_ref(pos, ty)
                    })
                    .into_owned()
                })
                .collect(),
            AlgKind::Values { tuples } if tuples.len() == 1 => tuples[0]
                .iter()
                .enumerate()
                .filter(|(_, lit)| !lit.value.is_null())
                .map(|(i, lit)| {
                    RexNode::call(
                        Op::Eq,
                        vec![
                            RexNode::input_ref(i, node.row_type().field(i).ty),
                            RexNode::Literal(lit.clone()),
                        ],
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Re-express predicates over a projection's input as predicates over its output.
///
/// Only predicates of the form `input_field = literal` survive, and only when the
/// field is projected unchanged.
fn remap_through(below: &[RexNode], projects: &[RexNode]) -> Vec<RexNode> {
    let mut out = Vec::new();
    for p in below {
        let (Some(field), Some(lit)) = constant_binding(p) else {
            continue;
        };
        for (pos, e) in projects.iter().enumerate() {
            if e.as_input_ref() == Some(field) {
                let pred = RexNode::call(
                    Op::Eq,
                    vec![RexNode::input_ref(pos, e.ty()), lit.clone()],
                );
                if !out.contains(&pred) {
                    out.push(pred);
                }
            }
        }
    }
    out
}

/// `(field, literal)` of a `field = literal` predicate.
pub fn constant_binding(p: &RexNode) -> (Option<usize>, Option<RexNode>) {
    if !p.is_a(&Op::Eq) {
        return (None, None);
    }
    match p.operands() {
        [a, b] if b.is_literal() => (a.as_input_ref(), Some(b.clone())),
        [a, b] if a.is_literal() => (b.as_input_ref(), Some(a.clone())),
        _ => (None, None),
    }
}

impl MetadataQuery for DefaultMetadataQuery {
    fn row_count(&self, node: &AlgNode) -> f64 {
        if let Some(&rows) = self.rows.borrow().get(node.digest()) {
            return rows;
        }
        let rows = self.compute_row_count(node);
        self.rows.borrow_mut().insert(node.digest().to_string(), rows);
        rows
    }

    fn are_columns_unique(&self, node: &AlgNode, columns: &BitSet) -> Option<bool> {
        let key = (node.digest().to_string(), columns.iter().collect::<Vec<_>>());
        if let Some(&answer) = self.unique.borrow().get(&key) {
            return answer;
        }
        let answer = self.compute_unique(node, columns);
        self.unique.borrow_mut().insert(key, answer);
        answer
    }

    fn pulled_up_predicates(&self, node: &AlgNode) -> Vec<RexNode> {
        if let Some(preds) = self.predicates.borrow().get(node.digest()) {
            return preds.clone();
        }
        let preds = self.compute_predicates(node);
        self.predicates
            .borrow_mut()
            .insert(node.digest().to_string(), preds.clone());
        preds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::EntityRef;
    use crate::catalog::InMemoryCatalog;
    use crate::stats::ColumnStatistics;
    use crate::types::{DataType, RowType};

    fn emp() -> EntityRef {
        EntityRef::new(1, "hr", "emp", "mem")
    }

    fn emp_scan() -> crate::alg::AlgRef {
        AlgNode::scan(
            emp(),
            RowType::from_pairs([
                ("empno", DataType::integer()),
                ("deptno", DataType::integer()),
                ("sal", DataType::integer()),
            ]),
        )
    }

    fn oracle() -> DefaultMetadataQuery {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_entity(&emp(), Statistics::new(1000.0).with_column(1, ColumnStatistics::new(10.0, 0.0)));
        catalog.add_unique_key(&emp(), vec![0]);
        DefaultMetadataQuery::new(Arc::new(catalog))
    }

    fn deptno_is_10() -> RexNode {
        RexNode::call(Op::Eq, vec![RexNode::input_ref(1, DataType::integer()), RexNode::int_literal(10)])
    }

    #[test]
    fn test_row_count_is_memoized() {
        let mq = oracle();
        let filter = AlgNode::filter(emp_scan(), deptno_is_10());
        assert_eq!(mq.row_count(&filter), 100.0);
        let cached = mq.cached();
        assert_eq!(mq.row_count(&AlgNode::filter(emp_scan(), deptno_is_10())), 100.0);
        assert_eq!(mq.cached(), cached);
    }

    #[test]
    fn test_uniqueness_through_project() {
        let mq = oracle();
        let project = AlgNode::project(
            emp_scan(),
            vec![RexNode::input_ref(2, DataType::integer()), RexNode::input_ref(0, DataType::integer())],
            vec!["sal".into(), "empno".into()],
        );
        let empno: BitSet = [1].into_iter().collect();
        let sal: BitSet = [0].into_iter().collect();
        assert_eq!(mq.are_columns_unique(&project, &empno), Some(true));
        assert_eq!(mq.are_columns_unique(&project, &sal), Some(false));
    }

    #[test]
    fn test_predicates_pulled_through_project() {
        let mq = oracle();
        let filter = AlgNode::filter(emp_scan(), deptno_is_10());
        let project = AlgNode::project(
            filter,
            vec![RexNode::input_ref(0, DataType::integer()), RexNode::input_ref(1, DataType::integer())],
            vec!["empno".into(), "deptno".into()],
        );
        assert_eq!(mq.pulled_up_predicates(&project), vec![deptno_is_10()]);

        let dropped = AlgNode::project(
            AlgNode::filter(emp_scan(), deptno_is_10()),
            vec![RexNode::input_ref(0, DataType::integer())],
            vec!["empno".into()],
        );
        assert!(mq.pulled_up_predicates(&dropped).is_empty());
    }

    #[test]
    fn test_outer_join_drops_null_generating_predicates() {
        let mq = oracle();
        let left = AlgNode::filter(emp_scan(), deptno_is_10());
        let right = AlgNode::filter(emp_scan(), deptno_is_10());
        let join = AlgNode::join(left, right, JoinType::Left, RexNode::bool_literal(true));
        let preds = mq.pulled_up_predicates(&join);
        assert_eq!(preds, vec![deptno_is_10()]);
    }
}
