//! # Tree Builder (`AlgBuilder`)
//!
//! A stack-based builder for relational-algebra trees. Relational methods pop their
//! inputs off the stack and push the new node; scalar helpers such as
//! [`AlgBuilder::field`] build expressions against the nodes currently on the stack.
//!
//! ```text
//! builder.scan(emp, emp_type)
//!        .filter([cond])
//!        .project(exprs, names)
//!        .build()          // -> Project(Filter(Scan))
//! ```
//!
//! Row types are derived by the node constructors, so every tree the builder produces
//! is well-typed by construction. With [`BuilderConfig::simplify`] set, the builder
//! skips nodes that would not change anything (a TRUE filter, an identity projection,
//! an unordered sort without offset or fetch).
//!
//! Builders are cheap and single-use. Rules get a fresh one per call from the rule's
//! [`AlgBuilderFactory`].

use crate::alg::{AggregateCall, AlgNode, AlgRef, EntityRef, JoinType, ModifyOperation};
use crate::predicate::{compose_conjunction, split_join_keys};
use crate::program::RexProgram;
use crate::rex::{Op, RexLiteral, RexNode, ScalarValue};
use crate::traits::Collation;
use crate::types::{DataType, RowType};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Options for [`AlgBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Skip filters, projections and sorts that would be no-ops.
    pub simplify: bool,
    /// Remove duplicate tuples from `values` input.
    pub dedup_values: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            simplify: true,
            dedup_values: false,
        }
    }
}

/// Creates fresh builders with a fixed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlgBuilderFactory {
    config: BuilderConfig,
}

impl AlgBuilderFactory {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn create(&self) -> AlgBuilder {
        AlgBuilder::new(self.config.clone())
    }
}

/// Stack machine that assembles [`AlgNode`] trees.
#[derive(Debug, Default)]
pub struct AlgBuilder {
    config: BuilderConfig,
    stack: Vec<AlgRef>,
}

impl AlgBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
        }
    }

    /// Number of nodes on the stack.
    pub fn size(&self) -> usize {
        self.stack.len()
    }

    /// The top of the stack.
    ///
    /// Panics if the stack is empty.
    pub fn peek(&self) -> &AlgRef {
        self.peek_at(0)
    }

    /// The node `n` positions below the top.
    pub fn peek_at(&self, n: usize) -> &AlgRef {
        let len = self.stack.len();
        assert!(n < len, "builder stack has {len} nodes, cannot peek at {n}");
        &self.stack[len - 1 - n]
    }

    fn pop(&mut self) -> AlgRef {
        match self.stack.pop() {
            Some(node) => node,
            None => panic!("builder stack is empty"),
        }
    }

    /// Pop the finished tree.
    pub fn build(&mut self) -> AlgRef {
        self.pop()
    }

    pub fn push(&mut self, node: AlgRef) -> &mut Self {
        self.stack.push(node);
        self
    }

    pub fn scan(&mut self, entity: EntityRef, row_type: RowType) -> &mut Self {
        self.push(AlgNode::scan(entity, row_type))
    }

    pub fn values(&mut self, tuples: Vec<Vec<RexLiteral>>, row_type: RowType) -> &mut Self {
        let tuples = if self.config.dedup_values {
            tuples.into_iter().unique().collect()
        } else {
            tuples
        };
        self.push(AlgNode::values(tuples, row_type))
    }

    /// Replace the top of the stack with an empty `Values` of the same row type.
    pub fn empty(&mut self) -> &mut Self {
        let input = self.pop();
        self.push(AlgNode::values(vec![], input.row_type().clone()))
    }

    /// Filter the top of the stack by the AND of `conditions`.
    pub fn filter(&mut self, conditions: impl IntoIterator<Item = RexNode>) -> &mut Self {
        let condition = compose_conjunction(conditions.into_iter().collect());
        if self.config.simplify {
            if condition.is_always_true() {
                return self;
            }
            if condition.is_always_false() {
                return self.empty();
            }
        }
        let input = self.pop();
        self.push(AlgNode::filter(input, condition))
    }

    /// Project `exprs` under `names` from the top of the stack.
    pub fn project(&mut self, exprs: Vec<RexNode>, names: Vec<String>) -> &mut Self {
        let input = self.pop();
        if self.config.simplify && is_identity(&exprs, input.row_type()) && names == input.row_type().field_names() {
            return self.push(input);
        }
        self.push(AlgNode::project(input, exprs, names))
    }

    /// Project the given input fields, keeping their names.
    pub fn project_fields(&mut self, fields: &[usize]) -> &mut Self {
        let exprs = fields.iter().map(|&i| self.field(i)).collect();
        let names = fields
            .iter()
            .map(|&i| self.peek().row_type().field(i).name.clone())
            .collect();
        self.project(exprs, names)
    }

    /// Rename the fields of the top of the stack. No-op when the names are unchanged.
    pub fn rename(&mut self, names: Vec<String>) -> &mut Self {
        let row_type = self.peek().row_type().clone();
        assert_eq!(names.len(), row_type.field_count(), "rename to {} names", names.len());
        if names == row_type.field_names() {
            return self;
        }
        let exprs = (0..row_type.field_count()).map(|i| self.field(i)).collect();
        let input = self.pop();
        self.push(AlgNode::project(input, exprs, names))
    }

    pub fn calc(&mut self, program: RexProgram) -> &mut Self {
        let input = self.pop();
        if self.config.simplify && program.is_trivial() && program.output_row_type() == input.row_type() {
            return self.push(input);
        }
        self.push(AlgNode::calc(input, program))
    }

    /// Join the two topmost nodes; the deeper one is the left input.
    pub fn join(&mut self, join_type: JoinType, conditions: impl IntoIterator<Item = RexNode>) -> &mut Self {
        let condition = compose_conjunction(conditions.into_iter().collect());
        let right = self.pop();
        let left = self.pop();
        self.push(AlgNode::join(left, right, join_type, condition))
    }

    /// Semi-join the two topmost nodes, deriving equi-keys from the condition.
    pub fn semi_join(&mut self, conditions: impl IntoIterator<Item = RexNode>) -> &mut Self {
        let condition = compose_conjunction(conditions.into_iter().collect());
        let right = self.pop();
        let left = self.pop();
        let (left_keys, right_keys, _) = split_join_keys(left.field_count(), &condition);
        self.push(AlgNode::semi_join(left, right, condition, left_keys, right_keys))
    }

    pub fn aggregate(&mut self, group_set: Vec<usize>, calls: Vec<AggregateCall>) -> &mut Self {
        let input = self.pop();
        self.push(AlgNode::aggregate(input, group_set, calls))
    }

    pub fn sort(&mut self, collation: Collation) -> &mut Self {
        self.sort_limit(None, None, collation)
    }

    pub fn sort_limit(&mut self, offset: Option<u64>, fetch: Option<u64>, collation: Collation) -> &mut Self {
        if self.config.simplify && collation.is_empty() && offset.is_none() && fetch.is_none() {
            return self;
        }
        let input = self.pop();
        self.push(AlgNode::sort(input, collation, offset, fetch))
    }

    /// Union the `n` topmost nodes, preserving their stack order.
    pub fn union(&mut self, all: bool, n: usize) -> &mut Self {
        assert!(n >= 1 && n <= self.stack.len(), "cannot union {n} of {} nodes", self.stack.len());
        let inputs = self.stack.split_off(self.stack.len() - n);
        self.push(AlgNode::union(inputs, all))
    }

    pub fn modify(&mut self, entity: EntityRef, operation: ModifyOperation) -> &mut Self {
        let input = self.pop();
        self.push(AlgNode::modify(input, entity, operation))
    }

    /// Reference to field `i` of the top of the stack.
    pub fn field(&self, i: usize) -> RexNode {
        let row_type = self.peek().row_type();
        RexNode::input_ref(i, row_type.field(i).ty)
    }

    /// Reference to field `i` of one of the `input_count` topmost nodes, offset as in
    /// the row of a join over those nodes (input 0 is the deepest).
    pub fn join_field(&self, input_count: usize, input: usize, i: usize) -> RexNode {
        assert!(input < input_count, "input {input} of {input_count}");
        let offset: usize = (0..input)
            .map(|k| self.peek_at(input_count - 1 - k).field_count())
            .sum();
        let node = self.peek_at(input_count - 1 - input);
        RexNode::input_ref(offset + i, node.row_type().field(i).ty)
    }

    pub fn literal(&self, value: ScalarValue, ty: DataType) -> RexNode {
        RexNode::literal(value, ty)
    }

    pub fn call(&self, op: Op, operands: Vec<RexNode>) -> RexNode {
        RexNode::call(op, operands)
    }

    pub fn equals(&self, a: RexNode, b: RexNode) -> RexNode {
        RexNode::call(Op::Eq, vec![a, b])
    }

    pub fn and(&self, conjuncts: Vec<RexNode>) -> RexNode {
        compose_conjunction(conjuncts)
    }

    pub fn not(&self, e: RexNode) -> RexNode {
        RexNode::not(e)
    }

    pub fn is_null(&self, e: RexNode) -> RexNode {
        RexNode::call(Op::IsNull, vec![e])
    }

    pub fn is_not_null(&self, e: RexNode) -> RexNode {
        RexNode::call(Op::IsNotNull, vec![e])
    }
}

/// Whether `exprs` reads every field of `row_type` in order.
fn is_identity(exprs: &[RexNode], row_type: &RowType) -> bool {
    exprs.len() == row_type.field_count()
        && exprs
            .iter()
            .enumerate()
            .all(|(i, e)| e.as_input_ref() == Some(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::AlgKindTag;
    use crate::traits::FieldCollation;

    fn emp() -> (EntityRef, RowType) {
        (
            EntityRef::new(7, "hr", "emp", "mem"),
            RowType::from_pairs([
                ("empno", DataType::integer()),
                ("ename", DataType::varchar()),
                ("deptno", DataType::integer()),
            ]),
        )
    }

    #[test]
    fn test_scan_filter_project() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::default();
        b.scan(e, rt);
        let cond = b.equals(b.field(2), RexNode::int_literal(10));
        b.filter([cond]);
        let exprs = vec![b.field(1)];
        b.project(exprs, vec!["ename".into()]);
        let tree = b.build();
        assert_eq!(tree.tag(), AlgKindTag::Project);
        assert_eq!(tree.input(0).tag(), AlgKindTag::Filter);
        assert_eq!(tree.row_type().field_names(), vec!["ename"]);
        assert_eq!(b.size(), 0);
    }

    #[test]
    fn test_simplify_skips_no_op_nodes() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::new(BuilderConfig::default());
        b.scan(e, rt.clone());
        b.filter([RexNode::bool_literal(true)]);
        let exprs = (0..3).map(|i| b.field(i)).collect();
        b.project(exprs, rt.field_names());
        b.sort(Collation::empty());
        assert_eq!(b.build().tag(), AlgKindTag::Scan);
    }

    #[test]
    fn test_project_fields_and_rename() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::default();
        b.scan(e, rt);
        b.project_fields(&[2, 0]);
        assert_eq!(b.peek().row_type().field_names(), vec!["deptno", "empno"]);
        b.rename(vec!["deptno".into(), "empno".into()]);
        assert_eq!(b.size(), 1);
        b.rename(vec!["dept".into(), "id".into()]);
        let tree = b.build();
        assert_eq!(tree.explain(), "LogicalProject(dept=[$0], id=[$1])\n  LogicalProject(deptno=[$2], empno=[$0])\n    LogicalScan(entity=[hr.emp])\n");
    }

    #[test]
    fn test_false_filter_becomes_empty_values() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::default();
        b.scan(e, rt.clone());
        b.filter([RexNode::bool_literal(false)]);
        let tree = b.build();
        assert!(tree.is_empty_values());
        assert_eq!(tree.row_type(), &rt);
    }

    #[test]
    fn test_join_fields_are_offset() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::default();
        b.scan(e.clone(), rt.clone()).scan(e, rt);
        let cond = b.equals(b.join_field(2, 0, 2), b.join_field(2, 1, 0));
        assert_eq!(cond.to_string(), "=($2, $3)");
        b.semi_join([cond]);
        let tree = b.build();
        assert_eq!(tree.field_count(), 3);
        match tree.kind() {
            crate::alg::AlgKind::SemiJoin { left_keys, right_keys, .. } => {
                assert_eq!(left_keys, &vec![2]);
                assert_eq!(right_keys, &vec![0]);
            }
            other => panic!("expected semi-join, got {other:?}"),
        }
    }

    #[test]
    fn test_union_preserves_order() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::default();
        b.scan(e.clone(), rt.clone());
        b.push(AlgNode::values(vec![], rt));
        b.union(true, 2);
        let u = b.build();
        assert_eq!(u.inputs().len(), 2);
        assert_eq!(u.input(0).tag(), AlgKindTag::Scan);
        assert!(u.input(1).is_empty_values());
    }

    #[test]
    fn test_sort_limit_and_config_serde() {
        let (e, rt) = emp();
        let mut b = AlgBuilder::default();
        b.scan(e, rt);
        b.sort_limit(None, Some(5), Collation(vec![FieldCollation::desc(0)]));
        assert_eq!(b.build().tag(), AlgKindTag::Sort);

        let cfg: BuilderConfig = serde_json::from_str(r#"{"dedup_values": true}"#).unwrap();
        assert!(cfg.simplify);
        assert!(cfg.dedup_values);
    }
}
