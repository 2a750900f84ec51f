//! # Operand Patterns
//!
//! Every rule declares the shape of the subtree it rewrites as a tree of [`Operand`]s.
//! Before a rule's rewrite logic runs, the planner matches the rule's root operand
//! against a candidate node and collects the **bindings**: the matched nodes in
//! pre-order, which the rule later reads as `call.rel(0)`, `call.rel(1)`, ...
//!
//! ## Matching One Operand
//!
//! A pattern node matches a candidate node iff, in this order:
//!
//! 1. the candidate's operator kind (or capability) matches the operand's matcher,
//! 2. the candidate's trait set satisfies the operand's trait constraint, if any,
//! 3. the operand's guard, if any, returns true for the candidate alone.
//!
//! Guards are evaluated before any child is looked at, so they should be cheap tests
//! that reject non-matches early (e.g. "this aggregate has no group keys").
//!
//! ## Child Quantifiers
//!
//! - [`Children::Exact`]: input count equals the pattern count and each input matches
//!   the pattern at the same position.
//! - [`Children::Some`]: at least one input matches one of the child patterns. Inputs
//!   are tried in index order and child patterns in declaration order; the first
//!   success is bound and the remaining inputs are unconstrained.
//! - [`Children::Any`]: the inputs are not inspected.
//! - [`Children::None`]: the candidate must be a leaf.
//!
//! Matching is deterministic: a fixed tree and pattern always give the same outcome
//! and, on success, the same binding order.

use crate::alg::{AlgKindTag, AlgNode, AlgRef, Capability};
use crate::traits::Trait;
use std::fmt;
use std::sync::Arc;

/// Cheap, side-effect-free predicate over a single node.
pub type Guard = Arc<dyn Fn(&AlgNode) -> bool + Send + Sync>;

/// What kind of node an operand accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMatcher {
    /// Exactly this operator kind.
    Kind(AlgKindTag),
    /// Any operator with this capability (e.g. every join-like operator).
    Capability(Capability),
    /// Any operator.
    Any,
}

impl OpMatcher {
    fn accepts(&self, node: &AlgNode) -> bool {
        match self {
            OpMatcher::Kind(tag) => node.tag() == *tag,
            OpMatcher::Capability(c) => node.has_capability(*c),
            OpMatcher::Any => true,
        }
    }
}

/// Child quantifier of an operand.
#[derive(Debug, Clone)]
pub enum Children {
    Exact(Vec<Operand>),
    Some(Vec<Operand>),
    Any,
    None,
}

/// One node of a rule's pattern tree. Immutable once built.
#[derive(Clone)]
pub struct Operand {
    matcher: OpMatcher,
    trait_constraint: Option<Trait>,
    guard: Option<Guard>,
    children: Children,
}

impl Operand {
    /// Operand matching an operator kind, with unconstrained inputs.
    pub fn of(tag: AlgKindTag) -> Self {
        Self::with_matcher(OpMatcher::Kind(tag))
    }

    /// Operand matching any operator with the given capability.
    pub fn capability(capability: Capability) -> Self {
        Self::with_matcher(OpMatcher::Capability(capability))
    }

    /// Operand matching any operator.
    pub fn any_node() -> Self {
        Self::with_matcher(OpMatcher::Any)
    }

    fn with_matcher(matcher: OpMatcher) -> Self {
        Self {
            matcher,
            trait_constraint: None,
            guard: None,
            children: Children::Any,
        }
    }

    pub fn with_trait(mut self, constraint: Trait) -> Self {
        self.trait_constraint = Some(constraint);
        self
    }

    pub fn with_guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&AlgNode) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Inputs must match `children` position by position.
    pub fn inputs(mut self, children: Vec<Operand>) -> Self {
        self.children = Children::Exact(children);
        self
    }

    /// Shorthand for a single-input exact child list.
    pub fn input(self, child: Operand) -> Self {
        self.inputs(vec![child])
    }

    /// At least one input must match one of `children`.
    pub fn some_input(mut self, children: Vec<Operand>) -> Self {
        self.children = Children::Some(children);
        self
    }

    /// The node must have no inputs.
    pub fn leaf(mut self) -> Self {
        self.children = Children::None;
        self
    }

    pub fn matcher(&self) -> OpMatcher {
        self.matcher
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    /// Whether this operand (ignoring its children) accepts `node`.
    pub fn matches_node(&self, node: &AlgNode) -> bool {
        if !self.matcher.accepts(node) {
            return false;
        }
        if let Some(constraint) = &self.trait_constraint {
            if !node.traits().satisfies(constraint) {
                return false;
            }
        }
        match &self.guard {
            Some(guard) => guard(node),
            None => true,
        }
    }

    /// Match this pattern tree against `node`, returning the pre-order bindings.
    pub fn match_tree(&self, node: &AlgRef) -> Option<Vec<AlgRef>> {
        let mut bindings = Vec::new();
        bind(self, node, &mut bindings).then_some(bindings)
    }

    /// Number of nodes a successful match binds, when it is fixed.
    pub fn binding_count(&self) -> Option<usize> {
        let below = match &self.children {
            Children::Exact(cs) => cs.iter().map(Operand::binding_count).sum::<Option<usize>>()?,
            Children::Some(cs) => {
                let counts: Vec<usize> = cs.iter().map(Operand::binding_count).collect::<Option<_>>()?;
                match counts.split_first() {
                    Some((first, rest)) if rest.iter().all(|c| c == first) => *first,
                    Some(_) => return None,
                    None => 0,
                }
            }
            Children::Any | Children::None => 0,
        };
        Some(1 + below)
    }
}

fn bind(operand: &Operand, node: &AlgRef, out: &mut Vec<AlgRef>) -> bool {
    if !operand.matches_node(node) {
        return false;
    }
    let mark = out.len();
    out.push(Arc::clone(node));
    let ok = match &operand.children {
        Children::Any => true,
        Children::None => node.inputs().is_empty(),
        Children::Exact(children) => {
            children.len() == node.inputs().len()
                && children
                    .iter()
                    .zip(node.inputs())
                    .all(|(child, input)| bind(child, input, out))
        }
        Children::Some(children) => node
            .inputs()
            .iter()
            .any(|input| children.iter().any(|child| bind(child, input, out))),
    };
    if !ok {
        out.truncate(mark);
    }
    ok
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operand")
            .field("matcher", &self.matcher)
            .field("trait_constraint", &self.trait_constraint)
            .field("guard", &self.guard.as_ref().map(|_| "<fn>"))
            .field("children", &self.children)
            .finish()
    }
}
