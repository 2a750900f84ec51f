//! # Rule System
//!
//! This module defines the rule trait, the per-firing [`RuleCall`] and the named rule
//! sets the planner consumes.
//!
//! ## Rules
//!
//! A rule is an immutable value: a root [`Operand`] describing the subtree shape it
//! rewrites, a builder factory, and a description that is unique within a rule set.
//! Rules carry no per-firing state, so one instance can serve any number of planning
//! sessions concurrently.
//!
//! There are two kinds of rules:
//!
//! - **Transformation rules** (`RuleType::Transformation`) rewrite a logical subtree
//!   into an equivalent one (merge two filters, push a filter into a join input).
//! - **Implementation rules** (`RuleType::Implementation`) convert a logical node into
//!   one with a physical convention (an adapter's scan).
//!
//! ## Firing Protocol
//!
//! For each match the planner builds a [`RuleCall`] holding the bound nodes in
//! pre-order, the metadata oracle, the adapter registry and a fresh builder. It then
//! asks [`Rule::matches`] (an optional extra guard over the whole binding) and, if that
//! passes, calls [`Rule::on_match`]. Declining means returning without calling
//! [`RuleCall::transform_to`].
//!
//! `transform_to` only buffers the new subtree; the planner registers everything a
//! firing produced after `on_match` returns, so a firing is atomic: either all of its
//! alternatives are registered, or (on error) none are.
//!
//! ## Rule Sets
//!
//! [`RuleSet`] is a named, ordered collection that rejects duplicate descriptions.
//! [`RuleRegistry`] combines base rules with adapter-specific sets, which only become
//! active when the session asks for that source.

use crate::adapter::AdapterRegistry;
use crate::alg::AlgRef;
use crate::builder::{AlgBuilder, AlgBuilderFactory};
use crate::error::{PlannerError, PlannerResult};
use crate::metadata::MetadataQuery;
use crate::pattern::Operand;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Classification of rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Logical -> logical rewrite.
    Transformation,
    /// Logical -> physical conversion.
    Implementation,
}

/// A rewrite rule.
pub trait Rule: Send + Sync {
    /// Unique description of this rule instance.
    fn description(&self) -> &str;

    /// Root of the pattern this rule matches.
    fn operand(&self) -> &Operand;

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    /// Factory for the builders handed to [`Rule::on_match`].
    fn builder_factory(&self) -> AlgBuilderFactory {
        AlgBuilderFactory::default()
    }

    /// Extra guard over the complete binding, evaluated after the pattern matched.
    fn matches(&self, _call: &RuleCall<'_>) -> bool {
        true
    }

    /// Rewrite logic. Calls `call.transform_to` zero or more times.
    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()>;

    /// Hash for fingerprinting (to avoid re-firing a rule on the same node).
    fn rule_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.description().hash(&mut hasher);
        hasher.finish()
    }
}

/// One firing of a rule on one binding.
pub struct RuleCall<'a> {
    description: &'a str,
    bindings: Vec<AlgRef>,
    metadata: &'a dyn MetadataQuery,
    adapters: &'a AdapterRegistry,
    factory: AlgBuilderFactory,
    results: Vec<AlgRef>,
    importance: Vec<(AlgRef, f64)>,
}

impl<'a> RuleCall<'a> {
    pub fn new(
        rule: &'a dyn Rule,
        bindings: Vec<AlgRef>,
        metadata: &'a dyn MetadataQuery,
        adapters: &'a AdapterRegistry,
    ) -> Self {
        assert!(!bindings.is_empty(), "rule call for '{}' without bindings", rule.description());
        Self {
            description: rule.description(),
            factory: rule.builder_factory(),
            bindings,
            metadata,
            adapters,
            results: Vec::new(),
            importance: Vec::new(),
        }
    }

    /// The `i`-th bound node in pre-order. `rel(0)` is the matched root.
    pub fn rel(&self, i: usize) -> &AlgRef {
        match self.bindings.get(i) {
            Some(node) => node,
            None => panic!(
                "rule '{}' asked for binding {i} of {}",
                self.description,
                self.bindings.len()
            ),
        }
    }

    pub fn bindings(&self) -> &[AlgRef] {
        &self.bindings
    }

    pub fn metadata(&self) -> &'a dyn MetadataQuery {
        self.metadata
    }

    pub fn adapters(&self) -> &'a AdapterRegistry {
        self.adapters
    }

    /// A fresh builder from the rule's factory.
    pub fn builder(&self) -> AlgBuilder {
        self.factory.create()
    }

    /// Register `node` as equivalent to the matched root.
    ///
    /// # Panics
    ///
    /// If `node`'s row type differs from the root's in field count or any field type
    /// (nullability included; names are ignored): a rule produced a non-equivalent
    /// plan, which is a bug in the rule.
    pub fn transform_to(&mut self, node: AlgRef) {
        let root = &self.bindings[0];
        assert!(
            root.row_type().equals_sans_names(node.row_type()),
            "rule '{}' produced row type {} for a node of row type {}",
            self.description,
            node.row_type(),
            root.row_type()
        );
        self.results.push(node);
    }

    /// Hint that `node` is no longer worth exploring (importance 0) or should be
    /// preferred. Never changes what the search space considers equivalent.
    pub fn set_importance(&mut self, node: &AlgRef, importance: f64) {
        self.importance.push((Arc::clone(node), importance));
    }

    pub fn results(&self) -> &[AlgRef] {
        &self.results
    }

    /// Consume the call, returning the alternatives and importance hints it produced.
    pub fn into_outcome(self) -> (Vec<AlgRef>, Vec<(AlgRef, f64)>) {
        (self.results, self.importance)
    }
}

/// A named set of rules with unique descriptions.
#[derive(Clone)]
pub struct RuleSet {
    pub name: String,
    rules: Vec<Arc<dyn Rule>>,
    descriptions: HashSet<String>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            descriptions: HashSet::new(),
        }
    }

    /// Add a rule, rejecting one whose description is already present.
    pub fn add(&mut self, rule: Arc<dyn Rule>) -> PlannerResult<()> {
        if !self.descriptions.insert(rule.description().to_string()) {
            return Err(PlannerError::DuplicateRule {
                description: rule.description().to_string(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Builder-style [`RuleSet::add`].
    pub fn with(mut self, rule: Arc<dyn Rule>) -> PlannerResult<Self> {
        self.add(rule)?;
        Ok(self)
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn contains(&self, description: &str) -> bool {
        self.descriptions.contains(description)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("rules", &self.rules.iter().map(|r| r.description()).collect::<Vec<_>>())
            .finish()
    }
}

/// Base rules plus source-specific rule sets.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    pub base_rules: RuleSet,
    pub source_rules: BTreeMap<String, RuleSet>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            base_rules: RuleSet::new("base"),
            source_rules: BTreeMap::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) -> PlannerResult<()> {
        if self.source_rules.values().any(|rs| rs.contains(rule.description())) {
            return Err(PlannerError::DuplicateRule {
                description: rule.description().to_string(),
            });
        }
        self.base_rules.add(rule)
    }

    /// Add a rule set that is only active for `source`.
    pub fn add_source_rule_set(&mut self, source: impl Into<String>, rule_set: RuleSet) -> PlannerResult<()> {
        if let Some(dup) = rule_set.rules().iter().find(|r| self.base_rules.contains(r.description())) {
            return Err(PlannerError::DuplicateRule {
                description: dup.description().to_string(),
            });
        }
        self.source_rules.insert(source.into(), rule_set);
        Ok(())
    }

    /// All rules active for the given sources: base rules first, then each source's
    /// set in the given order.
    pub fn active_rules(&self, sources: &[&str]) -> Vec<Arc<dyn Rule>> {
        let mut rules: Vec<Arc<dyn Rule>> = self.base_rules.rules().to_vec();
        for source in sources {
            if let Some(rs) = self.source_rules.get(*source) {
                rules.extend(rs.rules().iter().cloned());
            }
        }
        rules
    }

    /// Flatten the active rules into one rule set.
    pub fn to_rule_set(&self, sources: &[&str]) -> PlannerResult<RuleSet> {
        let mut set = RuleSet::new(self.base_rules.name.clone());
        for rule in self.active_rules(sources) {
            set.add(rule)?;
        }
        Ok(set)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
