//! # Search Space and Planner
//!
//! The planner owns the search space: every node it has seen, grouped into equivalence
//! sets, plus a queue of pending rule matches. It drives rules to a fixed point (or until
//! a budget runs out) and then extracts the cheapest plan.
//!
//! ## Equivalence Sets
//!
//! A [`RelSet`] holds nodes proven to produce the same rows. Sets are created on first
//! registration and merged (union-find, the lower id survives) when a node already in
//! one set is proven equivalent to another. Sets are never split. Registration is keyed
//! by digest: registering a node whose digest is already known is a no-op that returns
//! the existing set.
//!
//! Nodes keep their concrete inputs. A node's input is read as "any member of the
//! input's set", which is how alternatives found below a node reach the plans built
//! above it.
//!
//! ## Match Queue
//!
//! Registering a node matches every rule's operand against it and queues each match
//! with the importance of the target set. The queue pops the highest importance first
//! and is FIFO among equals, so the firing order is a deterministic total order.
//!
//! When a set gains a member, each registered parent of the set is re-matched with
//! the new member substituted for its input. Rules therefore see alternatives
//! discovered one level below the node they match.
//!
//! A popped match is skipped when:
//!
//! - a bound node was given importance zero (it was superseded),
//! - the target set's importance is below the configured floor,
//! - the binding reads the same set twice on one root-to-leaf path (a node consuming
//!   its own output).
//!
//! A rule fires at most once per `(root digest, rule)`.
//!
//! ## Budgets and Cancellation
//!
//! [`SearchConfig`] bounds the number of firings, registered nodes and elapsed time.
//! Running out of budget ends the session normally; the search space stays usable and
//! [`Planner::find_best`] works on whatever was discovered. A cancellation flag is
//! checked before each firing.
//!
//! ## Best-Plan Extraction
//!
//! [`Planner::find_best`] assigns each set the cheapest member by fixpoint relaxation:
//! a member's cost is its local cost (from the [`CostModel`]) plus the best costs of its
//! input sets. Members that read their own set never win.

use crate::adapter::AdapterRegistry;
use crate::alg::AlgRef;
use crate::cost::{Cost, CostModel, DefaultCostModel};
use crate::error::{PlannerError, PlannerResult};
use crate::metadata::MetadataQuery;
use crate::rule::{Rule, RuleCall, RuleSet};
use crate::traits::Convention;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Index of an equivalence set. Merged sets resolve to the surviving id.
pub type SetId = usize;

/// Importance of an input set relative to the set that registered it.
const CHILD_IMPORTANCE_DECAY: f64 = 0.9;

/// Budgets for one planning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Upper bound on rule firings.
    pub max_firings: usize,
    /// Upper bound on registered nodes across all sets.
    pub max_nodes: usize,
    /// Wall-clock limit for [`Planner::run`].
    pub max_duration_ms: Option<u64>,
    /// Matches whose target set is less important than this are skipped.
    pub importance_floor: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_firings: 100_000,
            max_nodes: 100_000,
            max_duration_ms: None,
            importance_floor: 0.0,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> PlannerResult<()> {
        if self.max_firings == 0 {
            return Err(PlannerError::InvalidConfig("max_firings must be positive".into()));
        }
        if self.max_nodes == 0 {
            return Err(PlannerError::InvalidConfig("max_nodes must be positive".into()));
        }
        if self.max_duration_ms == Some(0) {
            return Err(PlannerError::InvalidConfig("max_duration_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.importance_floor) {
            return Err(PlannerError::InvalidConfig(format!(
                "importance_floor {} is outside [0, 1]",
                self.importance_floor
            )));
        }
        Ok(())
    }
}

/// Why [`Planner::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The queue drained.
    FixedPoint,
    FiringBudget,
    NodeBudget,
    Timeout,
    Cancelled,
}

/// Summary of a [`Planner::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    pub firings: usize,
    pub skipped: usize,
    pub nodes: usize,
    pub sets: usize,
}

/// An equivalence class of nodes.
#[derive(Debug, Default)]
pub struct RelSet {
    members: Vec<AlgRef>,
    parents: Vec<AlgRef>,
    importance: f64,
}

impl RelSet {
    pub fn members(&self) -> &[AlgRef] {
        &self.members
    }

    /// Registered nodes that read this set.
    pub fn parents(&self) -> &[AlgRef] {
        &self.parents
    }

    pub fn importance(&self) -> f64 {
        self.importance
    }
}

/// A pending rule firing.
struct RuleMatch {
    rule: usize,
    bindings: Vec<AlgRef>,
    set: SetId,
    importance: OrderedFloat<f64>,
    seq: u64,
}

impl RuleMatch {
    fn key(&self) -> (OrderedFloat<f64>, Reverse<u64>) {
        (self.importance, Reverse(self.seq))
    }
}

impl PartialEq for RuleMatch {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RuleMatch {}

impl PartialOrd for RuleMatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RuleMatch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// The rule-driven planner.
pub struct Planner {
    rules: Vec<Arc<dyn Rule>>,
    metadata: Box<dyn MetadataQuery>,
    adapters: AdapterRegistry,
    cost_model: Arc<dyn CostModel>,
    config: SearchConfig,
    sets: Vec<RelSet>,
    /// Union-find parent pointers, indexed by set id.
    union: Vec<SetId>,
    digest_to_set: HashMap<String, SetId>,
    node_importance: HashMap<String, f64>,
    queue: BinaryHeap<RuleMatch>,
    /// `(root digest, rule)` pairs already queued or fired.
    seen: HashSet<(String, usize)>,
    seq: u64,
    root: Option<SetId>,
    root_convention: Option<Convention>,
    node_count: usize,
    firings: usize,
    cancelled: Arc<AtomicBool>,
}

impl Planner {
    pub fn new(rules: RuleSet, metadata: Box<dyn MetadataQuery>, config: SearchConfig) -> PlannerResult<Self> {
        config.validate()?;
        debug!(
            "Creating planner: rule_set={}, rules={}, max_firings={}, max_nodes={}",
            rules.name,
            rules.len(),
            config.max_firings,
            config.max_nodes
        );
        Ok(Self {
            rules: rules.rules().to_vec(),
            metadata,
            adapters: AdapterRegistry::new(),
            cost_model: Arc::new(DefaultCostModel::default()),
            config,
            sets: Vec::new(),
            union: Vec::new(),
            digest_to_set: HashMap::new(),
            node_importance: HashMap::new(),
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            seq: 0,
            root: None,
            root_convention: None,
            node_count: 0,
            firings: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn metadata(&self) -> &dyn MetadataQuery {
        self.metadata.as_ref()
    }

    /// Flag that stops [`Planner::run`] before its next firing when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Register the tree to optimize and make its set the root.
    pub fn set_root(&mut self, node: AlgRef) -> SetId {
        let set = self.register_with(node, None, 1.0);
        self.root = Some(set);
        debug!("Root set #{}: sets={}, nodes={}", set, self.set_count(), self.node_count);
        set
    }

    /// Only members with this convention may be picked for the root.
    pub fn set_root_convention(&mut self, convention: Convention) {
        self.root_convention = Some(convention);
    }

    pub fn root(&self) -> Option<SetId> {
        self.root.map(|s| self.find(s))
    }

    /// Register `node` (and, first, its inputs), in `equiv`'s set if given.
    ///
    /// Registering a node that is already known returns its set, merging it with
    /// `equiv` when they differ.
    pub fn register(&mut self, node: AlgRef, equiv: Option<SetId>) -> SetId {
        let importance = equiv.map_or(1.0, |s| self.sets[self.find(s)].importance);
        self.register_with(node, equiv, importance)
    }

    /// Register `node` as equivalent to the members of `equiv`.
    pub fn ensure_registered(&mut self, node: AlgRef, equiv: SetId) -> SetId {
        self.register(node, Some(equiv))
    }

    /// Importance hint for a node. Zero marks it superseded: matches binding it are
    /// skipped. A positive value becomes the importance of the node's set.
    pub fn set_importance(&mut self, node: &AlgRef, importance: f64) {
        trace!("Importance of {} set to {}", node.digest(), importance);
        self.node_importance.insert(node.digest().to_string(), importance);
        if importance > 0.0 {
            if let Some(set) = self.set_of_digest(node.digest()) {
                self.sets[set].importance = importance;
            }
        }
    }

    /// Importance of a node: its own hint if it has one, else its set's.
    pub fn importance(&self, node: &AlgRef) -> Option<f64> {
        self.node_importance
            .get(node.digest())
            .copied()
            .or_else(|| self.set_of_digest(node.digest()).map(|s| self.sets[s].importance))
    }

    pub fn set_of(&self, node: &AlgRef) -> Option<SetId> {
        self.set_of_digest(node.digest())
    }

    pub fn set(&self, id: SetId) -> &RelSet {
        &self.sets[self.find(id)]
    }

    pub fn is_equivalent(&self, a: &AlgRef, b: &AlgRef) -> bool {
        matches!((self.set_of(a), self.set_of(b)), (Some(x), Some(y)) if x == y)
    }

    /// Number of live (unmerged) sets.
    pub fn set_count(&self) -> usize {
        (0..self.sets.len()).filter(|&s| self.union[s] == s).count()
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn firings(&self) -> usize {
        self.firings
    }

    /// Fire queued matches until the queue drains or a budget runs out.
    ///
    /// An error from a rule aborts the session; the firing that raised it registers
    /// nothing.
    pub fn run(&mut self) -> PlannerResult<RunOutcome> {
        if self.root.is_none() {
            return Err(PlannerError::NoRoot);
        }
        let started = Instant::now();
        let deadline = self.config.max_duration_ms.map(Duration::from_millis);
        let mut skipped = 0;

        let stop_reason = loop {
            if self.cancelled.load(AtomicOrdering::Relaxed) {
                break StopReason::Cancelled;
            }
            if self.firings >= self.config.max_firings {
                break StopReason::FiringBudget;
            }
            if self.node_count >= self.config.max_nodes {
                break StopReason::NodeBudget;
            }
            if deadline.is_some_and(|d| started.elapsed() >= d) {
                break StopReason::Timeout;
            }
            let Some(m) = self.queue.pop() else {
                break StopReason::FixedPoint;
            };
            if self.should_skip(&m) {
                skipped += 1;
                continue;
            }
            self.fire(m)?;
        };

        let outcome = RunOutcome {
            stop_reason,
            firings: self.firings,
            skipped,
            nodes: self.node_count,
            sets: self.set_count(),
        };
        if stop_reason != StopReason::FixedPoint {
            debug!("Planning stopped early: reason={:?}, pending={}", stop_reason, self.queue.len());
        }
        debug!(
            "Planning finished: firings={}, skipped={}, nodes={}, sets={}, elapsed={:?}",
            outcome.firings,
            outcome.skipped,
            outcome.nodes,
            outcome.sets,
            started.elapsed()
        );
        Ok(outcome)
    }

    /// The cheapest plan for the root set.
    pub fn find_best(&self) -> PlannerResult<AlgRef> {
        let root = self.root().ok_or(PlannerError::NoRoot)?;
        let best = self.compute_best(root);
        let mut path = Vec::new();
        let plan = self.build_best(root, &best, &mut path)?;
        if let Some((cost, _)) = best.get(&root) {
            debug!("Best plan for root set #{}: cost={}", root, cost);
        }
        Ok(plan)
    }

    /// Best cost of every set, with the index of the member that achieves it.
    fn compute_best(&self, root: SetId) -> HashMap<SetId, (Cost, usize)> {
        let live: Vec<SetId> = (0..self.sets.len()).filter(|&s| self.union[s] == s).collect();
        let local: HashMap<&str, Cost> = live
            .iter()
            .flat_map(|&s| self.sets[s].members.iter())
            .map(|m| (m.digest(), self.cost_model.compute_cost(m, self.metadata.as_ref())))
            .collect();

        let mut best: HashMap<SetId, (Cost, usize)> = HashMap::new();
        // Each pass fixes at least one more set, so |sets| + 1 passes reach the fixpoint.
        for _ in 0..=live.len() {
            let mut changed = false;
            for &s in &live {
                'members: for (i, m) in self.sets[s].members.iter().enumerate() {
                    if s == root {
                        if let Some(required) = &self.root_convention {
                            if m.convention() != required {
                                continue;
                            }
                        }
                    }
                    let mut cost = local[m.digest()];
                    for input in m.inputs() {
                        let Some(child) = self.set_of(input) else {
                            continue 'members;
                        };
                        if child == s {
                            continue 'members;
                        }
                        match best.get(&child) {
                            Some((c, _)) => cost = cost.plus(*c),
                            None => continue 'members,
                        }
                    }
                    if cost.is_infinite() {
                        continue;
                    }
                    if best.get(&s).map_or(true, |(b, _)| cost < *b) {
                        best.insert(s, (cost, i));
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        best
    }

    fn build_best(&self, set: SetId, best: &HashMap<SetId, (Cost, usize)>, path: &mut Vec<SetId>) -> PlannerResult<AlgRef> {
        let &(_, index) = best.get(&set).ok_or(PlannerError::NoPlan { set })?;
        if path.contains(&set) {
            return Err(PlannerError::NoPlan { set });
        }
        path.push(set);
        let member = &self.sets[set].members[index];
        let inputs = member
            .inputs()
            .iter()
            .map(|input| {
                let child = self.set_of(input).ok_or(PlannerError::NoPlan { set })?;
                self.build_best(child, best, path)
            })
            .collect::<PlannerResult<Vec<_>>>()?;
        path.pop();
        Ok(if inputs.is_empty() {
            Arc::clone(member)
        } else {
            member.copy_with_inputs(inputs)
        })
    }

    fn find(&self, mut set: SetId) -> SetId {
        while self.union[set] != set {
            set = self.union[set];
        }
        set
    }

    fn set_of_digest(&self, digest: &str) -> Option<SetId> {
        self.digest_to_set.get(digest).map(|&s| self.find(s))
    }

    fn register_with(&mut self, node: AlgRef, equiv: Option<SetId>, importance: f64) -> SetId {
        if let Some(existing) = self.set_of_digest(node.digest()) {
            let set = &mut self.sets[existing];
            set.importance = set.importance.max(importance);
            return match equiv.map(|e| self.find(e)) {
                Some(e) if e != existing => self.merge(existing, e),
                _ => existing,
            };
        }

        for input in node.inputs() {
            self.register_with(Arc::clone(input), None, importance * CHILD_IMPORTANCE_DECAY);
        }

        // Registering the inputs may have merged `equiv` into another set.
        let set = match equiv {
            Some(e) => {
                let e = self.find(e);
                let s = &mut self.sets[e];
                s.importance = s.importance.max(importance);
                e
            }
            None => {
                let id = self.sets.len();
                self.sets.push(RelSet {
                    importance,
                    ..RelSet::default()
                });
                self.union.push(id);
                id
            }
        };

        self.sets[set].members.push(Arc::clone(&node));
        self.digest_to_set.insert(node.digest().to_string(), set);
        self.node_count += 1;
        for input in node.inputs() {
            if let Some(child) = self.set_of(input) {
                let parents = &mut self.sets[child].parents;
                if !parents.iter().any(|p| p.digest() == node.digest()) {
                    parents.push(Arc::clone(&node));
                }
            }
        }
        trace!("Registered {} in set #{}", node.digest(), set);

        self.queue_matches(&node, set);
        self.match_input_members(&node, set);
        self.rematch_parents(&node, set);
        set
    }

    fn merge(&mut self, a: SetId, b: SetId) -> SetId {
        let (keep, gone) = if a < b { (a, b) } else { (b, a) };
        self.union[gone] = keep;
        let absorbed = std::mem::take(&mut self.sets[gone]);
        debug!(
            "Merging set #{} into #{}: members={}+{}",
            gone,
            keep,
            self.sets[keep].members.len(),
            absorbed.members.len()
        );
        let target = &mut self.sets[keep];
        target.importance = target.importance.max(absorbed.importance);
        target.members.extend(absorbed.members);
        for parent in absorbed.parents {
            if !target.parents.iter().any(|p| p.digest() == parent.digest()) {
                target.parents.push(parent);
            }
        }
        let members = self.sets[keep].members.clone();
        for member in &members {
            self.rematch_parents(member, keep);
        }
        keep
    }

    /// Queue every rule whose operand matches the tree rooted at `root`.
    fn queue_matches(&mut self, root: &AlgRef, set: SetId) {
        let importance = self.sets[set].importance;
        for (index, rule) in self.rules.iter().enumerate() {
            let key = (root.digest().to_string(), index);
            if self.seen.contains(&key) {
                continue;
            }
            let Some(bindings) = rule.operand().match_tree(root) else {
                continue;
            };
            trace!("Queued '{}' on {} (set #{})", rule.description(), root.digest(), set);
            self.seen.insert(key);
            self.seq += 1;
            self.queue.push(RuleMatch {
                rule: index,
                bindings,
                set,
                importance: OrderedFloat(importance),
                seq: self.seq,
            });
        }
    }

    /// Match `node` with each input replaced by the other members of that input's set,
    /// so a new node sees the alternatives already found below it.
    fn match_input_members(&mut self, node: &AlgRef, set: SetId) {
        for (i, input) in node.inputs().iter().enumerate() {
            let Some(child) = self.set_of(input).filter(|&c| c != set) else {
                continue;
            };
            let members = self.sets[child].members.clone();
            for member in members {
                if member.digest() == input.digest() || member.inputs().iter().any(|m| self.set_of(m) == Some(child)) {
                    continue;
                }
                let mut inputs = node.inputs().to_vec();
                inputs[i] = member;
                let alternative = node.copy_with_inputs(inputs);
                self.queue_matches(&alternative, set);
            }
        }
    }

    /// Re-match each parent of `set` with `member` substituted for the input it reads
    /// from `set`.
    fn rematch_parents(&mut self, member: &AlgRef, set: SetId) {
        if member.inputs().iter().any(|i| self.set_of(i) == Some(set)) {
            return;
        }
        let parents = self.sets[set].parents.clone();
        for parent in parents {
            // A parent inside `set` reads its own output.
            let Some(parent_set) = self.set_of(&parent).filter(|&s| s != set) else {
                continue;
            };
            for (i, input) in parent.inputs().iter().enumerate() {
                if input.digest() == member.digest() || self.set_of(input) != Some(set) {
                    continue;
                }
                let mut inputs = parent.inputs().to_vec();
                inputs[i] = Arc::clone(member);
                let alternative = parent.copy_with_inputs(inputs);
                self.queue_matches(&alternative, parent_set);
            }
        }
    }

    fn should_skip(&self, m: &RuleMatch) -> bool {
        let description = self.rules[m.rule].description();
        if let Some(pruned) = m
            .bindings
            .iter()
            .find(|b| self.node_importance.get(b.digest()) == Some(&0.0))
        {
            trace!("Skipping '{}': {} was superseded", description, pruned.digest());
            return true;
        }
        let target = self.find(m.set);
        if self.sets[target].importance < self.config.importance_floor {
            trace!("Skipping '{}': set #{} is below the importance floor", description, target);
            return true;
        }
        if self.binds_cycle(&m.bindings, target) {
            trace!("Skipping '{}': binding reads set #{} twice", description, target);
            return true;
        }
        false
    }

    fn binds_cycle(&self, bindings: &[AlgRef], target: SetId) -> bool {
        let bound: HashSet<&str> = bindings.iter().map(|b| b.digest()).collect();
        let mut path = vec![target];
        bindings[0]
            .inputs()
            .iter()
            .any(|input| self.cycle_below(input, &bound, &mut path))
    }

    fn cycle_below(&self, node: &AlgRef, bound: &HashSet<&str>, path: &mut Vec<SetId>) -> bool {
        if !bound.contains(node.digest()) {
            return false;
        }
        let Some(set) = self.set_of(node) else {
            return false;
        };
        if path.contains(&set) {
            return true;
        }
        path.push(set);
        let found = node.inputs().iter().any(|input| self.cycle_below(input, bound, path));
        path.pop();
        found
    }

    fn fire(&mut self, m: RuleMatch) -> PlannerResult<()> {
        let rule = Arc::clone(&self.rules[m.rule]);
        let target = m.set;
        let root_digest = m.bindings[0].digest().to_string();
        let (results, hints) = {
            let mut call = RuleCall::new(rule.as_ref(), m.bindings, self.metadata.as_ref(), &self.adapters);
            if !rule.matches(&call) {
                trace!("'{}' declined {} in its guard", rule.description(), root_digest);
                return Ok(());
            }
            self.firings += 1;
            rule.on_match(&mut call)?;
            call.into_outcome()
        };
        trace!(
            "Fired '{}' on {}: alternatives={}",
            rule.description(),
            root_digest,
            results.len()
        );
        for result in results {
            self.register(result, Some(target));
        }
        for (node, importance) in hints {
            self.set_importance(&node, importance);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("sets", &self.set_count())
            .field("nodes", &self.node_count)
            .field("queued", &self.queue.len())
            .field("firings", &self.firings)
            .finish()
    }
}
