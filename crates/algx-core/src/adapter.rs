//! # Storage Adapter Capabilities
//!
//! Storage adapters own the physical side of scans and modifications. The rewrite
//! engine never implements them itself: converter rules look the adapter up by the
//! entity's adapter id and ask it for an implementation.
//!
//! - [`Adapter::to_alg`] turns a logical scan into the adapter's physical scan, or
//!   returns `None` when it cannot (the converter rule then declines).
//! - [`Adapter::get_modify`] does the same for a table modification, and may use the
//!   builder it is handed to assemble a multi-node implementation.
//!
//! An entity naming an adapter that was never registered is not a decline but a
//! configuration error: [`AdapterRegistry::require`] returns
//! [`PlannerError::MissingAdapter`], which aborts the planning session.

use crate::alg::{AlgNode, AlgRef, EntityRef};
use crate::builder::AlgBuilder;
use crate::error::{PlannerError, PlannerResult};
use crate::traits::TraitSet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Capabilities a storage adapter exposes to the converter rules.
pub trait Adapter: Send + Sync {
    /// Identity of the adapter; matches `EntityRef::adapter`.
    fn id(&self) -> &str;

    /// Physical implementation of a logical scan with the requested traits.
    fn to_alg(&self, scan: &AlgNode, traits: &TraitSet) -> Option<AlgRef>;

    /// Physical implementation of a modification of `entity`.
    ///
    /// `modify` is the logical modify node; its input is already planned.
    fn get_modify(&self, entity: &EntityRef, modify: &AlgNode, builder: &mut AlgBuilder) -> Option<AlgRef>;
}

/// Adapters keyed by id.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Adapter>> {
        self.adapters.get(id)
    }

    /// The adapter with the given id, or a `MissingAdapter` error.
    pub fn require(&self, id: &str) -> PlannerResult<&Arc<dyn Adapter>> {
        self.get(id).ok_or_else(|| PlannerError::MissingAdapter {
            adapter: id.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.adapters.keys()).finish()
    }
}
