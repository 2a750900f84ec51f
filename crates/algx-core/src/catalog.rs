//! # Catalog Interface
//!
//! The catalog answers the questions the metadata oracle cannot derive from the plan
//! itself: how many rows a stored entity has, per-column statistics, and which column
//! sets are unique keys.
//!
//! ## Trait Design
//!
//! `Catalog` is consumed as a trait object (`dyn Catalog`) so that storage adapters can
//! plug in their own metadata. [`InMemoryCatalog`] is a HashMap-backed implementation
//! for tests and embedding.
//!
//! Entities are looked up by [`EntityRef`] and keyed by `namespace.name`. Unknown
//! entities return `None`; callers fall back to defaults.

use crate::alg::EntityRef;
use crate::stats::Statistics;
use std::collections::HashMap;

/// Catalog provides entity statistics and key information.
pub trait Catalog: Send + Sync {
    fn entity_stats(&self, entity: &EntityRef) -> Option<Statistics>;

    /// Column sets (field ordinals) that are unique keys of the entity.
    fn unique_keys(&self, entity: &EntityRef) -> Vec<Vec<usize>>;
}

/// In-memory catalog for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    /// Entity statistics keyed by "namespace.name".
    pub entity_stats: HashMap<String, Statistics>,
    /// Unique keys keyed by "namespace.name".
    pub unique_keys: HashMap<String, Vec<Vec<usize>>>,
}

fn key(entity: &EntityRef) -> String {
    format!("{}.{}", entity.namespace, entity.name)
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: &EntityRef, stats: Statistics) {
        self.entity_stats.insert(key(entity), stats);
    }

    pub fn add_unique_key(&mut self, entity: &EntityRef, columns: Vec<usize>) {
        self.unique_keys.entry(key(entity)).or_default().push(columns);
    }
}

impl Catalog for InMemoryCatalog {
    fn entity_stats(&self, entity: &EntityRef) -> Option<Statistics> {
        self.entity_stats.get(&key(entity)).cloned()
    }

    fn unique_keys(&self, entity: &EntityRef) -> Vec<Vec<usize>> {
        self.unique_keys.get(&key(entity)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_qualified_name() {
        let emp = EntityRef::new(1, "hr", "emp", "mem");
        let mut catalog = InMemoryCatalog::new();
        catalog.add_entity(&emp, Statistics::new(14.0));
        catalog.add_unique_key(&emp, vec![0]);

        // Same namespace and name, different id: still the same catalog entry.
        let alias = EntityRef::new(2, "hr", "emp", "mem");
        assert_eq!(catalog.entity_stats(&alias).map(|s| s.row_count), Some(14.0));
        assert_eq!(catalog.unique_keys(&alias), vec![vec![0]]);
        assert!(catalog.entity_stats(&EntityRef::new(3, "hr", "dept", "mem")).is_none());
    }
}
