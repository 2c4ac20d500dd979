//! In-memory replica of one owner's rows for one table.

use std::collections::HashSet;

use uuid::Uuid;

use super::event::ChangeEvent;
use super::reducer::{reduce_in_place, InsertPolicy};
use crate::models::Entity;

/// Ordered rows keyed by id. Only the owning collection mutates it, and only
/// through the reducer or a snapshot restore.
#[derive(Debug, Clone)]
pub struct LocalMirror<E: Entity> {
    items: Vec<E>,
    policy: InsertPolicy<E>,
    version: u64,
}

impl<E: Entity> Default for LocalMirror<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> LocalMirror<E> {
    pub fn new() -> Self {
        Self::with_policy(E::insert_policy())
    }

    pub fn with_policy(policy: InsertPolicy<E>) -> Self {
        Self {
            items: Vec::new(),
            policy,
            version: 0,
        }
    }

    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&E> {
        self.items.iter().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    /// Bumped on every change, for cheap "did anything move" checks.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the contents with a bulk read, keeping the first copy of any
    /// repeated id.
    pub(crate) fn replace_all(&mut self, rows: Vec<E>) {
        let mut seen = HashSet::with_capacity(rows.len());
        self.items = rows.into_iter().filter(|e| seen.insert(e.id())).collect();
        if let InsertPolicy::SortedBy(cmp) = self.policy {
            self.items.sort_by(cmp);
        }
        self.version += 1;
    }

    pub(crate) fn apply(&mut self, event: &ChangeEvent<E>) -> bool {
        let changed = reduce_in_place(&mut self.items, event, self.policy);
        if changed {
            self.version += 1;
        }
        changed
    }

    pub(crate) fn snapshot(&self) -> Vec<E> {
        self.items.clone()
    }

    pub(crate) fn restore(&mut self, snapshot: Vec<E>) {
        self.items = snapshot;
        self.version += 1;
    }
}
