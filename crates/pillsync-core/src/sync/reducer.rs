//! Pure application of change events to an ordered collection.
//!
//! Identity is the entity id. Applying the same event twice yields the same
//! collection, and the last delivered version of a row wins.

use std::cmp::Ordering;

use tracing::{debug, warn};

use super::event::ChangeEvent;
use crate::models::Entity;

/// Where a row the mirror has not seen before is placed.
pub enum InsertPolicy<E> {
    /// Newest-first feeds (schedules, activity)
    Prepend,
    Append,
    /// Keep the collection sorted; updates re-position the row
    SortedBy(fn(&E, &E) -> Ordering),
}

// Manual impls: derive would require `E: Clone`.
impl<E> Clone for InsertPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for InsertPolicy<E> {}

impl<E> std::fmt::Debug for InsertPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertPolicy::Prepend => f.write_str("Prepend"),
            InsertPolicy::Append => f.write_str("Append"),
            InsertPolicy::SortedBy(_) => f.write_str("SortedBy"),
        }
    }
}

impl<E> InsertPolicy<E> {
    fn place(&self, items: &mut Vec<E>, entity: E) {
        match self {
            InsertPolicy::Prepend => items.insert(0, entity),
            InsertPolicy::Append => items.push(entity),
            InsertPolicy::SortedBy(cmp) => {
                let at = items.partition_point(|existing| cmp(existing, &entity) != Ordering::Greater);
                items.insert(at, entity);
            }
        }
    }
}

/// Apply one event in place. Returns whether the collection changed.
pub fn reduce_in_place<E: Entity>(
    items: &mut Vec<E>,
    event: &ChangeEvent<E>,
    policy: InsertPolicy<E>,
) -> bool {
    match event {
        ChangeEvent::Insert { entity } | ChangeEvent::Update { entity, .. } => {
            upsert(items, entity, policy)
        }
        ChangeEvent::Delete { id, .. } => match items.iter().position(|e| e.id() == *id) {
            Some(index) => {
                items.remove(index);
                debug!(table = %E::TABLE, id = %id, "Removed row");
                true
            }
            None => false,
        },
        ChangeEvent::Unknown { operation } => {
            warn!(table = %E::TABLE, operation = %operation, "Ignoring unknown change operation");
            false
        }
    }
}

/// Pure form of [`reduce_in_place`].
pub fn reduce<E: Entity>(items: &[E], event: &ChangeEvent<E>, policy: InsertPolicy<E>) -> Vec<E> {
    let mut next = items.to_vec();
    reduce_in_place(&mut next, event, policy);
    next
}

fn upsert<E: Entity>(items: &mut Vec<E>, entity: &E, policy: InsertPolicy<E>) -> bool {
    let id = entity.id();
    match items.iter().position(|e| e.id() == id) {
        Some(index) if items[index] == *entity => false,
        Some(index) => {
            if let InsertPolicy::SortedBy(_) = policy {
                items.remove(index);
                policy.place(items, entity.clone());
            } else {
                items[index] = entity.clone();
            }
            debug!(table = %E::TABLE, id = %id, "Replaced row");
            true
        }
        None => {
            policy.place(items, entity.clone());
            debug!(table = %E::TABLE, id = %id, "Inserted row");
            true
        }
    }
}
