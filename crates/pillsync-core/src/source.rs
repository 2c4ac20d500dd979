//! Reference remote source backed by SQLite.
//!
//! Every statement is scoped by owner and every committed write is broadcast
//! on a per-table change feed, the way a hosted backend would push row
//! changes to subscribed clients.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::db::{dependents, Database, DbError, DbResult, TableRecord};
use crate::models::{OrderBy, OwnerId, Patient, Table};
use crate::sync::{
    Mutation, RawChangeEvent, RemoteSource, SourceError, SourceResult, Subscription,
    SubscriptionRegistry,
};

/// SQLite tables plus broadcast change feeds.
pub struct SqliteSource {
    db: Mutex<Database>,
    feeds: Mutex<HashMap<Table, broadcast::Sender<RawChangeEvent>>>,
    capacity: usize,
    registry: Arc<SubscriptionRegistry>,
    online: AtomicBool,
}

impl SqliteSource {
    pub fn new(db: Database, config: &SyncConfig) -> Self {
        let capacity = config.feed_capacity.max(1);
        Self {
            db: Mutex::new(db),
            feeds: Mutex::new(fresh_feeds(capacity)),
            capacity,
            registry: Arc::new(SubscriptionRegistry::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Open a file-backed source.
    pub fn open<P: AsRef<Path>>(path: P, config: &SyncConfig) -> DbResult<Self> {
        Ok(Self::new(Database::open(path)?, config))
    }

    pub fn open_in_memory(config: &SyncConfig) -> DbResult<Self> {
        Ok(Self::new(Database::open_in_memory()?, config))
    }

    /// Simulate losing or regaining the backend. While offline every call
    /// fails with `Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        info!(online, "Remote source availability changed");
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Close every change feed. Existing subscriptions observe a dropped
    /// feed; new subscriptions attach to fresh ones.
    pub fn drop_feeds(&self) {
        *self.lock_feeds() = fresh_feeds(self.capacity);
        warn!("Change feeds dropped");
    }

    /// Subscriptions not yet released.
    pub fn active_subscriptions(&self) -> usize {
        self.registry.active()
    }

    pub fn active_subscriptions_for(&self, table: Table) -> usize {
        self.registry.active_for(table)
    }

    fn lock_feeds(&self) -> MutexGuard<'_, HashMap<Table, broadcast::Sender<RawChangeEvent>>> {
        match self.feeds.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ensure_online(&self) -> SourceResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SourceError::Unavailable("remote source is offline".into()))
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> DbResult<T>) -> SourceResult<T> {
        let db = self
            .db
            .lock()
            .map_err(|e| SourceError::Unavailable(format!("Lock poisoned: {}", e)))?;
        f(&db).map_err(source_error)
    }

    fn publish(&self, table: Table, event: RawChangeEvent) {
        let feeds = self.lock_feeds();
        if let Some(sender) = feeds.get(&table) {
            // No receivers is fine: nobody is watching this table.
            let delivered = sender.send(event).unwrap_or(0);
            debug!(table = %table, receivers = delivered, "Published change");
        }
    }

    fn publish_row<E: TableRecord>(
        &self,
        make: impl FnOnce() -> Result<RawChangeEvent, serde_json::Error>,
    ) {
        match make() {
            Ok(event) => self.publish(E::TABLE, event),
            Err(e) => warn!(table = %E::TABLE, error = %e, "Could not encode change event"),
        }
    }

    fn publish_id_delete(&self, table: Table, id: Uuid, owner: OwnerId) {
        self.publish(
            table,
            RawChangeEvent {
                table: table.as_str().to_string(),
                operation: "DELETE".to_string(),
                new: None,
                old: Some(json!({ "id": id, "owner_id": owner })),
            },
        );
    }
}

fn fresh_feeds(capacity: usize) -> HashMap<Table, broadcast::Sender<RawChangeEvent>> {
    Table::ALL
        .into_iter()
        .map(|table| (table, broadcast::channel(capacity).0))
        .collect()
}

fn source_error(err: DbError) -> SourceError {
    if err.is_constraint() {
        return SourceError::WriteRejected(err.to_string());
    }
    match err {
        DbError::OwnerMismatch(msg) => SourceError::Unauthorized(msg),
        DbError::NotFound(msg) => SourceError::WriteRejected(format!("stale id {}", msg)),
        other => SourceError::Unavailable(other.to_string()),
    }
}

/// Existing row by id, checked against the caller's owner.
fn owned_row<E: TableRecord>(db: &Database, owner: OwnerId, id: Uuid) -> DbResult<E> {
    let row = E::get(db, id)?.ok_or_else(|| DbError::NotFound(id.to_string()))?;
    if row.owner_id() != owner {
        return Err(DbError::OwnerMismatch(format!("{} {}", E::TABLE, id)));
    }
    Ok(row)
}

/// Rejects a row pointing at a patient the owner cannot see. A foreign
/// patient fails exactly like a missing one, so ids do not leak across owners.
fn check_patient_ref<E: TableRecord>(db: &Database, owner: OwnerId, row: &E) -> DbResult<()> {
    let Some(patient_id) = row.patient_ref() else {
        return Ok(());
    };
    match Patient::get(db, patient_id)? {
        Some(patient) if patient.owner_id == owner => Ok(()),
        _ => Err(DbError::Constraint(format!(
            "{} {} references unknown patient {}",
            E::TABLE,
            row.id(),
            patient_id
        ))),
    }
}

fn stored_row<E: TableRecord>(db: &Database, id: Uuid) -> DbResult<E> {
    E::get(db, id)?.ok_or_else(|| DbError::NotFound(id.to_string()))
}

impl<E: TableRecord> RemoteSource<E> for SqliteSource {
    async fn fetch_all(&self, owner: OwnerId, order: OrderBy) -> SourceResult<Vec<E>> {
        self.ensure_online()?;
        self.with_db(|db| E::list_owned(db, owner, order))
    }

    fn subscribe(&self, owner: OwnerId) -> SourceResult<Subscription<E>> {
        self.ensure_online()?;
        let receiver = self
            .lock_feeds()
            .get(&E::TABLE)
            .map(broadcast::Sender::subscribe)
            .ok_or(SourceError::SubscriptionDropped)?;
        Ok(Subscription::new(owner, receiver, self.registry.clone()))
    }

    async fn mutate(&self, owner: OwnerId, mutation: Mutation<E>) -> SourceResult<Option<E>> {
        self.ensure_online()?;
        debug!(table = %E::TABLE, owner = %owner, id = %mutation.id(), operation = mutation.operation(), "Applying write");

        match mutation {
            Mutation::Insert(row) => {
                if row.owner_id() != owner {
                    return Err(SourceError::Unauthorized(format!(
                        "cannot write {} for another owner",
                        E::TABLE
                    )));
                }
                let stored = self.with_db(|db| {
                    check_patient_ref(db, owner, &row)?;
                    E::insert(db, &row)?;
                    stored_row::<E>(db, row.id())
                })?;
                self.publish_row::<E>(|| RawChangeEvent::insert(&stored));
                Ok(Some(stored))
            }
            Mutation::Update(row) => {
                if row.owner_id() != owner {
                    return Err(SourceError::Unauthorized(format!(
                        "cannot move {} to another owner",
                        E::TABLE
                    )));
                }
                let (previous, stored) = self.with_db(|db| {
                    let previous = owned_row::<E>(db, owner, row.id())?;
                    check_patient_ref(db, owner, &row)?;
                    if !E::update(db, &row)? {
                        return Err(DbError::NotFound(row.id().to_string()));
                    }
                    Ok((previous, stored_row::<E>(db, row.id())?))
                })?;
                self.publish_row::<E>(|| RawChangeEvent::update(&stored, Some(&previous)));
                Ok(Some(stored))
            }
            Mutation::Delete(id) => {
                let (previous, cascaded) = self.with_db(|db| {
                    let previous = owned_row::<E>(db, owner, id)?;
                    let mut cascaded = Vec::new();
                    if E::TABLE == Table::Patients {
                        for table in [Table::MedicationSchedules, Table::ActivityLog] {
                            for (child, child_owner) in dependents(db, table, id)? {
                                cascaded.push((table, child, child_owner));
                            }
                        }
                    }
                    if !E::delete(db, id)? {
                        return Err(DbError::NotFound(id.to_string()));
                    }
                    Ok((previous, cascaded))
                })?;

                for (table, child, child_owner) in cascaded {
                    self.publish_id_delete(table, child, child_owner);
                }
                self.publish_row::<E>(|| RawChangeEvent::delete(&previous));
                Ok(None)
            }
        }
    }
}
