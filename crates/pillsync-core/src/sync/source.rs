//! The remote data source seam and its subscription handles.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::{ChangeEvent, RawChangeEvent};
use crate::models::{Entity, OrderBy, OwnerId, Table};

/// Failures reported by a remote source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Remote source unavailable: {0}")]
    Unavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Change feed closed")]
    SubscriptionDropped,

    #[error("Subscriber fell behind and missed {0} events")]
    Lagged(u64),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// A write issued against the remote source.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<E> {
    Insert(E),
    Update(E),
    Delete(Uuid),
}

impl<E: Entity> Mutation<E> {
    pub fn id(&self) -> Uuid {
        match self {
            Mutation::Insert(e) | Mutation::Update(e) => e.id(),
            Mutation::Delete(id) => *id,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update(_) => "update",
            Mutation::Delete(_) => "delete",
        }
    }

    /// The change this write should produce in a mirror.
    pub fn as_event(&self) -> ChangeEvent<E> {
        match self {
            Mutation::Insert(e) => ChangeEvent::insert(e.clone()),
            Mutation::Update(e) => ChangeEvent::update(e.clone()),
            Mutation::Delete(id) => ChangeEvent::delete(*id),
        }
    }
}

/// Owner-scoped reads, writes and change feeds for one entity type.
///
/// Every call takes the owner explicitly. Delivery order of change events is
/// not causal; consumers must apply them idempotently by id.
#[allow(async_fn_in_trait)]
pub trait RemoteSource<E: Entity> {
    /// All of the owner's rows. An empty table is `Ok(vec![])`.
    async fn fetch_all(&self, owner: OwnerId, order: OrderBy) -> SourceResult<Vec<E>>;

    fn subscribe(&self, owner: OwnerId) -> SourceResult<Subscription<E>>;

    /// Release a subscription. Consumes the handle so it cannot be released
    /// twice.
    fn unsubscribe(&self, subscription: Subscription<E>) {
        subscription.release();
    }

    /// Apply a write and return the stored row (`None` for deletes).
    async fn mutate(&self, owner: OwnerId, mutation: Mutation<E>) -> SourceResult<Option<E>>;
}

/// Bookkeeping for live subscriptions, shared with every handle.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, (Table, OwnerId)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, (Table, OwnerId)>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn register(&self, table: Table, owner: OwnerId) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, (table, owner));
        id
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Number of subscriptions not yet released.
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    pub fn active_for(&self, table: Table) -> usize {
        self.lock().values().filter(|(t, _)| *t == table).count()
    }
}

/// A live change feed for one owner and one table.
pub struct Subscription<E: Entity> {
    id: u64,
    owner: OwnerId,
    receiver: broadcast::Receiver<RawChangeEvent>,
    registry: Arc<SubscriptionRegistry>,
    released: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> std::fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("table", &E::TABLE)
            .field("owner", &self.owner)
            .finish()
    }
}

impl<E: Entity> Subscription<E> {
    pub fn new(
        owner: OwnerId,
        receiver: broadcast::Receiver<RawChangeEvent>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        let id = registry.register(E::TABLE, owner);
        debug!(table = %E::TABLE, owner = %owner, subscription = id, "Subscribed");
        Self {
            id,
            owner,
            receiver,
            registry,
            released: false,
            _entity: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Wait for the next change belonging to this owner.
    pub async fn recv(&mut self) -> SourceResult<ChangeEvent<E>> {
        loop {
            match self.receiver.recv().await {
                Ok(raw) => {
                    if let Some(event) = self.accept(raw) {
                        return Ok(event);
                    }
                }
                Err(RecvError::Closed) => return Err(SourceError::SubscriptionDropped),
                Err(RecvError::Lagged(missed)) => return Err(SourceError::Lagged(missed)),
            }
        }
    }

    /// Next buffered change, if any, without waiting.
    pub fn try_recv(&mut self) -> SourceResult<Option<ChangeEvent<E>>> {
        loop {
            match self.receiver.try_recv() {
                Ok(raw) => {
                    if let Some(event) = self.accept(raw) {
                        return Ok(Some(event));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(SourceError::SubscriptionDropped),
                Err(TryRecvError::Lagged(missed)) => return Err(SourceError::Lagged(missed)),
            }
        }
    }

    fn accept(&self, raw: RawChangeEvent) -> Option<ChangeEvent<E>> {
        if !raw.concerns(self.owner) {
            return None;
        }
        match raw.decode::<E>() {
            Ok(event) => event.scoped_to(self.owner),
            Err(e) => {
                warn!(
                    table = %E::TABLE,
                    owner = %self.owner,
                    operation = %raw.operation,
                    error = %e,
                    "Dropping malformed change event"
                );
                None
            }
        }
    }

    /// Stop receiving and deregister.
    pub fn release(mut self) {
        self.released = true;
        self.registry.remove(self.id);
        debug!(table = %E::TABLE, owner = %self.owner, subscription = self.id, "Unsubscribed");
    }
}

impl<E: Entity> Drop for Subscription<E> {
    fn drop(&mut self) {
        if !self.released && self.registry.remove(self.id) {
            warn!(
                table = %E::TABLE,
                owner = %self.owner,
                subscription = self.id,
                "Subscription dropped without unsubscribe"
            );
        }
    }
}
