//! One generic synchronized collection, parameterized by entity type.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event::ChangeEvent;
use super::mirror::LocalMirror;
use super::source::{RemoteSource, SourceError, Subscription};
use super::{SyncError, SyncResult};
use crate::config::{ResubscribePolicy, SyncConfig};
use crate::models::{Entity, OwnerId};

/// Lifecycle of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Idle,
    Loading,
    /// Mirror loaded and change feed attached
    Live,
    /// Mirror kept, but the feed or the last read failed
    Stale,
    Closed,
}

/// A local mirror kept consistent with a remote source for one owner.
///
/// `open` subscribes before the bulk read so no change committed in between
/// is lost; replays of rows already in the read are idempotent.
pub struct SyncedCollection<'a, S: RemoteSource<E>, E: Entity> {
    source: &'a S,
    owner: OwnerId,
    mirror: LocalMirror<E>,
    subscription: Option<Subscription<E>>,
    status: CollectionStatus,
    resubscribe: ResubscribePolicy,
    last_error: Option<SyncError>,
}

impl<'a, S: RemoteSource<E>, E: Entity> SyncedCollection<'a, S, E> {
    /// An idle collection. Nothing is read until [`open`](Self::open).
    pub fn new(source: &'a S, owner: OwnerId, config: &SyncConfig) -> Self {
        Self {
            source,
            owner,
            mirror: LocalMirror::new(),
            subscription: None,
            status: CollectionStatus::Idle,
            resubscribe: config.resubscribe,
            last_error: None,
        }
    }

    /// Create and open in one step.
    pub async fn open(source: &'a S, owner: OwnerId, config: &SyncConfig) -> SyncResult<Self> {
        let mut collection = Self::new(source, owner, config);
        collection.start().await?;
        Ok(collection)
    }

    /// Attach the change feed and load the initial rows.
    pub async fn start(&mut self) -> SyncResult<()> {
        if self.status == CollectionStatus::Closed {
            return Err(SyncError::Closed);
        }
        self.status = CollectionStatus::Loading;
        info!(table = %E::TABLE, owner = %self.owner, "Opening collection");

        self.attach()?;
        self.refresh().await?;
        self.status = CollectionStatus::Live;
        Ok(())
    }

    fn attach(&mut self) -> SyncResult<()> {
        if let Some(old) = self.subscription.take() {
            self.source.unsubscribe(old);
        }
        match self.source.subscribe(self.owner) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Re-read every row. On failure the mirror is left as it was.
    pub async fn refresh(&mut self) -> SyncResult<usize> {
        if self.status == CollectionStatus::Closed {
            return Err(SyncError::Closed);
        }
        match self.source.fetch_all(self.owner, E::default_order()).await {
            Ok(rows) => {
                self.mirror.replace_all(rows);
                self.last_error = None;
                debug!(table = %E::TABLE, owner = %self.owner, rows = self.mirror.len(), "Loaded rows");
                Ok(self.mirror.len())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Apply every change already buffered on the feed. Returns how many
    /// changed the mirror.
    pub fn pump(&mut self) -> SyncResult<usize> {
        if self.status == CollectionStatus::Closed {
            return Ok(0);
        }
        let mut changed = 0;
        loop {
            let next = match self.subscription.as_mut() {
                Some(subscription) => subscription.try_recv(),
                None => return Err(SyncError::SubscriptionDropped),
            };
            match next {
                Ok(Some(event)) => {
                    if self.apply(&event) {
                        changed += 1;
                    }
                }
                Ok(None) => return Ok(changed),
                Err(e) => return Err(self.feed_failed(e)),
            }
        }
    }

    /// Wait for the next change, apply it and return it.
    pub async fn next_change(&mut self) -> SyncResult<ChangeEvent<E>> {
        if self.status == CollectionStatus::Closed {
            return Err(SyncError::Closed);
        }
        let next = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => return Err(SyncError::SubscriptionDropped),
        };
        match next {
            Ok(event) => {
                self.apply(&event);
                Ok(event)
            }
            Err(e) => Err(self.feed_failed(e)),
        }
    }

    /// Resubscribe and re-read with bounded linear backoff.
    pub async fn recover(&mut self) -> SyncResult<()> {
        if self.status == CollectionStatus::Closed {
            return Err(SyncError::Closed);
        }
        let attempts = self.resubscribe.max_attempts.max(1);
        for attempt in 1..=attempts {
            tokio::time::sleep(self.resubscribe.delay_for(attempt)).await;
            info!(table = %E::TABLE, owner = %self.owner, attempt, "Resubscribing");

            if self.attach().is_ok() && self.refresh().await.is_ok() {
                self.status = CollectionStatus::Live;
                return Ok(());
            }
        }

        let err = self
            .last_error
            .clone()
            .unwrap_or(SyncError::SubscriptionDropped);
        error!(
            table = %E::TABLE,
            owner = %self.owner,
            attempts,
            error = %err,
            "Giving up on live updates"
        );
        Err(err)
    }

    /// Apply one change to the mirror. Ignored once closed or when the row
    /// belongs to another owner.
    pub fn apply(&mut self, event: &ChangeEvent<E>) -> bool {
        if self.status == CollectionStatus::Closed {
            debug!(table = %E::TABLE, operation = event.operation(), "Ignoring change on closed collection");
            return false;
        }
        if let Some(owner) = event.owner_id() {
            if owner != self.owner {
                warn!(table = %E::TABLE, owner = %self.owner, row_owner = %owner, "Ignoring change for another owner");
                return false;
            }
        }
        self.mirror.apply(event)
    }

    /// Release the change feed. Further events are no-ops. Idempotent.
    pub fn close(&mut self) {
        if self.status == CollectionStatus::Closed {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            self.source.unsubscribe(subscription);
        }
        self.status = CollectionStatus::Closed;
        info!(table = %E::TABLE, owner = %self.owner, "Closed collection");
    }

    pub fn items(&self) -> &[E] {
        self.mirror.items()
    }

    pub fn get(&self, id: Uuid) -> Option<&E> {
        self.mirror.get(id)
    }

    pub fn mirror(&self) -> &LocalMirror<E> {
        &self.mirror
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.status == CollectionStatus::Closed
    }

    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    pub(crate) fn source(&self) -> &'a S {
        self.source
    }

    pub(crate) fn mirror_mut(&mut self) -> &mut LocalMirror<E> {
        &mut self.mirror
    }

    fn feed_failed(&mut self, err: SourceError) -> SyncError {
        warn!(table = %E::TABLE, owner = %self.owner, error = %err, "Change feed failed");
        if let Some(subscription) = self.subscription.take() {
            self.source.unsubscribe(subscription);
        }
        self.fail(err.into())
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        if self.status != CollectionStatus::Closed {
            self.status = CollectionStatus::Stale;
        }
        self.last_error = Some(err.clone());
        err
    }
}

impl<S: RemoteSource<E>, E: Entity> Drop for SyncedCollection<'_, S, E> {
    fn drop(&mut self) {
        self.close();
    }
}
