//! Live synchronization of owner-scoped collections.
//!
//! A [`SyncedCollection`] keeps a [`LocalMirror`] consistent with a
//! [`RemoteSource`]: bulk read, change feed, reducer. Local writes go through
//! the [`OptimisticMutator`].

mod collection;
mod event;
mod mirror;
mod mutator;
mod reducer;
mod source;

pub use collection::*;
pub use event::*;
pub use mirror::*;
pub use mutator::*;
pub use reducer::*;
pub use source::*;

use thiserror::Error;
use uuid::Uuid;

use crate::models::TransitionError;

/// Errors surfaced to pages using a synchronized collection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Live updates interrupted")]
    SubscriptionDropped,

    #[error("Malformed change event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("No row with id {0}")]
    NotFound(Uuid),

    #[error("Collection is closed")]
    Closed,
}

pub type SyncResult<T> = Result<T, SyncError>;

/// What a page does about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Keep the mirror, offer a retry
    Retry,
    /// Session is no longer valid
    SignOut,
    /// Show next to the form, keep the mirror
    Inline,
    /// Mark stale and resubscribe with backoff
    Resubscribe,
    Ignore,
}

impl SyncError {
    pub fn recovery(&self) -> Recovery {
        match self {
            SyncError::SourceUnavailable(_) => Recovery::Retry,
            SyncError::Unauthorized(_) => Recovery::SignOut,
            SyncError::WriteRejected(_)
            | SyncError::InvalidTransition(_)
            | SyncError::NotFound(_) => Recovery::Inline,
            SyncError::SubscriptionDropped => Recovery::Resubscribe,
            SyncError::MalformedEvent(_) | SyncError::Closed => Recovery::Ignore,
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => SyncError::SourceUnavailable(msg),
            SourceError::Unauthorized(msg) => SyncError::Unauthorized(msg),
            SourceError::WriteRejected(msg) => SyncError::WriteRejected(msg),
            // A lagging subscriber has a gap only a fresh read can fill.
            SourceError::SubscriptionDropped | SourceError::Lagged(_) => {
                SyncError::SubscriptionDropped
            }
        }
    }
}

impl From<EventError> for SyncError {
    fn from(err: EventError) -> Self {
        SyncError::MalformedEvent(err.to_string())
    }
}
