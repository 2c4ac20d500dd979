//! Dispenser simulator and demo data for pillsync-core.
//!
//! Stands in for the hardware side of the system: seeds an owner's
//! patients, schedules and devices, and writes device-origin events straight
//! to a [`SqliteSource`](pillsync_core::SqliteSource) so live collections see
//! them arrive on their change feeds.

pub mod auth;
pub mod device;
pub mod seed;

pub use auth::*;
pub use device::*;
pub use seed::*;

use pillsync_core::models::TransitionError;
use pillsync_core::sync::SourceError;
use thiserror::Error;
use uuid::Uuid;

/// Simulator errors.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("No row with id {0}")]
    NotFound(Uuid),
}

pub type SimResult<T> = Result<T, SimError>;
