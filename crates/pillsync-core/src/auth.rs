//! Session collaborator. Credentials and session lifecycle belong to the
//! host's auth provider; this module only names what the core needs.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::OwnerId;
use crate::sync::{Recovery, SyncError};

pub const DEFAULT_ROLE: &str = "Caregiver";

/// Auth provider errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Auth provider error: {0}")]
    Provider(String),
}

/// Editable profile metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub display_name: Option<String>,
    pub role: Option<String>,
}

/// A signed-in caregiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub owner_id: OwnerId,
    pub email: String,
    #[serde(default)]
    pub profile: Profile,
}

impl Session {
    pub fn new(owner_id: OwnerId, email: impl Into<String>) -> Self {
        Self {
            owner_id,
            email: email.into(),
            profile: Profile::default(),
        }
    }

    /// Profile name, or the local part of the email.
    pub fn display_name(&self) -> String {
        self.profile
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.email
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
    }

    pub fn role(&self) -> &str {
        self.profile.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }
}

/// Host auth provider.
#[allow(async_fn_in_trait)]
pub trait AuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_session(&self) -> Option<Session>;

    /// Observe sign-in and sign-out. The receiver starts at the current
    /// session.
    fn on_session_change(&self) -> watch::Receiver<Option<Session>>;

    async fn update_profile(&self, profile: Profile) -> Result<Session, AuthError>;
}

/// Apply the page-level policy for `error`, signing out when the session can
/// no longer be trusted. Returns the policy so the caller can render it.
pub async fn handle_sync_error<A: AuthProvider>(auth: &A, error: &SyncError) -> Recovery {
    let recovery = error.recovery();
    if recovery == Recovery::SignOut {
        info!(error = %error, "Signing out after authorization failure");
        if let Err(e) = auth.sign_out().await {
            warn!(error = %e, "Sign-out failed");
        }
    }
    recovery
}
