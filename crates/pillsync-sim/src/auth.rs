//! Fixed demo account.

use std::sync::Mutex;

use pillsync_core::auth::{AuthError, AuthProvider, Profile, Session};
use pillsync_core::models::OwnerId;
use tokio::sync::watch;
use tracing::info;

pub const DEMO_EMAIL: &str = "demo@smartpill.com";
pub const DEMO_PASSWORD: &str = "demo123";

/// Accepts exactly one email and password pair.
pub struct StaticAuth {
    account: Mutex<Session>,
    password: String,
    tx: watch::Sender<Option<Session>>,
}

impl StaticAuth {
    pub fn new(owner: OwnerId, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: Mutex::new(Session::new(owner, email)),
            password: password.into(),
            tx: watch::channel(None).0,
        }
    }

    /// The demo caregiver with a fresh owner id.
    pub fn demo() -> Self {
        let auth = Self::new(OwnerId::new(), DEMO_EMAIL, DEMO_PASSWORD);
        if let Ok(mut account) = auth.account.lock() {
            account.profile.display_name = Some("Demo Caregiver".into());
        }
        auth
    }

    fn account(&self) -> Result<Session, AuthError> {
        self.account
            .lock()
            .map(|account| account.clone())
            .map_err(|e| AuthError::Provider(format!("Lock poisoned: {}", e)))
    }
}

impl AuthProvider for StaticAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let account = self.account()?;
        if !email.trim().eq_ignore_ascii_case(&account.email) || password != self.password {
            return Err(AuthError::InvalidCredentials);
        }
        info!(owner = %account.owner_id, "Signed in");
        self.tx.send_replace(Some(account.clone()));
        Ok(account)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.tx.send_replace(None) {
            info!(owner = %session.owner_id, "Signed out");
        }
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    async fn update_profile(&self, profile: Profile) -> Result<Session, AuthError> {
        if self.current_session().is_none() {
            return Err(AuthError::NotSignedIn);
        }
        let session = {
            let mut account = self
                .account
                .lock()
                .map_err(|e| AuthError::Provider(format!("Lock poisoned: {}", e)))?;
            account.profile = profile;
            account.clone()
        };
        self.tx.send_replace(Some(session.clone()));
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_sign_in_and_out() {
        let auth = StaticAuth::demo();
        let mut changes = auth.on_session_change();
        assert!(auth.current_session().is_none());

        let wrong = auth.sign_in(DEMO_EMAIL, "nope").await;
        assert_eq!(wrong, Err(AuthError::InvalidCredentials));

        let session = auth.sign_in(" Demo@SmartPill.com ", DEMO_PASSWORD).await.unwrap();
        assert_eq!(session.display_name(), "Demo Caregiver");
        assert_eq!(session.role(), "Caregiver");
        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().clone(), Some(session));

        auth.sign_out().await.unwrap();
        assert!(auth.current_session().is_none());
    }

    #[tokio::test]
    async fn test_profile_update_requires_session() {
        let auth = StaticAuth::demo();
        let profile = Profile {
            display_name: Some("Pat".into()),
            role: Some("Nurse".into()),
        };
        assert_eq!(
            auth.update_profile(profile.clone()).await,
            Err(AuthError::NotSignedIn)
        );

        auth.sign_in(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
        let session = auth.update_profile(profile).await.unwrap();
        assert_eq!(session.display_name(), "Pat");
        assert_eq!(auth.current_session().map(|s| s.role().to_string()), Some("Nurse".into()));
    }
}
