//! User-facing notification collaborators.
//!
//! The host supplies real implementations (toasts, system notifications).
//! Both are best effort: nothing here can fail a write.

use std::sync::Mutex;

use tracing::{error, info};

/// System notification permission, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// Not asked yet
    Default,
}

pub trait Notifier {
    fn permission(&self) -> Permission;

    fn show(&self, title: &str, body: &str);
}

/// Transient success/error messages.
pub trait Feedback {
    fn success(&self, message: &str);

    fn error(&self, message: &str);
}

/// A notifier that never has permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn permission(&self) -> Permission {
        Permission::Denied
    }

    fn show(&self, _title: &str, _body: &str) {}
}

/// Feedback routed to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn success(&self, message: &str) {
        info!(feedback = "success", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(feedback = "error", "{}", message);
    }
}

/// Something shown to the user, captured for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Success(String),
    Error(String),
    Notification { title: String, body: String },
}

/// Records everything it is asked to show. Used by the simulator and tests.
#[derive(Debug)]
pub struct RecordingNotifier {
    permission: Permission,
    shown: Mutex<Vec<Shown>>,
}

impl RecordingNotifier {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            shown: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, item: Shown) {
        match self.shown.lock() {
            Ok(mut shown) => shown.push(item),
            Err(poisoned) => poisoned.into_inner().push(item),
        }
    }

    /// Everything shown so far, oldest first.
    pub fn shown(&self) -> Vec<Shown> {
        match self.shown.lock() {
            Ok(shown) => shown.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.shown()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Notification { title, body } => Some((title, body)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new(Permission::Granted)
    }
}

impl Notifier for RecordingNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn show(&self, title: &str, body: &str) {
        self.push(Shown::Notification {
            title: title.to_string(),
            body: body.to_string(),
        });
    }
}

impl Feedback for RecordingNotifier {
    fn success(&self, message: &str) {
        self.push(Shown::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Shown::Error(message.to_string()));
    }
}
