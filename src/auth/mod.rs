/// Authentication state as seen by the synchronization core
///
/// Tokens and the login flow itself live outside this crate; the core only
/// needs to know whether a user is present and how to ask for a login.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Current authentication state of the session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No user is logged in
    #[default]
    Anonymous,
    /// A user is logged in
    Authenticated { user_id: String },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { user_id } => Some(user_id),
            AuthState::Anonymous => None,
        }
    }
}

/// What triggered a login prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthTrigger {
    Settings,
    Notifications,
    Comment,
}

/// External collaborator that shows the login prompt
pub trait LoginPrompt: Send + Sync {
    fn show_login(&self, trigger: AuthTrigger);
}

/// Login prompt that only records the triggers it received
#[derive(Debug, Default)]
pub struct RecordingLoginPrompt {
    triggers: Mutex<Vec<AuthTrigger>>,
}

impl RecordingLoginPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triggers(&self) -> Vec<AuthTrigger> {
        self.triggers
            .lock()
            .map(|triggers| triggers.clone())
            .unwrap_or_default()
    }
}

impl LoginPrompt for RecordingLoginPrompt {
    fn show_login(&self, trigger: AuthTrigger) {
        tracing::debug!("Login requested by {:?}", trigger);
        if let Ok(mut triggers) = self.triggers.lock() {
            triggers.push(trigger);
        }
    }
}
