use crate::{error::Error, feed::NotificationType, settings::PreferenceKey};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::RwLock;

/// Event handler function type; returning `false` stops the fan-out
pub type EventHandler = Box<dyn Fn(Event) -> bool + Send + Sync>;

/// Where a user interaction originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "non real time")]
    NonRealTime,
    #[serde(rename = "real time")]
    RealTime,
    #[serde(rename = "article page")]
    ArticlePage,
    #[serde(rename = "article modal")]
    ArticleModal,
}

/// All events emitted by the synchronization core
#[derive(Debug, Clone)]
pub enum Event {
    /// Preferences changed optimistically
    PreferencesChanged { keys: Vec<PreferenceKey> },
    /// A failed persist was undone locally
    PreferencesRolledBack { keys: Vec<PreferenceKey>, error: Error },
    /// Preferences were replaced by a remote snapshot
    PreferencesReplaced,
    /// A full re-send of preferences failed
    PreferencesSyncFailed { error: Error },

    /// First page of a feed lifetime arrived
    NotificationListOpened,
    /// A page was appended to the feed
    NotificationPageAppended { records: usize, has_next_page: bool },
    /// A page request failed; the feed kept its content
    NotificationFetchFailed { error: Error },
    /// The remote mark-read effect succeeded
    UnreadCleared,
    /// A notification was activated by the user
    NotificationClicked {
        id: String,
        kind: NotificationType,
        origin: Origin,
    },

    /// A comment was shared through the native share capability
    PostShared {
        post_id: String,
        comment_id: String,
        origin: Origin,
    },
}

/// Fan-out of events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub async fn add_handler(&self, handler: EventHandler) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Deliver `event` to handlers in registration order
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if !handler(event.clone()) {
                break;
            }
        }
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
