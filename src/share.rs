/// Comment sharing through an injected platform capability
///
/// When the platform can share natively the text goes straight to it;
/// otherwise the payload is kept here for an in-app share surface.

use crate::{
    error::Result,
    types::{Event, EventBus, Origin},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Platform share capability
#[async_trait]
pub trait ShareProvider: Send + Sync {
    /// Whether native sharing exists on this platform
    fn is_available(&self) -> bool;

    /// Hand `text` to the platform; an error usually means the user cancelled
    async fn share(&self, text: &str) -> Result<()>;
}

/// Provider for platforms without native sharing
#[derive(Debug, Default)]
pub struct NoShareProvider;

#[async_trait]
impl ShareProvider for NoShareProvider {
    fn is_available(&self) -> bool {
        false
    }

    async fn share(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPost {
    pub id: String,
    pub title: String,
    pub comments_permalink: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedComment {
    pub id: String,
}

/// Everything an in-app share surface needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub post: SharedPost,
    pub comment: SharedComment,
}

impl SharePayload {
    /// Permalink anchored at the comment
    pub fn link(&self) -> String {
        format!("{}#c-{}", self.post.comments_permalink, self.comment.id)
    }

    pub fn text(&self) -> String {
        format!("{}\n{}", self.post.title, self.link())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The platform accepted the share
    Shared,
    /// The platform share failed or was cancelled; nothing else happens
    Dismissed,
    /// No native sharing; present this payload instead
    Fallback(SharePayload),
}

pub struct ShareComment {
    provider: Arc<dyn ShareProvider>,
    events: EventBus,
    origin: Origin,
    pending: RwLock<Option<SharePayload>>,
}

impl ShareComment {
    pub fn new(provider: Arc<dyn ShareProvider>, events: EventBus, origin: Origin) -> Self {
        Self {
            provider,
            events,
            origin,
            pending: RwLock::new(None),
        }
    }

    pub async fn open(&self, comment: SharedComment, post: SharedPost) -> ShareOutcome {
        let payload = SharePayload { post, comment };

        if !self.provider.is_available() {
            *self.pending.write().await = Some(payload.clone());
            return ShareOutcome::Fallback(payload);
        }

        match self.provider.share(&payload.text()).await {
            Ok(()) => {
                self.events
                    .emit(Event::PostShared {
                        post_id: payload.post.id,
                        comment_id: payload.comment.id,
                        origin: self.origin,
                    })
                    .await;
                ShareOutcome::Shared
            }
            Err(e) => {
                debug!("Native share dismissed: {}", e);
                ShareOutcome::Dismissed
            }
        }
    }

    /// Payload awaiting the in-app share surface
    pub async fn pending(&self) -> Option<SharePayload> {
        self.pending.read().await.clone()
    }

    pub async fn close(&self) {
        *self.pending.write().await = None;
    }
}
