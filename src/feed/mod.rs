/// Notification feed
///
/// Cursor-paginated notification records with unread tracking:
/// - Closed set of notification types
/// - Immutable pages as returned by the remote gateway
/// - Pure helpers over loaded pages (unread scan, consumer-facing filter)

pub mod aggregator;
pub mod badge;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use aggregator::*;
pub use badge::*;

/// Notification type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CommunityPicksFailed,
    CommunityPicksSucceeded,
    CommunityPicksGranted,
    ArticlePicked,
    ArticleNewComment,
    ArticleUpvoteMilestone,
    ArticleReportApproved,
    ArticleAnalytics,
    SourceApproved,
    SourceRejected,
    CommentMention,
    CommentReply,
    CommentUpvoteMilestone,
    SquadPostAdded,
    SquadMemberJoined,
    SquadNewComment,
    SquadReply,
    SquadPostViewed,
    SquadAccess,
    SquadBlocked,
    #[serde(rename = "squad_subscribe_to_notification")]
    SquadSubscribeNotification,
    PromotedToAdmin,
    DemotedToMember,
    PromotedToModerator,
    System,
    /// Types added on the server after this client was built
    #[serde(other)]
    Unknown,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        f.write_str(&name)
    }
}

/// A single notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Absent while unread
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    /// Type-specific fields, passed through to rendering untouched
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl NotificationRecord {
    pub fn new(id: impl Into<String>, kind: NotificationType) -> Self {
        Self {
            id: id.into(),
            kind,
            read_at: None,
            payload: serde_json::Map::new(),
        }
    }

    pub fn read(mut self, at: DateTime<Utc>) -> Self {
        self.read_at = Some(at);
        self
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Opaque continuation token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of notifications; immutable once fetched
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationPage {
    pub records: Vec<NotificationRecord>,
    /// Present when a further page exists
    pub next_cursor: Option<Cursor>,
}

impl NotificationPage {
    pub fn new(records: Vec<NotificationRecord>, next_cursor: Option<Cursor>) -> Self {
        Self { records, next_cursor }
    }

    pub fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Viewer facts consulted when records are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewerContext {
    /// Viewer already subscribed to squad notifications
    pub is_subscribed: bool,
}

impl ViewerContext {
    pub fn new(is_subscribed: bool) -> Self {
        Self { is_subscribed }
    }

    /// Whether `record` is excluded from consumer-facing output
    pub fn hides(&self, record: &NotificationRecord) -> bool {
        self.is_subscribed && record.kind == NotificationType::SquadSubscribeNotification
    }
}

/// True iff any loaded record is unread
pub fn compute_has_unread(pages: &[NotificationPage]) -> bool {
    pages
        .iter()
        .any(|page| page.records.iter().any(NotificationRecord::is_unread))
}

/// Records in page order, without the ones `viewer` hides
pub fn visible_records<'a>(
    pages: &'a [NotificationPage],
    viewer: &'a ViewerContext,
) -> impl Iterator<Item = &'a NotificationRecord> + 'a {
    pages
        .iter()
        .flat_map(|page| page.records.iter())
        .filter(move |record| !viewer.hides(record))
}
