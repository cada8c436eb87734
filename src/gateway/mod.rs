/// Remote mutation gateway
///
/// Thin request/response contract between the synchronization core and the
/// server. Every call is a single round trip; failures are reported once and
/// never retried here.

pub mod graphql;
pub mod memory;

use crate::{
    error::Result,
    feed::{Cursor, NotificationPage},
    settings::PreferencePatch,
};
use async_trait::async_trait;

pub use graphql::{GraphQLConfig, GraphQLGateway};
pub use memory::MemoryGateway;

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Persist exactly the keys carried by `patch`
    async fn persist_preferences(&self, patch: &PreferencePatch) -> Result<()>;

    /// Fetch the page after `cursor` (first page when `None`)
    async fn fetch_notification_page(
        &self,
        cursor: Option<&Cursor>,
        page_size: u32,
    ) -> Result<NotificationPage>;

    /// Mark every notification as read
    async fn mark_notifications_read(&self) -> Result<()>;
}
