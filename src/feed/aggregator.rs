/// Notification feed aggregator
///
/// Owns the pages of one feed lifetime. Fetches are single-flight; the
/// remote mark-read effect is requested at most once per lifetime, the first
/// time a successful fetch leaves an unread record loaded. Ending a lifetime
/// (reload or dispose) makes every completion from it a no-op.
///
/// The page request runs on its own task, so a caller that stops waiting
/// does not leave the feed stuck in flight; the request still settles it.

use crate::{
    error::{Error, Result},
    feed::{
        compute_has_unread, visible_records, Cursor, NotificationPage, NotificationRecord,
        NotificationType, UnreadBadge, ViewerContext,
    },
    gateway::RemoteGateway,
    types::{Event, EventBus, Origin},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::RwLock,
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, info, warn};

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Records requested per page
    pub page_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

/// Feed lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Empty,
    Loading,
    Loaded { has_next_page: bool },
    Disposed,
}

/// Result of a page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was appended
    Appended { records: usize, has_next_page: bool },
    /// The last page is already loaded; nothing was requested
    Exhausted,
    /// The cursor does not continue the loaded pages; nothing was requested
    Stale,
}

/// Read-only view of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub pages: Vec<NotificationPage>,
    pub state: FeedState,
    pub fetching: bool,
    pub has_unread: bool,
    pub mark_read_requested: bool,
}

impl FeedSnapshot {
    pub fn total_records(&self) -> usize {
        self.pages.iter().map(|page| page.records.len()).sum()
    }
}

enum NextRequest {
    First,
    After(Cursor),
    End,
}

struct FeedLifetime {
    generation: u64,
    state: FeedState,
    pages: Vec<NotificationPage>,
    fetching: bool,
    list_opened: bool,
    mark_read_requested: bool,
    fetch_task: Option<AbortHandle>,
    mark_read_task: Option<JoinHandle<()>>,
}

impl FeedLifetime {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            state: FeedState::Empty,
            pages: Vec::new(),
            fetching: false,
            list_opened: false,
            mark_read_requested: false,
            fetch_task: None,
            mark_read_task: None,
        }
    }

    fn next_request(&self) -> NextRequest {
        match self.pages.last() {
            None => NextRequest::First,
            Some(page) => match &page.next_cursor {
                Some(cursor) => NextRequest::After(cursor.clone()),
                None => NextRequest::End,
            },
        }
    }

    fn settled_state(&self) -> FeedState {
        match self.pages.last() {
            None => FeedState::Empty,
            Some(page) => FeedState::Loaded {
                has_next_page: page.has_next_page(),
            },
        }
    }

    /// End this lifetime, cancelling its pending request and effect
    fn end(&mut self) {
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
        if let Some(task) = self.mark_read_task.take() {
            task.abort();
        }
    }
}

/// Cursor-paginated notification feed
#[derive(Clone)]
pub struct NotificationFeed {
    lifetime: Arc<RwLock<FeedLifetime>>,
    gateway: Arc<dyn RemoteGateway>,
    badge: UnreadBadge,
    events: EventBus,
    config: FeedConfig,
}

impl NotificationFeed {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        badge: UnreadBadge,
        events: EventBus,
        config: FeedConfig,
    ) -> Self {
        Self {
            lifetime: Arc::new(RwLock::new(FeedLifetime::new(0))),
            gateway,
            badge,
            events,
            config,
        }
    }

    /// Fetch the page following the loaded ones
    pub async fn fetch_next_page(&self) -> Result<FetchOutcome> {
        let request = {
            let mut lifetime = self.lifetime.write().await;
            Self::check_idle(&lifetime)?;
            let cursor = match lifetime.next_request() {
                NextRequest::First => None,
                NextRequest::After(cursor) => Some(cursor),
                NextRequest::End => return Ok(FetchOutcome::Exhausted),
            };
            self.begin_fetch(&mut lifetime, cursor)
        };

        Self::join_fetch(request).await
    }

    /// Fetch the page after `cursor`, which must continue the loaded pages
    pub async fn fetch_page(&self, cursor: Option<Cursor>) -> Result<FetchOutcome> {
        let request = {
            let mut lifetime = self.lifetime.write().await;
            Self::check_idle(&lifetime)?;
            match (lifetime.next_request(), &cursor) {
                (NextRequest::End, _) => return Ok(FetchOutcome::Exhausted),
                (NextRequest::First, None) => {}
                (NextRequest::After(expected), Some(given)) if expected == *given => {}
                _ => {
                    debug!("Ignoring page request for stale cursor {:?}", cursor);
                    return Ok(FetchOutcome::Stale);
                }
            }
            self.begin_fetch(&mut lifetime, cursor)
        };

        Self::join_fetch(request).await
    }

    fn check_idle(lifetime: &FeedLifetime) -> Result<()> {
        if lifetime.state == FeedState::Disposed {
            return Err(Error::FeedDisposed);
        }
        if lifetime.fetching {
            return Err(Error::FetchInFlight);
        }
        Ok(())
    }

    fn begin_fetch(
        &self,
        lifetime: &mut FeedLifetime,
        cursor: Option<Cursor>,
    ) -> JoinHandle<Result<FetchOutcome>> {
        lifetime.fetching = true;
        if lifetime.pages.is_empty() {
            lifetime.state = FeedState::Loading;
        }

        let feed = self.clone();
        let generation = lifetime.generation;
        let task = tokio::spawn(async move { feed.complete_fetch(generation, cursor).await });
        lifetime.fetch_task = Some(task.abort_handle());
        task
    }

    async fn join_fetch(task: JoinHandle<Result<FetchOutcome>>) -> Result<FetchOutcome> {
        match task.await {
            Ok(result) => result,
            // Only an ended lifetime aborts its request
            Err(e) if e.is_cancelled() => Err(Error::FeedDisposed),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    async fn complete_fetch(&self, generation: u64, cursor: Option<Cursor>) -> Result<FetchOutcome> {
        debug!("Requesting notifications after {:?}", cursor);
        let result = self
            .gateway
            .fetch_notification_page(cursor.as_ref(), self.config.page_size)
            .await;

        let mut lifetime = self.lifetime.write().await;
        if lifetime.generation != generation || lifetime.state == FeedState::Disposed {
            debug!("Dropping page completion from an ended feed lifetime");
            return Err(Error::FeedDisposed);
        }
        lifetime.fetching = false;
        lifetime.fetch_task = None;

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                lifetime.state = lifetime.settled_state();
                drop(lifetime);
                warn!("Notification page request failed ({}): {}", error.kind(), error);
                self.events
                    .emit(Event::NotificationFetchFailed { error: error.clone() })
                    .await;
                return Err(error);
            }
        };

        let records = page.records.len();
        let has_next_page = page.has_next_page();
        lifetime.pages.push(page);
        lifetime.state = FeedState::Loaded { has_next_page };

        let first_page = !lifetime.list_opened;
        lifetime.list_opened = true;

        if !lifetime.mark_read_requested && compute_has_unread(&lifetime.pages) {
            lifetime.mark_read_requested = true;
            lifetime.mark_read_task = Some(self.spawn_mark_read(generation));
        }
        drop(lifetime);

        debug!("Appended {} notification(s), more: {}", records, has_next_page);
        self.events
            .emit(Event::NotificationPageAppended { records, has_next_page })
            .await;
        if first_page {
            self.events.emit(Event::NotificationListOpened).await;
        }

        Ok(FetchOutcome::Appended { records, has_next_page })
    }

    fn spawn_mark_read(&self, generation: u64) -> JoinHandle<()> {
        let lifetime = self.lifetime.clone();
        let gateway = self.gateway.clone();
        let badge = self.badge.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Err(e) = gateway.mark_notifications_read().await {
                warn!("Marking notifications read failed ({}): {}", e.kind(), e);
                return;
            }

            {
                let lifetime = lifetime.read().await;
                if lifetime.generation != generation || lifetime.state == FeedState::Disposed {
                    debug!("Dropping mark-read completion from an ended feed lifetime");
                    return;
                }
            }

            badge.clear();
            events.emit(Event::UnreadCleared).await;
        })
    }

    /// Wait for this lifetime's mark-read effect, if one was requested
    pub async fn flush_effects(&self) {
        let task = self.lifetime.write().await.mark_read_task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Mark-read task failed: {}", e);
                }
            }
        }
    }

    /// Record a user interaction with a notification
    pub async fn on_record_activated(&self, id: impl Into<String>, kind: NotificationType) {
        self.events
            .emit(Event::NotificationClicked {
                id: id.into(),
                kind,
                origin: Origin::NonRealTime,
            })
            .await;
    }

    /// Drop all pages and start a fresh lifetime
    pub async fn reload(&self) -> Result<()> {
        let mut lifetime = self.lifetime.write().await;
        if lifetime.state == FeedState::Disposed {
            return Err(Error::FeedDisposed);
        }
        lifetime.end();
        let generation = lifetime.generation + 1;
        *lifetime = FeedLifetime::new(generation);
        info!("Notification feed reloaded");
        Ok(())
    }

    /// End the feed permanently; pending completions are ignored
    pub async fn dispose(&self) {
        let mut lifetime = self.lifetime.write().await;
        if lifetime.state == FeedState::Disposed {
            return;
        }
        lifetime.end();
        lifetime.generation += 1;
        lifetime.pages.clear();
        lifetime.fetching = false;
        lifetime.state = FeedState::Disposed;
        info!("Notification feed disposed");
    }

    pub async fn state(&self) -> FeedState {
        self.lifetime.read().await.state
    }

    pub async fn is_fetching(&self) -> bool {
        self.lifetime.read().await.fetching
    }

    pub async fn has_unread(&self) -> bool {
        compute_has_unread(&self.lifetime.read().await.pages)
    }

    /// Whether another page can be requested
    pub async fn can_fetch_more(&self) -> bool {
        let lifetime = self.lifetime.read().await;
        lifetime.state != FeedState::Disposed
            && !matches!(lifetime.next_request(), NextRequest::End)
    }

    /// True once something was fetched and the feed has nothing more to show
    pub async fn reached_end(&self) -> bool {
        let lifetime = self.lifetime.read().await;
        let Some(last) = lifetime.pages.last() else {
            return false;
        };
        !last.has_next_page() || lifetime.pages.iter().all(|page| page.records.is_empty())
    }

    pub async fn mark_read_requested(&self) -> bool {
        self.lifetime.read().await.mark_read_requested
    }

    pub async fn total_records(&self) -> usize {
        let lifetime = self.lifetime.read().await;
        lifetime.pages.iter().map(|page| page.records.len()).sum()
    }

    /// Consumer-facing records in page order
    pub async fn visible_records(&self, viewer: &ViewerContext) -> Vec<NotificationRecord> {
        let lifetime = self.lifetime.read().await;
        visible_records(&lifetime.pages, viewer).cloned().collect()
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        let lifetime = self.lifetime.read().await;
        FeedSnapshot {
            pages: lifetime.pages.clone(),
            state: lifetime.state,
            fetching: lifetime.fetching,
            has_unread: compute_has_unread(&lifetime.pages),
            mark_read_requested: lifetime.mark_read_requested,
        }
    }
}
