/// In-memory gateway with scriptable remote behavior

use crate::{
    error::{Error, Result},
    feed::{Cursor, NotificationPage, NotificationRecord},
    gateway::RemoteGateway,
    settings::{PreferencePatch, PreferenceState},
};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use tokio::sync::{Mutex, RwLock, Semaphore};

const CURSOR_PREFIX: &str = "page-";

/// Holds calls until permits are released
#[derive(Debug)]
struct CallGate {
    held: AtomicBool,
    permits: Semaphore,
}

impl CallGate {
    fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }

    async fn pass(&self) {
        if !self.held.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    fn release(&self, calls: usize) {
        self.permits.add_permits(calls);
    }
}

/// Gateway backed by in-process state
#[derive(Debug)]
pub struct MemoryGateway {
    remote_preferences: RwLock<PreferenceState>,
    persisted: RwLock<Vec<PreferencePatch>>,
    persist_outcomes: Mutex<VecDeque<Result<()>>>,
    persist_failing: AtomicBool,
    persist_gate: CallGate,
    pages: RwLock<Vec<NotificationPage>>,
    fetch_failures: AtomicU32,
    fetch_calls: AtomicU32,
    fetch_gate: CallGate,
    mark_read_calls: AtomicU32,
    mark_read_failing: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            remote_preferences: RwLock::new(PreferenceState::default()),
            persisted: RwLock::new(Vec::new()),
            persist_outcomes: Mutex::new(VecDeque::new()),
            persist_failing: AtomicBool::new(false),
            persist_gate: CallGate::new(),
            pages: RwLock::new(Vec::new()),
            fetch_failures: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            fetch_gate: CallGate::new(),
            mark_read_calls: AtomicU32::new(0),
            mark_read_failing: AtomicBool::new(false),
        }
    }

    /// Gateway serving `pages` in order; every page but the last links to the next
    pub fn with_pages(pages: Vec<Vec<NotificationRecord>>) -> Self {
        let total = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, records)| {
                let next = (index + 1 < total).then(|| Self::cursor_for(index + 1));
                NotificationPage::new(records, next)
            })
            .collect();

        Self {
            pages: RwLock::new(pages),
            ..Self::new()
        }
    }

    /// Cursor that addresses the page at `index`
    pub fn cursor_for(index: usize) -> Cursor {
        Cursor::new(format!("{CURSOR_PREFIX}{index}"))
    }

    // Preferences

    /// Queue the outcome of the next persist call; unqueued calls succeed
    pub async fn queue_persist_outcome(&self, outcome: Result<()>) {
        self.persist_outcomes.lock().await.push_back(outcome);
    }

    /// Make every persist call fail until switched back
    pub fn set_persist_failing(&self, failing: bool) {
        self.persist_failing.store(failing, Ordering::SeqCst);
    }

    /// Hold persist calls until [`release_persists`](Self::release_persists)
    pub fn hold_persists(&self) {
        self.persist_gate.hold();
    }

    pub fn release_persists(&self, calls: usize) {
        self.persist_gate.release(calls);
    }

    /// Patches received, in arrival order
    pub async fn persisted(&self) -> Vec<PreferencePatch> {
        self.persisted.read().await.clone()
    }

    /// Server-side preferences after every successful persist
    pub async fn remote_preferences(&self) -> PreferenceState {
        self.remote_preferences.read().await.clone()
    }

    // Notifications

    /// Fail the next `count` page requests
    pub fn fail_next_fetches(&self, count: u32) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    pub fn hold_fetches(&self) {
        self.fetch_gate.hold();
    }

    pub fn release_fetches(&self, calls: usize) {
        self.fetch_gate.release(calls);
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn set_mark_read_failing(&self, failing: bool) {
        self.mark_read_failing.store(failing, Ordering::SeqCst);
    }

    pub fn mark_read_calls(&self) -> u32 {
        self.mark_read_calls.load(Ordering::SeqCst)
    }

    fn page_index(cursor: Option<&Cursor>) -> Result<usize> {
        let Some(cursor) = cursor else {
            return Ok(0);
        };
        cursor
            .as_str()
            .strip_prefix(CURSOR_PREFIX)
            .and_then(|index| index.parse().ok())
            .ok_or_else(|| Error::MalformedResponse(format!("unknown cursor {}", cursor)))
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn persist_preferences(&self, patch: &PreferencePatch) -> Result<()> {
        self.persist_gate.pass().await;
        self.persisted.write().await.push(patch.clone());

        let queued = self.persist_outcomes.lock().await.pop_front();
        let outcome = match queued {
            Some(outcome) => outcome,
            None if self.persist_failing.load(Ordering::SeqCst) => {
                Err(Error::RemoteUnavailable("persist rejected".to_string()))
            }
            None => Ok(()),
        };

        if outcome.is_ok() {
            let mut remote = self.remote_preferences.write().await;
            patch.apply_to(&mut remote)?;
        }
        outcome
    }

    async fn fetch_notification_page(
        &self,
        cursor: Option<&Cursor>,
        _page_size: u32,
    ) -> Result<NotificationPage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_gate.pass().await;

        let failing = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::RemoteUnavailable("page request failed".to_string()));
        }

        let index = Self::page_index(cursor)?;
        let pages = self.pages.read().await;
        Ok(pages.get(index).cloned().unwrap_or_default())
    }

    async fn mark_notifications_read(&self) -> Result<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        if self.mark_read_failing.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("mark read failed".to_string()));
        }
        Ok(())
    }
}
