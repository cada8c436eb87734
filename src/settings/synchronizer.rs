/// Optimistic preference synchronizer
///
/// Local state is the single source of truth for rendering. Every change is
/// applied locally first, then persisted remotely in a background task; a
/// failed persist rolls back only the keys of that change, on top of
/// whatever the local state is by then.

use crate::{
    auth::{AuthState, AuthTrigger, LoginPrompt},
    error::{Error, Result},
    flags::{Feature, FeatureFlags, Platform},
    gateway::RemoteGateway,
    settings::{
        MutationLedger, PendingPreferenceMutation, PreferenceKey, PreferencePatch,
        PreferenceState, PreferenceValue, RemoteTheme, SnapshotStore, Spaciness, ThemeMode,
    },
    types::{Event, EventBus},
};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// How a remote sync resolved
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Remote store accepted the change
    Committed,
    /// No user is logged in; the change stays local
    LocalOnly,
    /// Remote store rejected the change and these keys were restored
    RolledBack { restored: PreferencePatch, error: Error },
    /// Remote store rejected the change but newer changes own its keys
    Superseded { error: Error },
    /// A full re-send failed; local state was not touched
    Failed { error: Error },
    /// The background task was cancelled before it resolved
    Aborted,
}

/// Handle to a background remote sync
#[derive(Debug)]
pub struct SyncHandle {
    inner: SyncHandleInner,
}

#[derive(Debug)]
enum SyncHandleInner {
    Ready(SyncOutcome),
    Pending(JoinHandle<SyncOutcome>),
}

impl SyncHandle {
    fn ready(outcome: SyncOutcome) -> Self {
        Self { inner: SyncHandleInner::Ready(outcome) }
    }

    fn pending(handle: JoinHandle<SyncOutcome>) -> Self {
        Self { inner: SyncHandleInner::Pending(handle) }
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            SyncHandleInner::Ready(_) => true,
            SyncHandleInner::Pending(handle) => handle.is_finished(),
        }
    }

    /// Wait for the sync to resolve
    pub async fn outcome(self) -> SyncOutcome {
        match self.inner {
            SyncHandleInner::Ready(outcome) => outcome,
            SyncHandleInner::Pending(handle) => handle.await.unwrap_or(SyncOutcome::Aborted),
        }
    }
}

#[derive(Debug, Default)]
struct SettingsState {
    preferences: PreferenceState,
    ledger: MutationLedger,
    loaded: bool,
}

/// Owner of the session's preference state
#[derive(Clone)]
pub struct SettingsSynchronizer {
    state: Arc<RwLock<SettingsState>>,
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<dyn SnapshotStore>,
    auth: Arc<RwLock<AuthState>>,
    login_prompt: Arc<dyn LoginPrompt>,
    events: EventBus,
    /// Held from reading the state until the store has it
    snapshot_write: Arc<Mutex<()>>,
}

impl SettingsSynchronizer {
    /// Create a synchronizer seeded from the local snapshot, or defaults
    pub async fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<dyn SnapshotStore>,
        auth: Arc<RwLock<AuthState>>,
        login_prompt: Arc<dyn LoginPrompt>,
        events: EventBus,
    ) -> Self {
        let mut preferences = PreferenceState::default();
        match store.load().await {
            Ok(Some(snapshot)) => {
                if let Err(e) = snapshot.apply_to(&mut preferences) {
                    warn!("Ignoring unusable local snapshot: {}", e);
                    preferences = PreferenceState::default();
                } else {
                    debug!("Loaded {} preference(s) from local snapshot", snapshot.len());
                }
            }
            Ok(None) => debug!("No local snapshot, starting from defaults"),
            Err(e) => warn!("Failed to load local snapshot: {}", e),
        }

        Self {
            state: Arc::new(RwLock::new(SettingsState {
                preferences,
                ..SettingsState::default()
            })),
            gateway,
            store,
            auth,
            login_prompt,
            events,
            snapshot_write: Arc::new(Mutex::new(())),
        }
    }

    /// Current, authoritative local preferences
    pub async fn get_preferences(&self) -> PreferenceState {
        self.state.read().await.preferences.clone()
    }

    pub async fn theme_mode(&self) -> ThemeMode {
        self.state.read().await.preferences.theme_mode()
    }

    /// Whether a remote snapshot has been applied this session
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    /// Remote persists still pending for `key`
    pub async fn in_flight(&self, key: PreferenceKey) -> usize {
        self.state.read().await.ledger.in_flight(key)
    }

    /// Change a single preference
    pub async fn set_preference(
        &self,
        key: PreferenceKey,
        value: impl Into<PreferenceValue>,
    ) -> Result<SyncHandle> {
        self.set_preferences(PreferencePatch::single(key, value)).await
    }

    /// Change several preferences as one mutation
    pub async fn set_preferences(&self, changes: PreferencePatch) -> Result<SyncHandle> {
        changes.check()?;
        if changes.is_empty() {
            return Ok(SyncHandle::ready(SyncOutcome::Committed));
        }
        self.begin(move |_| Ok(changes)).await
    }

    /// Flip a boolean preference
    pub async fn toggle(&self, key: PreferenceKey) -> Result<SyncHandle> {
        if !key.is_boolean() {
            return Err(Error::TypeMismatch { key, expected: "boolean" });
        }
        self.begin(move |current| {
            let value = current.get(key).as_bool().unwrap_or_default();
            Ok(PreferencePatch::single(key, !value))
        })
        .await
    }

    pub async fn set_theme(&self, mode: ThemeMode) -> Result<SyncHandle> {
        self.set_preference(PreferenceKey::Theme, RemoteTheme::from(mode)).await
    }

    pub async fn set_spaciness(&self, density: Spaciness) -> Result<SyncHandle> {
        self.set_preference(PreferenceKey::Spaciness, density).await
    }

    pub async fn update_custom_links(&self, links: Vec<String>) -> Result<SyncHandle> {
        self.set_preference(PreferenceKey::CustomLinks, PreferenceValue::Links(Some(links)))
            .await
    }

    /// Re-send the full local state; local state is never modified
    pub async fn sync_all(&self) -> SyncHandle {
        if !self.auth.read().await.is_authenticated() {
            return SyncHandle::ready(SyncOutcome::LocalOnly);
        }

        let patch = PreferencePatch::full(&self.state.read().await.preferences);
        let sync = self.clone();
        SyncHandle::pending(tokio::spawn(async move {
            match sync.gateway.persist_preferences(&patch).await {
                Ok(()) => {
                    debug!("Full preference sync committed");
                    sync.save_snapshot().await;
                    SyncOutcome::Committed
                }
                Err(error) => {
                    warn!("Full preference sync failed ({}): {}", error.kind(), error);
                    sync.events
                        .emit(Event::PreferencesSyncFailed { error: error.clone() })
                        .await;
                    SyncOutcome::Failed { error }
                }
            }
        }))
    }

    /// Replace the whole state with a remote snapshot.
    ///
    /// Pending rollbacks from before the replacement become stale.
    pub async fn apply_remote_snapshot(&self, snapshot: PreferenceState) {
        {
            let mut state = self.state.write().await;
            state.preferences = snapshot;
            state.ledger.clear();
            state.loaded = true;
        }
        info!("Preferences replaced by remote snapshot");
        self.events.emit(Event::PreferencesReplaced).await;
        self.save_snapshot().await;
    }

    /// Boolean preferences the settings surface should offer
    pub fn available_toggles(flags: &dyn FeatureFlags, platform: Platform) -> Vec<PreferenceKey> {
        let mut toggles = vec![PreferenceKey::InsaneMode, PreferenceKey::OpenNewTab];
        if platform == Platform::Extension {
            toggles.push(PreferenceKey::ShowTopSites);
        }
        toggles.push(PreferenceKey::SortingEnabled);
        toggles.push(PreferenceKey::OptOutWeeklyGoal);
        if flags.is_enabled(Feature::CompanionPermissionPlacement) {
            toggles.push(PreferenceKey::OptOutCompanion);
        }
        toggles.push(PreferenceKey::AutoDismissNotifications);
        toggles
    }

    /// Apply a change locally and schedule its remote persist
    async fn begin<F>(&self, build: F) -> Result<SyncHandle>
    where
        F: FnOnce(&PreferenceState) -> Result<PreferencePatch>,
    {
        let authenticated = self.auth.read().await.is_authenticated();

        let mutation = {
            let mut state = self.state.write().await;
            let changes = build(&state.preferences)?;

            if !authenticated {
                if let Some(key) = changes.keys().find(PreferenceKey::requires_login) {
                    drop(state);
                    debug!("Login required to change {}", key);
                    self.login_prompt.show_login(AuthTrigger::Settings);
                    return Err(Error::UnauthenticatedMutation(key));
                }
            }

            let mutation = PendingPreferenceMutation::apply(&mut state.preferences, changes)?;
            if authenticated {
                state.ledger.record(&mutation);
            }
            mutation
        };

        let keys: Vec<PreferenceKey> = mutation.keys().collect();
        debug!("Applied {:?} optimistically", keys);
        self.events.emit(Event::PreferencesChanged { keys }).await;

        if !authenticated {
            self.save_snapshot().await;
            return Ok(SyncHandle::ready(SyncOutcome::LocalOnly));
        }

        let sync = self.clone();
        Ok(SyncHandle::pending(tokio::spawn(async move {
            sync.persist(mutation).await
        })))
    }

    async fn persist(&self, mutation: PendingPreferenceMutation) -> SyncOutcome {
        let outcome = match self.gateway.persist_preferences(&mutation.after).await {
            Ok(()) => {
                self.state.write().await.ledger.commit(&mutation);
                SyncOutcome::Committed
            }
            Err(error) => self.roll_back(&mutation, error).await,
        };

        self.save_snapshot().await;
        outcome
    }

    async fn roll_back(&self, mutation: &PendingPreferenceMutation, error: Error) -> SyncOutcome {
        let keys: Vec<PreferenceKey> = mutation.keys().collect();
        warn!("Persisting {:?} failed ({}): {}", keys, error.kind(), error);

        let plan = {
            let mut state = self.state.write().await;
            let plan = state.ledger.fail(mutation);
            if let Err(e) = plan.restore.apply_to(&mut state.preferences) {
                warn!("Rollback of {:?} could not be applied: {}", keys, e);
            }
            plan
        };

        if !plan.stale.is_empty() || !plan.handed_down.is_empty() {
            debug!(
                "Rollback skipped for settled keys {:?}, handed down {:?}",
                plan.stale, plan.handed_down
            );
        }

        if plan.is_noop() {
            return SyncOutcome::Superseded { error };
        }

        self.events
            .emit(Event::PreferencesRolledBack {
                keys: plan.restore.keys().collect(),
                error: error.clone(),
            })
            .await;

        SyncOutcome::RolledBack { restored: plan.restore, error }
    }

    async fn save_snapshot(&self) {
        let _write = self.snapshot_write.lock().await;
        let preferences = self.get_preferences().await;
        if let Err(e) = self.store.save(&preferences).await {
            warn!("Failed to write local snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::RecordingLoginPrompt,
        flags::StaticFlags,
        gateway::MemoryGateway,
        settings::MemorySnapshotStore,
    };
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    /// Store whose first write is slow to land
    #[derive(Default)]
    struct SlowFirstSave {
        inner: MemorySnapshotStore,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotStore for SlowFirstSave {
        async fn load(&self) -> Result<Option<PreferencePatch>> {
            self.inner.load().await
        }

        async fn save(&self, state: &PreferenceState) -> Result<()> {
            if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.save(state).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    struct Harness {
        sync: SettingsSynchronizer,
        gateway: Arc<MemoryGateway>,
        store: Arc<MemorySnapshotStore>,
        prompt: Arc<RecordingLoginPrompt>,
    }

    async fn harness(auth: AuthState) -> Harness {
        let gateway = Arc::new(MemoryGateway::new());
        let store = Arc::new(MemorySnapshotStore::new());
        let prompt = Arc::new(RecordingLoginPrompt::new());
        let sync = SettingsSynchronizer::new(
            gateway.clone(),
            store.clone(),
            Arc::new(RwLock::new(auth)),
            prompt.clone(),
            EventBus::new(),
        )
        .await;
        Harness { sync, gateway, store, prompt }
    }

    fn logged_in() -> AuthState {
        AuthState::Authenticated { user_id: "u1".to_string() }
    }

    #[tokio::test]
    async fn test_set_preference_applies_before_network() {
        let h = harness(logged_in()).await;
        h.gateway.hold_persists();

        let handle = h.sync.set_preference(PreferenceKey::InsaneMode, true).await.unwrap();
        assert!(h.sync.get_preferences().await.insane_mode);
        assert_eq!(h.sync.in_flight(PreferenceKey::InsaneMode).await, 1);

        h.gateway.release_persists(1);
        assert_eq!(handle.outcome().await, SyncOutcome::Committed);
        assert!(h.sync.get_preferences().await.insane_mode);
        assert_eq!(h.sync.in_flight(PreferenceKey::InsaneMode).await, 0);

        let persisted = h.gateway.persisted().await;
        assert_eq!(persisted, vec![PreferencePatch::single(PreferenceKey::InsaneMode, true)]);
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts() {
        let h = harness(logged_in()).await;
        h.gateway.set_persist_failing(true);

        let handle = h.sync.toggle(PreferenceKey::OpenNewTab).await.unwrap();
        assert!(!h.sync.get_preferences().await.open_new_tab);

        let outcome = handle.outcome().await;
        assert!(matches!(outcome, SyncOutcome::RolledBack { .. }));
        assert!(h.sync.get_preferences().await.open_new_tab);
        assert!(h.store.snapshot().await.unwrap().open_new_tab);
    }

    #[tokio::test]
    async fn test_rollback_preserves_unrelated_keys() {
        let h = harness(logged_in()).await;
        h.gateway.hold_persists();
        h.gateway
            .queue_persist_outcome(Err(Error::RemoteUnavailable("down".into())))
            .await;

        let failing = h.sync.set_preference(PreferenceKey::SortingEnabled, true).await.unwrap();
        let succeeding = h.sync.set_spaciness(Spaciness::Cozy).await.unwrap();

        h.gateway.release_persists(2);
        assert!(matches!(failing.outcome().await, SyncOutcome::RolledBack { .. }));
        assert_eq!(succeeding.outcome().await, SyncOutcome::Committed);

        let prefs = h.sync.get_preferences().await;
        assert!(!prefs.sorting_enabled);
        assert_eq!(prefs.spaciness, Spaciness::Cozy);
    }

    #[tokio::test]
    async fn test_empty_change_is_a_no_op() {
        let h = harness(logged_in()).await;
        let changed = Arc::new(AtomicUsize::new(0));
        let counter = changed.clone();
        h.sync
            .events
            .add_handler(Box::new(move |event| {
                if matches!(event, Event::PreferencesChanged { .. }) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                true
            }))
            .await;

        let handle = h.sync.set_preferences(PreferencePatch::new()).await.unwrap();
        assert!(handle.is_finished());
        assert_eq!(handle.outcome().await, SyncOutcome::Committed);
        assert!(h.gateway.persisted().await.is_empty());
        assert_eq!(changed.load(Ordering::SeqCst), 0);
        assert_eq!(h.sync.get_preferences().await, PreferenceState::default());
    }

    #[tokio::test]
    async fn test_overlapping_settles_leave_latest_snapshot() {
        let gateway = Arc::new(MemoryGateway::new());
        let store = Arc::new(SlowFirstSave::default());
        let sync = SettingsSynchronizer::new(
            gateway.clone(),
            store.clone(),
            Arc::new(RwLock::new(logged_in())),
            Arc::new(RecordingLoginPrompt::new()),
            EventBus::new(),
        )
        .await;
        gateway.hold_persists();
        gateway.queue_persist_outcome(Ok(())).await;
        gateway
            .queue_persist_outcome(Err(Error::RemoteUnavailable("down".into())))
            .await;

        let committed = sync.toggle(PreferenceKey::InsaneMode).await.unwrap();
        let rolled_back = sync.toggle(PreferenceKey::SortingEnabled).await.unwrap();

        gateway.release_persists(1);
        while store.saves.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        gateway.release_persists(1);

        assert_eq!(committed.outcome().await, SyncOutcome::Committed);
        assert!(matches!(rolled_back.outcome().await, SyncOutcome::RolledBack { .. }));

        let settled = sync.get_preferences().await;
        assert!(settled.insane_mode);
        assert_eq!(settled.sorting_enabled, PreferenceState::default().sorting_enabled);
        assert_eq!(store.inner.snapshot().await, Some(settled));
    }

    #[tokio::test]
    async fn test_toggle_rejects_non_boolean_keys() {
        let h = harness(logged_in()).await;
        let err = h.sync.toggle(PreferenceKey::Theme).await.unwrap_err();
        assert_eq!(err, Error::TypeMismatch { key: PreferenceKey::Theme, expected: "boolean" });
    }

    #[tokio::test]
    async fn test_login_gated_key_prompts_without_applying() {
        let h = harness(AuthState::Anonymous).await;

        let err = h.sync.toggle(PreferenceKey::OptOutWeeklyGoal).await.unwrap_err();
        assert_eq!(err, Error::UnauthenticatedMutation(PreferenceKey::OptOutWeeklyGoal));
        assert!(!h.sync.get_preferences().await.opt_out_weekly_goal);
        assert_eq!(h.prompt.triggers(), vec![AuthTrigger::Settings]);
        assert!(h.gateway.persisted().await.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_change_stays_local() {
        let h = harness(AuthState::Anonymous).await;

        let handle = h.sync.set_theme(ThemeMode::Light).await.unwrap();
        assert_eq!(handle.outcome().await, SyncOutcome::LocalOnly);
        assert_eq!(h.sync.theme_mode().await, ThemeMode::Light);
        assert_eq!(h.store.snapshot().await.unwrap().theme, RemoteTheme::Bright);
        assert!(h.gateway.persisted().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_does_not_touch_local_state() {
        let h = harness(logged_in()).await;
        h.sync.update_custom_links(vec!["https://a.dev".into()]).await.unwrap().outcome().await;
        h.gateway.set_persist_failing(true);

        let before = h.sync.get_preferences().await;
        let outcome = h.sync.sync_all().await.outcome().await;
        assert!(matches!(outcome, SyncOutcome::Failed { .. }));
        assert_eq!(h.sync.get_preferences().await, before);

        let last = h.gateway.persisted().await.pop().unwrap();
        assert_eq!(last.len(), PreferenceKey::ALL.len());
    }

    #[tokio::test]
    async fn test_remote_snapshot_replaces_and_stales_rollbacks() {
        let h = harness(logged_in()).await;
        h.gateway.hold_persists();
        h.gateway.set_persist_failing(true);

        let handle = h.sync.toggle(PreferenceKey::SidebarExpanded).await.unwrap();

        let mut remote = PreferenceState::default();
        remote.sidebar_expanded = false;
        remote.theme = RemoteTheme::Auto;
        h.sync.apply_remote_snapshot(remote.clone()).await;
        assert!(h.sync.is_loaded().await);

        h.gateway.release_persists(1);
        assert!(matches!(handle.outcome().await, SyncOutcome::Superseded { .. }));
        assert_eq!(h.sync.get_preferences().await, remote);
    }

    #[tokio::test]
    async fn test_seeded_from_local_snapshot() {
        let mut saved = PreferenceState::default();
        saved.companion_expanded = true;

        let sync = SettingsSynchronizer::new(
            Arc::new(MemoryGateway::new()),
            Arc::new(MemorySnapshotStore::with_snapshot(saved.clone())),
            Arc::new(RwLock::new(AuthState::Anonymous)),
            Arc::new(RecordingLoginPrompt::new()),
            EventBus::new(),
        )
        .await;

        assert_eq!(sync.get_preferences().await, saved);
        assert!(!sync.is_loaded().await);
    }

    #[test]
    fn test_available_toggles() {
        let off = StaticFlags::new();
        let toggles = SettingsSynchronizer::available_toggles(&off, Platform::Webapp);
        assert!(!toggles.contains(&PreferenceKey::ShowTopSites));
        assert!(!toggles.contains(&PreferenceKey::OptOutCompanion));

        let on = StaticFlags::new().with(Feature::CompanionPermissionPlacement, "header");
        let toggles = SettingsSynchronizer::available_toggles(&on, Platform::Extension);
        assert!(toggles.contains(&PreferenceKey::ShowTopSites));
        assert!(toggles.contains(&PreferenceKey::OptOutCompanion));
    }
}
