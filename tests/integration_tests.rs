use feedsync::{
    Client, ClientConfig, Error,
    auth::{AuthTrigger, RecordingLoginPrompt},
    database::DatabaseConfig,
    feed::{FetchOutcome, NotificationRecord, NotificationType, UnreadBadge, ViewerContext},
    gateway::MemoryGateway,
    settings::{MemorySnapshotStore, PreferenceKey, PreferenceState, Spaciness, SyncOutcome},
    types::Event,
};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

struct Session {
    client: Client,
    gateway: Arc<MemoryGateway>,
    prompt: Arc<RecordingLoginPrompt>,
    events: Arc<Mutex<Vec<Event>>>,
}

async fn session(gateway: MemoryGateway) -> Session {
    let gateway = Arc::new(gateway);
    let prompt = Arc::new(RecordingLoginPrompt::new());
    let client = Client::new(
        gateway.clone(),
        Arc::new(MemorySnapshotStore::new()),
        prompt.clone(),
    )
    .await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.add_event_handler(Box::new(move |event| {
        sink.lock().unwrap().push(event);
        true
    })).await;

    Session { client, gateway, prompt, events }
}

async fn logged_in(gateway: MemoryGateway) -> Session {
    let session = session(gateway).await;
    session.client.login("user-1", Some(PreferenceState::default())).await;
    session
}

fn unread(id: &str) -> NotificationRecord {
    NotificationRecord::new(id, NotificationType::CommentReply)
}

fn read(id: &str) -> NotificationRecord {
    NotificationRecord::new(id, NotificationType::ArticleUpvoteMilestone).read(Utc::now())
}

#[tokio::test]
async fn test_every_boolean_key_applies_before_network() {
    let s = logged_in(MemoryGateway::new()).await;
    s.gateway.hold_persists();

    let mut handles = Vec::new();
    for key in PreferenceKey::ALL.iter().copied().filter(PreferenceKey::is_boolean) {
        let before = s.client.settings().get_preferences().await.get(key);
        handles.push(assert_ok!(s.client.settings().toggle(key).await));
        let after = s.client.settings().get_preferences().await.get(key);
        assert_ne!(before, after, "{} was not applied optimistically", key);
    }

    assert!(s.gateway.persisted().await.is_empty());
    s.gateway.release_persists(handles.len());
    for handle in handles {
        assert_eq!(handle.outcome().await, SyncOutcome::Committed);
    }
}

#[tokio::test]
async fn test_toggle_reverts_after_remote_failure() {
    let s = logged_in(MemoryGateway::new()).await;
    assert!(s.client.settings().get_preferences().await.open_new_tab);

    s.gateway.set_persist_failing(true);
    let handle = assert_ok!(s.client.settings().toggle(PreferenceKey::OpenNewTab).await);
    assert!(!s.client.settings().get_preferences().await.open_new_tab);

    let outcome = handle.outcome().await;
    assert!(matches!(outcome, SyncOutcome::RolledBack { .. }));
    assert!(s.client.settings().get_preferences().await.open_new_tab);

    let events = s.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PreferencesRolledBack { keys, .. } if keys == &vec![PreferenceKey::OpenNewTab]
    )));
}

#[tokio::test]
async fn test_rollback_keeps_interim_changes_to_other_keys() {
    let s = logged_in(MemoryGateway::new()).await;
    s.gateway.hold_persists();
    s.gateway
        .queue_persist_outcome(Err(Error::MalformedResponse("no data".into())))
        .await;

    let failing = assert_ok!(s.client.settings().toggle(PreferenceKey::CompanionExpanded).await);
    let other = assert_ok!(s.client.settings().set_spaciness(Spaciness::Roomy).await);

    s.gateway.release_persists(1);
    assert!(matches!(failing.outcome().await, SyncOutcome::RolledBack { .. }));
    s.gateway.release_persists(1);
    assert_eq!(other.outcome().await, SyncOutcome::Committed);

    let mut expected = PreferenceState::default();
    expected.spaciness = Spaciness::Roomy;
    assert_eq!(s.client.settings().get_preferences().await, expected);
}

#[tokio::test]
async fn test_same_key_overlap_settles_to_server_value() {
    for outcomes in [
        [Err(Error::RemoteUnavailable("down".into())), Ok(())],
        [Ok(()), Err(Error::RemoteUnavailable("down".into()))],
        [Err(Error::RemoteUnavailable("down".into())), Err(Error::RemoteUnavailable("down".into()))],
    ] {
        let s = logged_in(MemoryGateway::new()).await;
        for outcome in outcomes {
            s.gateway.queue_persist_outcome(outcome).await;
        }

        let first = assert_ok!(s.client.settings().toggle(PreferenceKey::SortingEnabled).await);
        let second = assert_ok!(s.client.settings().toggle(PreferenceKey::SortingEnabled).await);
        first.outcome().await;
        second.outcome().await;

        let local = s.client.settings().get_preferences().await.sorting_enabled;
        let remote = s.gateway.remote_preferences().await.sorting_enabled;
        assert_eq!(local, remote);
        assert_eq!(s.client.settings().in_flight(PreferenceKey::SortingEnabled).await, 0);
    }
}

#[tokio::test]
async fn test_gated_toggle_prompts_login_instead() {
    let s = session(MemoryGateway::new()).await;

    let err = assert_err!(s.client.settings().toggle(PreferenceKey::OptOutWeeklyGoal).await);
    assert_eq!(err, Error::UnauthenticatedMutation(PreferenceKey::OptOutWeeklyGoal));
    assert_eq!(s.prompt.triggers(), vec![AuthTrigger::Settings]);
    assert!(!s.client.settings().get_preferences().await.opt_out_weekly_goal);

    s.client.login("user-1", None).await;
    let handle = assert_ok!(s.client.settings().toggle(PreferenceKey::OptOutWeeklyGoal).await);
    assert_eq!(handle.outcome().await, SyncOutcome::Committed);
}

#[tokio::test]
async fn test_mark_read_fires_once_across_pages() {
    let s = logged_in(MemoryGateway::with_pages(vec![
        vec![read("1"), unread("2"), read("3")],
        vec![unread("4"), unread("5")],
    ]))
    .await;
    let badge: UnreadBadge = s.client.badge();
    badge.set(7);

    let feed = s.client.open_notifications().await;
    let outcome = assert_ok!(feed.fetch_next_page().await);
    assert_eq!(outcome, FetchOutcome::Appended { records: 3, has_next_page: true });
    feed.flush_effects().await;
    assert_eq!(s.gateway.mark_read_calls(), 1);
    assert_eq!(badge.count(), 0);

    assert_ok!(feed.fetch_next_page().await);
    feed.flush_effects().await;
    assert!(feed.has_unread().await);
    assert_eq!(s.gateway.mark_read_calls(), 1);

    let events = s.events.lock().unwrap();
    let cleared = events.iter().filter(|e| matches!(e, Event::UnreadCleared)).count();
    assert_eq!(cleared, 1);
}

#[tokio::test]
async fn test_last_page_stops_fetching() {
    let s = logged_in(MemoryGateway::with_pages(vec![vec![read("1")]])).await;
    let feed = s.client.open_notifications().await;

    assert_ok!(feed.fetch_next_page().await);
    assert!(!feed.can_fetch_more().await);
    assert_eq!(assert_ok!(feed.fetch_next_page().await), FetchOutcome::Exhausted);
    assert_eq!(s.gateway.fetch_calls(), 1);
}

#[tokio::test]
async fn test_squad_subscribe_filter_is_applied_on_consumption() {
    let s = logged_in(MemoryGateway::with_pages(vec![vec![
        read("1"),
        NotificationRecord::new("2", NotificationType::SquadSubscribeNotification).read(Utc::now()),
    ]]))
    .await;
    let feed = s.client.open_notifications().await;
    assert_ok!(feed.fetch_next_page().await);

    let subscribed = feed.visible_records(&ViewerContext::new(true)).await;
    assert!(subscribed.iter().all(|r| r.kind != NotificationType::SquadSubscribeNotification));

    let unsubscribed = feed.visible_records(&ViewerContext::new(false)).await;
    assert_eq!(unsubscribed.len(), 2);

    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.pages[0].records.len(), 2);
}

#[tokio::test]
async fn test_closing_feed_cancels_pending_mark_read() {
    let s = logged_in(MemoryGateway::with_pages(vec![vec![unread("1")]])).await;
    let badge = s.client.badge();
    badge.set(1);

    let feed = s.client.open_notifications().await;
    assert_ok!(feed.fetch_next_page().await);
    s.client.close_notifications().await;
    feed.flush_effects().await;

    assert_eq!(badge.count(), 1);
    assert_err!(feed.fetch_next_page().await);
}

#[tokio::test]
async fn test_snapshot_seeds_next_session() {
    let dir = tempdir().unwrap();
    let config = ClientConfig {
        database: DatabaseConfig {
            database_url: format!("sqlite:{}", dir.path().join("feedsync.db").display()),
            ..DatabaseConfig::default()
        },
        ..ClientConfig::default()
    };

    let client = assert_ok!(Client::connect(config.clone(), Arc::new(RecordingLoginPrompt::new())).await);
    let handle = assert_ok!(client.settings().toggle(PreferenceKey::InsaneMode).await);
    assert_eq!(handle.outcome().await, SyncOutcome::LocalOnly);
    client.shutdown().await;

    let client = assert_ok!(Client::connect(config, Arc::new(RecordingLoginPrompt::new())).await);
    assert!(client.settings().get_preferences().await.insane_mode);
    assert!(!client.settings().is_loaded().await);
    client.shutdown().await;
}
