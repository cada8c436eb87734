use std::sync::Arc;
use tracing::{info, warn, Level};
use feedsync::{
    Client,
    auth::RecordingLoginPrompt,
    feed::{NotificationRecord, NotificationType, ViewerContext},
    gateway::MemoryGateway,
    settings::{MemorySnapshotStore, PreferenceKey, SyncOutcome},
    types::Event,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting feedsync demo v{}", feedsync::VERSION);

    let gateway = Arc::new(MemoryGateway::with_pages(vec![
        vec![
            NotificationRecord::new("n1", NotificationType::CommentReply),
            NotificationRecord::new("n2", NotificationType::SquadSubscribeNotification),
        ],
        vec![NotificationRecord::new("n3", NotificationType::ArticlePicked)],
    ]));

    let client = Client::new(
        gateway.clone(),
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(RecordingLoginPrompt::new()),
    )
    .await;

    client.add_event_handler(Box::new(|event| {
        match event {
            Event::PreferencesRolledBack { keys, error } => {
                warn!("Rolled back {:?}: {}", keys, error)
            }
            Event::UnreadCleared => info!("Unread badge cleared"),
            _ => info!("Event: {:?}", event),
        }
        true
    })).await;

    if let Some(handle) = client.login("demo-user", None).await {
        info!("Initial sync: {:?}", handle.outcome().await);
    }

    // One accepted change, one rejected change
    let outcome = client.settings().toggle(PreferenceKey::InsaneMode).await?.outcome().await;
    info!("insaneMode: {:?}", outcome);

    gateway.set_persist_failing(true);
    let outcome = client.settings().toggle(PreferenceKey::OpenNewTab).await?.outcome().await;
    if let SyncOutcome::RolledBack { restored, .. } = outcome {
        info!("openNewTab restored to {:?}", restored.get(PreferenceKey::OpenNewTab));
    }
    gateway.set_persist_failing(false);

    let feed = client.open_notifications().await;
    while feed.can_fetch_more().await {
        let outcome = feed.fetch_next_page().await?;
        info!("Page: {:?}", outcome);
    }
    feed.flush_effects().await;

    let viewer = ViewerContext::new(true);
    for record in feed.visible_records(&viewer).await {
        info!("Notification {} ({})", record.id, record.kind);
    }
    info!("Mark-read requests sent: {}", gateway.mark_read_calls());

    client.shutdown().await;
    Ok(())
}
