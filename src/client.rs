use crate::{
    auth::{AuthState, LoginPrompt},
    database::{Database, DatabaseConfig, SqliteSnapshotStore},
    error::Result,
    feed::{FeedConfig, NotificationFeed, UnreadBadge},
    gateway::{GraphQLConfig, GraphQLGateway, RemoteGateway},
    settings::{PreferenceState, SettingsSynchronizer, SnapshotStore, SyncHandle},
    share::{ShareComment, ShareProvider},
    types::{EventBus, EventHandler, Origin},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration for a synchronization session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub graphql: GraphQLConfig,
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
}

impl ClientConfig {
    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Owner of all synchronized state for one session
pub struct Client {
    config: ClientConfig,
    gateway: Arc<dyn RemoteGateway>,
    auth: Arc<RwLock<AuthState>>,
    settings: SettingsSynchronizer,
    badge: UnreadBadge,
    feed: RwLock<Option<NotificationFeed>>,
    events: EventBus,
    database: Option<Database>,
}

impl Client {
    /// Create a session with default configuration
    pub async fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<dyn SnapshotStore>,
        login_prompt: Arc<dyn LoginPrompt>,
    ) -> Self {
        Self::with_config(gateway, store, login_prompt, ClientConfig::default()).await
    }

    /// Create a session with custom configuration
    pub async fn with_config(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<dyn SnapshotStore>,
        login_prompt: Arc<dyn LoginPrompt>,
        config: ClientConfig,
    ) -> Self {
        let auth = Arc::new(RwLock::new(AuthState::default()));
        let events = EventBus::new();
        let settings = SettingsSynchronizer::new(
            gateway.clone(),
            store,
            auth.clone(),
            login_prompt,
            events.clone(),
        )
        .await;

        Self {
            config,
            gateway,
            auth,
            settings,
            badge: UnreadBadge::default(),
            feed: RwLock::new(None),
            events,
            database: None,
        }
    }

    /// Create a session talking to the configured GraphQL endpoint, with the
    /// snapshot kept in the configured SQLite database
    pub async fn connect(config: ClientConfig, login_prompt: Arc<dyn LoginPrompt>) -> Result<Self> {
        let gateway = Arc::new(GraphQLGateway::new(&config.graphql)?);
        let database = Database::new(config.database.clone()).await?;
        let store = Arc::new(SqliteSnapshotStore::new(database.pool().clone()));

        info!("Connecting session to {}", config.graphql.endpoint);
        let mut client = Self::with_config(gateway, store, login_prompt, config).await;
        client.database = Some(database);
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Add an event handler
    pub async fn add_event_handler(&self, handler: EventHandler) {
        self.events.add_handler(handler).await;
    }

    pub fn settings(&self) -> &SettingsSynchronizer {
        &self.settings
    }

    /// Unread indicator shared with every feed of this session
    pub fn badge(&self) -> UnreadBadge {
        self.badge.clone()
    }

    pub async fn auth_state(&self) -> AuthState {
        self.auth.read().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.auth.read().await.is_authenticated()
    }

    /// Start an authenticated session.
    ///
    /// A remote snapshot replaces local preferences wholesale. Without one,
    /// local state is re-sent so changes made anonymously reach the server.
    pub async fn login(
        &self,
        user_id: impl Into<String>,
        remote: Option<PreferenceState>,
    ) -> Option<SyncHandle> {
        let user_id = user_id.into();
        info!("Logged in as {}", user_id);
        *self.auth.write().await = AuthState::Authenticated { user_id };

        match remote {
            Some(snapshot) => {
                self.settings.apply_remote_snapshot(snapshot).await;
                None
            }
            None => Some(self.settings.sync_all().await),
        }
    }

    pub async fn logout(&self) {
        *self.auth.write().await = AuthState::Anonymous;
        self.close_notifications().await;
        info!("Logged out");
    }

    /// Mount a fresh notification feed, ending the previous one
    pub async fn open_notifications(&self) -> NotificationFeed {
        let feed = NotificationFeed::new(
            self.gateway.clone(),
            self.badge.clone(),
            self.events.clone(),
            self.config.feed.clone(),
        );

        let previous = self.feed.write().await.replace(feed.clone());
        if let Some(previous) = previous {
            debug!("Replacing mounted notification feed");
            previous.dispose().await;
        }
        feed
    }

    /// The currently mounted feed
    pub async fn notifications(&self) -> Option<NotificationFeed> {
        self.feed.read().await.clone()
    }

    pub async fn close_notifications(&self) {
        let feed = self.feed.write().await.take();
        if let Some(feed) = feed {
            feed.dispose().await;
        }
    }

    /// Comment sharing wired to this session's events
    pub fn share_comment(&self, provider: Arc<dyn ShareProvider>, origin: Origin) -> ShareComment {
        ShareComment::new(provider, self.events.clone(), origin)
    }

    /// End the session; pending preference syncs finish in the background
    pub async fn shutdown(&self) {
        self.close_notifications().await;
        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("Session shut down");
    }
}
