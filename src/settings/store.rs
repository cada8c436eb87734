use crate::{
    error::Result,
    settings::{PreferencePatch, PreferenceState},
};
use async_trait::async_trait;

/// Local snapshot of the last settled preference state
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load whatever keys were persisted, if anything was
    async fn load(&self) -> Result<Option<PreferencePatch>>;

    /// Persist the full state
    async fn save(&self, state: &PreferenceState) -> Result<()>;

    /// Drop the snapshot
    async fn clear(&self) -> Result<()>;
}

/// In-memory snapshot store implementation
pub struct MemorySnapshotStore {
    snapshot: tokio::sync::RwLock<Option<PreferenceState>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshot: tokio::sync::RwLock::new(None),
        }
    }

    /// Store pre-seeded with a snapshot
    pub fn with_snapshot(state: PreferenceState) -> Self {
        Self {
            snapshot: tokio::sync::RwLock::new(Some(state)),
        }
    }

    /// The last saved state
    pub async fn snapshot(&self) -> Option<PreferenceState> {
        self.snapshot.read().await.clone()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<PreferencePatch>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.as_ref().map(PreferencePatch::full))
    }

    async fn save(&self, state: &PreferenceState) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = None;
        Ok(())
    }
}
