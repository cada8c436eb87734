use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// Unread notification count shown outside the feed
#[derive(Debug, Clone, Default)]
pub struct UnreadBadge {
    count: Arc<AtomicU32>,
}

impl UnreadBadge {
    pub fn new(count: u32) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(count)),
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn set(&self, count: u32) {
        self.count.store(count, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}
