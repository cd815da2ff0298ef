//! Toast-style notices shared by every screen of one application instance.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: Uuid,
    pub variant: NoticeVariant,
    pub title: String,
    pub message: Option<String>,
    /// `None` keeps the notice until it is dismissed.
    pub expires_at: Option<Instant>,
}

/// Cheap to clone; clones share the same queue.
#[derive(Debug, Clone)]
pub struct NoticeQueue {
    inner: Arc<Mutex<VecDeque<Notice>>>,
    default_ttl: Duration,
}

impl NoticeQueue {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notice>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a notice. A zero `ttl` makes it sticky.
    pub fn enqueue(
        &self,
        variant: NoticeVariant,
        title: impl Into<String>,
        message: Option<String>,
        ttl: Duration,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.lock().push_back(Notice {
            id,
            variant,
            title: title.into(),
            message,
            expires_at,
        });
        id
    }

    pub fn success(&self, title: impl Into<String>, message: Option<String>) -> Uuid {
        self.enqueue(NoticeVariant::Success, title, message, self.default_ttl)
    }

    pub fn error(&self, title: impl Into<String>, message: Option<String>) -> Uuid {
        self.enqueue(NoticeVariant::Error, title, message, self.default_ttl)
    }

    pub fn info(&self, title: impl Into<String>, message: Option<String>) -> Uuid {
        self.enqueue(NoticeVariant::Info, title, message, self.default_ttl)
    }

    /// Notices not yet expired at `now`, oldest first.
    pub fn active_at(&self, now: Instant) -> Vec<Notice> {
        self.lock()
            .iter()
            .filter(|notice| notice.expires_at.map_or(true, |at| at > now))
            .cloned()
            .collect()
    }

    pub fn active(&self) -> Vec<Notice> {
        self.active_at(Instant::now())
    }

    /// Drops notices expired at `now` and returns how many went.
    pub fn prune_expired(&self, now: Instant) -> usize {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|notice| notice.expires_at.map_or(true, |at| at > now));
        before - queue.len()
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|notice| notice.id != id);
        queue.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for NoticeQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000))
    }
}
