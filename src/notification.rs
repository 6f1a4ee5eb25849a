//! Toast-style notifications with optional time-to-live.
//!
//! Adding a notification whose content and kind match an open one reuses
//! it and restarts its timer instead of stacking a duplicate. Expiry is
//! driven by [`NotificationManager::run_expiry`], which a host spawns once.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    /// CSS-style class suffix a renderer can use.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub content: String,
    pub kind: NotificationKind,
    /// `None` keeps the notification until it is closed.
    pub expires_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Added(Notification),
    Closed(u64),
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    open: Vec<Notification>,
}

pub struct NotificationManager {
    inner: Mutex<Inner>,
    events: broadcast::Sender<NotificationEvent>,
    rearm: Notify,
}

impl NotificationManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            rearm: Notify::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    /// Show a notification and return its id.
    ///
    /// A matching open notification is moved to the end and, when `ttl` is
    /// given, its timer restarts.
    pub fn add(&self, content: impl Into<String>, kind: NotificationKind, ttl: Option<Duration>) -> u64 {
        let content = content.into();
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);

        let (id, added) = {
            let mut inner = self.inner.lock();
            match inner
                .open
                .iter()
                .position(|n| n.content == content && n.kind == kind)
            {
                Some(pos) => {
                    let mut existing = inner.open.remove(pos);
                    if expires_at.is_some() {
                        existing.expires_at = expires_at;
                    }
                    let id = existing.id;
                    inner.open.push(existing);
                    (id, None)
                }
                None => {
                    inner.next_id += 1;
                    let notification = Notification {
                        id: inner.next_id,
                        content,
                        kind,
                        expires_at,
                    };
                    inner.open.push(notification.clone());
                    (notification.id, Some(notification))
                }
            }
        };

        if let Some(notification) = added {
            debug!("notification {} added", id);
            let _ = self.events.send(NotificationEvent::Added(notification));
        }
        self.rearm.notify_one();
        id
    }

    /// Dismiss a notification. Returns false if it was not open.
    pub fn close(&self, id: u64) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let before = inner.open.len();
            inner.open.retain(|n| n.id != id);
            inner.open.len() != before
        };
        if removed {
            debug!("notification {} closed", id);
            let _ = self.events.send(NotificationEvent::Closed(id));
        }
        removed
    }

    /// Open notifications, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().open.clone()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .lock()
            .open
            .iter()
            .filter_map(|n| n.expires_at)
            .min()
    }

    /// Close every notification whose deadline is at or before `now`.
    pub fn expire_due(&self, now: Instant) -> Vec<u64> {
        let due: Vec<u64> = self
            .inner
            .lock()
            .open
            .iter()
            .filter(|n| n.expires_at.map_or(false, |at| at <= now))
            .map(|n| n.id)
            .collect();
        for id in &due {
            self.close(*id);
        }
        due
    }

    /// Close notifications as their ttl runs out. Never returns.
    pub async fn run_expiry(&self) {
        loop {
            match self.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            self.expire_due(Instant::now());
                        }
                        _ = self.rearm.notified() => {}
                    }
                }
                None => self.rearm.notified().await,
            }
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_duplicate_is_reused() {
        let manager = NotificationManager::new();
        let a = manager.add("saved", NotificationKind::Success, None);
        let b = manager.add("failed", NotificationKind::Error, None);
        let again = manager.add("saved", NotificationKind::Success, None);

        assert_eq!(a, again);
        assert_ne!(a, b);
        let open = manager.notifications();
        assert_eq!(open.len(), 2);
        // reused notification moves to the end
        assert_eq!(open[1].id, a);
    }

    #[test]
    fn test_same_content_other_kind_is_separate() {
        let manager = NotificationManager::new();
        let a = manager.add("disk", NotificationKind::Warning, None);
        let b = manager.add("disk", NotificationKind::Error, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_close_emits_event() {
        let manager = NotificationManager::new();
        let mut events = manager.subscribe();
        let id = manager.add("hello", NotificationKind::Info, None);

        assert!(manager.close(id));
        assert!(!manager.close(id));
        assert!(matches!(events.try_recv().unwrap(), NotificationEvent::Added(_)));
        assert_eq!(events.try_recv().unwrap(), NotificationEvent::Closed(id));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_due() {
        let manager = NotificationManager::new();
        let short = manager.add("short", NotificationKind::Info, Some(Duration::from_secs(1)));
        let sticky = manager.add("sticky", NotificationKind::Info, None);

        assert!(manager.expire_due(Instant::now()).is_empty());
        let closed = manager.expire_due(Instant::now() + Duration::from_secs(2));
        assert_eq!(closed, vec![short]);
        assert_eq!(manager.notifications()[0].id, sticky);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_expiry_closes_after_ttl() {
        let manager = Arc::new(NotificationManager::new());
        let runner = Arc::clone(&manager);
        let task = tokio::spawn(async move { runner.run_expiry().await });

        manager.add("bye", NotificationKind::Info, Some(Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(manager.notifications().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(manager.notifications().is_empty());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_adding_restarts_ttl() {
        let manager = Arc::new(NotificationManager::new());
        let runner = Arc::clone(&manager);
        let task = tokio::spawn(async move { runner.run_expiry().await });

        manager.add("retry", NotificationKind::Warning, Some(Duration::from_secs(3)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        manager.add("retry", NotificationKind::Warning, Some(Duration::from_secs(3)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.notifications().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(manager.notifications().is_empty());
        task.abort();
    }
}
