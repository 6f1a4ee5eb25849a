//! Change notification with hierarchical wildcard scopes.
//!
//! A change to `a.b.c` is announced on the scopes `a.b.c`, `a.b.*`, `a.*`
//! and `*`, in that order. Every announcement carries the full option name
//! and the new value, never the scope it was delivered on. Listeners bind to
//! exactly one scope, either as callbacks or as async streams.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;

/// Scope that receives every change.
pub const GLOBAL_SCOPE: &str = "*";

/// Payload of a change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Full option name that changed.
    pub name: String,
    /// The new value.
    pub value: Value,
}

impl ChangeEvent {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Scopes a change to `name` is announced on, most specific first.
pub fn change_scopes(name: &str) -> Vec<String> {
    let mut scopes = vec![name.to_string()];
    let mut end = name.len();
    while let Some(dot) = name[..end].rfind('.') {
        scopes.push(format!("{}.*", &name[..dot]));
        end = dot;
    }
    scopes.push(GLOBAL_SCOPE.to_string());
    scopes
}

/// Callback invoked with each change delivered on its scope.
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct ScopedEvent {
    scope: String,
    event: ChangeEvent,
}

/// A stream of change events delivered on one scope.
pub struct WatchStream {
    inner: BroadcastStream<ScopedEvent>,
    pattern: String,
}

impl WatchStream {
    fn new(receiver: broadcast::Receiver<ScopedEvent>, pattern: impl Into<String>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            pattern: pattern.into(),
        }
    }

    /// Get the scope this stream is watching.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream")
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl Stream for WatchStream {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(scoped))) => {
                    if scoped.scope == self.pattern {
                        return Poll::Ready(Some(scoped.event));
                    }
                }
                // Skip lagged events
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Registry of callback listeners and stream subscribers.
pub struct ChangeNotifier {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(SubscriptionId, Listener)>>>,
    sender: broadcast::Sender<ScopedEvent>,
}

impl ChangeNotifier {
    /// Create a notifier whose streams buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Bind a callback to a scope (`name`, `prefix.*` or `*`).
    pub fn subscribe<F>(&self, pattern: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(pattern.to_lowercase())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let mut found = false;
        listeners.retain(|_, bound| {
            let before = bound.len();
            bound.retain(|(bound_id, _)| *bound_id != id);
            found |= bound.len() != before;
            !bound.is_empty()
        });
        found
    }

    /// Open an async stream of the events delivered on a scope.
    pub fn watch(&self, pattern: &str) -> WatchStream {
        WatchStream::new(self.sender.subscribe(), pattern.to_lowercase())
    }

    /// Announce a change on every scope it belongs to.
    ///
    /// Listeners are collected before they run, so a callback may subscribe
    /// or unsubscribe without deadlocking.
    pub fn notify(&self, event: &ChangeEvent) {
        for scope in change_scopes(&event.name) {
            let bound: Vec<Listener> = self
                .listeners
                .read()
                .get(&scope)
                .map(|v| v.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default();
            for listener in bound {
                listener(event);
            }
            // Ignore send errors (no stream subscribers)
            let _ = self.sender.send(ScopedEvent {
                scope,
                event: event.clone(),
            });
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_stream::StreamExt;

    #[test]
    fn test_change_scopes_order() {
        assert_eq!(
            change_scopes("a.b.c"),
            vec!["a.b.c", "a.b.*", "a.*", "*"]
        );
        assert_eq!(change_scopes("flat"), vec!["flat", "*"]);
    }

    #[test]
    fn test_cascade_order_and_payload() {
        let notifier = ChangeNotifier::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for pattern in ["*", "ui.*", "ui.panel.*", "ui.panel.width"] {
            let seen = Arc::clone(&seen);
            let label = pattern.to_string();
            notifier.subscribe(pattern, move |event| {
                seen.lock().push((label.clone(), event.clone()));
            });
        }

        notifier.notify(&ChangeEvent::new("ui.panel.width", json!(42)));

        let seen = seen.lock();
        let order: Vec<&str> = seen.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(order, vec!["ui.panel.width", "ui.panel.*", "ui.*", "*"]);
        for (_, event) in seen.iter() {
            assert_eq!(event.name, "ui.panel.width");
            assert_eq!(event.value, json!(42));
        }
    }

    #[test]
    fn test_unrelated_scope_not_called() {
        let notifier = ChangeNotifier::new(16);
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        notifier.subscribe("other.key", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&ChangeEvent::new("ui.panel.width", json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = ChangeNotifier::new(16);
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = notifier.subscribe("*", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&ChangeEvent::new("ui.theme", json!("dark")));
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));

        notifier.notify(&ChangeEvent::new("ui.theme", json!("light")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_stream_filters_scope() {
        let notifier = ChangeNotifier::new(16);
        let mut stream = notifier.watch("ui.*");
        assert_eq!(stream.pattern(), "ui.*");

        notifier.notify(&ChangeEvent::new("net.timeout", json!(5)));
        notifier.notify(&ChangeEvent::new("ui.theme", json!("dark")));

        let event = stream.next().await.unwrap();
        assert_eq!(event, ChangeEvent::new("ui.theme", json!("dark")));
    }
}
