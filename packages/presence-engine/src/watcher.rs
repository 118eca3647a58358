//! Watcher fan-out (spec §4.4, component E).
//!
//! Watchers are registered once at construction time and invoked on every
//! effective change to a resource's aggregated view. Notification delivery
//! is fire-and-forget from the engine's perspective: the call that triggers
//! a notification only waits for a cheap channel send, never for watcher
//! completion, while a background task drains the queue in submission order
//! so per-resource delivery order is preserved (§5 guarantee 2).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

/// A subscriber notified on every aggregated-view change.
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    /// Called with the resource name and its freshly computed aggregated view.
    async fn notify(&self, resource: &str, view: &serde_json::Value);
}

struct Event {
    resource: String,
    view: serde_json::Value,
}

/// Fan-out registry: holds the watcher list and drains a notification queue
/// in order, one event at a time, awaiting each watcher's `notify` future to
/// completion before moving to the next event.
pub struct WatcherRegistry {
    sender: tokio::sync::mpsc::UnboundedSender<Event>,
    _drain: tokio::task::JoinHandle<()>,
}

impl WatcherRegistry {
    /// Creates a registry with a fixed watcher list and spawns its drain task.
    #[must_use]
    pub fn new(watchers: Vec<Arc<dyn Watcher>>) -> Self {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Event>();
        let drain = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                for watcher in &watchers {
                    call_catching_panics(watcher.clone(), &event.resource, event.view.clone())
                        .await;
                }
            }
        });
        Self {
            sender,
            _drain: drain,
        }
    }

    /// Enqueues a notification. Never blocks the caller on watcher execution;
    /// only fails (silently logged) if the drain task has died.
    pub fn notify(&self, resource: &str, view: serde_json::Value) {
        if self
            .sender
            .send(Event {
                resource: resource.to_string(),
                view,
            })
            .is_err()
        {
            warn!(resource, "watcher drain task is gone, dropping notification");
        }
    }
}

/// Invokes `watcher.notify` with a panic boundary, so one misbehaving
/// watcher can't break delivery to the rest of the list or kill the drain
/// task -- the catching boundary required by §4.4 and §7's
/// watcher-callback-failure policy.
///
/// The call runs inside its own spawned task (all arguments are owned, so
/// the task has no borrowed data to outlive) and the panic is observed
/// through the `JoinHandle` rather than via `std::panic::catch_unwind`
/// directly, since that can't wrap a future across an `.await` point.
async fn call_catching_panics(watcher: Arc<dyn Watcher>, resource: &str, view: serde_json::Value) {
    let resource = resource.to_string();
    let result = tokio::spawn(async move { watcher.notify(&resource, &view).await }).await;
    if let Err(join_err) = result {
        warn!(panic = ?join_err, "watcher panicked, dropping");
    }
}
