//! Expiry timer registry (spec §4.2, component B).
//!
//! Two representations of the same fact are kept in sync: an in-memory map
//! of `(resource, tag) -> JoinHandle` that actually schedules the fire
//! callback, and a durable mirror in the storage backend's
//! `sys:status_timers` hash that survives a restart. The in-memory handle is
//! authoritative for scheduling; the mirror is authoritative for recovery.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::storage::{keys, StorageBackend};

/// Key identifying a single pending timer.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TimerKey {
    resource: String,
    tag: String,
}

/// A fire callback: invoked with the elapsed `(resource, tag)` once a timer
/// expires. Boxed so `TimerRegistry` doesn't need to be generic over the
/// engine it drives.
pub type FireCallback =
    Arc<dyn Fn(String, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct TimerHandle {
    join: tokio::task::JoinHandle<()>,
}

/// In-memory map of pending expiry timers, write-through mirrored to
/// durable storage.
pub struct TimerRegistry {
    handles: DashMap<TimerKey, TimerHandle>,
    storage: Arc<dyn StorageBackend>,
    on_fire: std::sync::OnceLock<FireCallback>,
}

impl TimerRegistry {
    /// Creates an empty registry bound to `storage`.
    ///
    /// The fire callback is bound separately via [`TimerRegistry::bind_fire_callback`]
    /// because the callback typically closes over the engine that owns this
    /// registry, which does not exist yet at construction time.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            handles: DashMap::new(),
            storage,
            on_fire: std::sync::OnceLock::new(),
        }
    }

    /// Binds the callback invoked when a timer fires. Must be called exactly
    /// once, before any timer is installed.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn bind_fire_callback(&self, callback: FireCallback) {
        self.on_fire
            .set(callback)
            .unwrap_or_else(|_| panic!("TimerRegistry::bind_fire_callback called twice"));
    }

    fn fire_callback(&self) -> FireCallback {
        self.on_fire
            .get()
            .cloned()
            .expect("TimerRegistry used before bind_fire_callback")
    }

    /// Number of currently active timers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    /// Installs (or replaces) the timer for `(resource, tag)`, firing at wall-clock
    /// `expires_at` seconds, `delay` seconds from now. Aborts any existing timer
    /// for the same key first, so a reset never fires the stale callback.
    ///
    /// Writes through to the durable mirror unless `memory_only` is set (used
    /// by recovery, which is reconstructing state the mirror already has).
    pub async fn install(
        &self,
        resource: &str,
        tag: &str,
        expires_at: f64,
        delay: std::time::Duration,
        memory_only: bool,
    ) {
        let key = TimerKey {
            resource: resource.to_string(),
            tag: tag.to_string(),
        };

        if let Some((_, old)) = self.handles.remove(&key) {
            old.join.abort();
        }

        let callback = self.fire_callback();
        let fire_resource = resource.to_string();
        let fire_tag = tag.to_string();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(fire_resource, fire_tag).await;
        });

        self.handles.insert(key, TimerHandle { join });

        if !memory_only {
            if let Err(err) = self
                .storage
                .hset(
                    keys::TIMERS_TABLE,
                    &keys::timer_field(resource, tag),
                    expires_at.to_string(),
                )
                .await
            {
                warn!(resource, tag, error = %err, "failed to mirror timer to durable storage");
            }
        }
    }

    /// Cancels the timer for `(resource, tag)`, in memory and in the durable
    /// mirror. A no-op if no such timer is active.
    pub async fn cancel(&self, resource: &str, tag: &str) {
        let key = TimerKey {
            resource: resource.to_string(),
            tag: tag.to_string(),
        };
        if let Some((_, handle)) = self.handles.remove(&key) {
            handle.join.abort();
        }
        if let Err(err) = self
            .storage
            .hdel(keys::TIMERS_TABLE, &keys::timer_field(resource, tag))
            .await
        {
            warn!(resource, tag, error = %err, "failed to remove timer mirror entry");
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        for entry in self.handles.iter() {
            entry.value().join.abort();
        }
    }
}

/// Parses a `resource:tag` timer-mirror field into its two parts.
///
/// Resource names never contain `:` in practice, but tags are generated
/// independently, so the split point is the *last* colon, matching how
/// `original_source`'s recovery path reassembles the tuple key.
#[must_use]
pub fn parse_timer_field(field: &str) -> Option<(&str, &str)> {
    let idx = field.rfind(':')?;
    let (resource, rest) = field.split_at(idx);
    let tag = &rest[1..];
    if resource.is_empty() || tag.is_empty() {
        return None;
    }
    Some((resource, tag))
}

/// Runs §4.2's recovery procedure: reads the full durable timer mirror,
/// immediately expires anything already past due, and installs memory-only
/// timers (no re-mirror write) for the rest. Corrupt entries are logged and
/// skipped rather than aborting the scan.
///
/// `now` is the current wall-clock time in seconds; `expire` is invoked for
/// entries already past due (normally the engine's `Remove`).
pub async fn run<F, Fut>(
    registry: &TimerRegistry,
    storage: &dyn StorageBackend,
    now: f64,
    mut expire: F,
) where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mirror = match storage.hgetall(keys::TIMERS_TABLE).await {
        Ok(m) => m,
        Err(err) => {
            warn!(error = %err, "recovery: failed to read timer mirror, skipping recovery");
            return;
        }
    };

    for (field, expires_at_raw) in mirror {
        let Some((resource, tag)) = parse_timer_field(&field) else {
            warn!(field, "recovery: skipping malformed timer field");
            continue;
        };
        let Ok(expires_at) = expires_at_raw.parse::<f64>() else {
            warn!(field, value = %expires_at_raw, "recovery: skipping non-numeric expires_at");
            continue;
        };

        if expires_at < now {
            debug!(resource, tag, "recovery: entry already expired, removing");
            expire(resource.to_string(), tag.to_string()).await;
        } else {
            let delay = std::time::Duration::from_secs_f64(expires_at - now);
            debug!(resource, tag, delay = delay.as_secs_f64(), "recovery: installing timer");
            registry.install(resource, tag, expires_at, delay, true).await;
        }
    }
}
