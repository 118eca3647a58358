//! The presence engine (spec §4.1, component D): `put`/`update`/`get`/
//! `remove`/`dump`, timer orchestration, recovery, and the watcher fan-out
//! every mutation feeds.
//!
//! This is the `put`/`update`/`get`/`remove` surface spec §9 recommends over
//! the `putStatus`/`updateStatus` duplication found across the
//! `original_source` drafts -- there is exactly one way to do each of these
//! things here.
//!
//! Per-resource mutations are serialized through a per-resource
//! `tokio::sync::Mutex`, generalizing the teacher's single global in-flight
//! guard (`ShutdownController`) to a per-key lock table -- the discipline
//! spec §5 calls for ("operations submitted on the same resource complete in
//! submission order").

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use presence_core::{aggregate_status, aggregate_winner, tag as tag_gen, validate_expires, PresenceError, Status};
use serde_json::Value;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::stats::Counters;
use crate::storage::{keys, StorageBackend};
use crate::timer::{self, TimerRegistry};
use crate::watcher::{Watcher, WatcherRegistry};

type ResourceLock = Arc<tokio::sync::Mutex<()>>;

/// The presence engine: the per-resource multi-tag status store, its expiry
/// timers, and the watcher fan-out.
///
/// Always constructed behind an `Arc` -- timer fire callbacks and the
/// storage backend's connect hook both hold a weak handle back into the
/// engine that outlives the call which registered them.
pub struct PresenceEngine {
    storage: Arc<dyn StorageBackend>,
    timers: Arc<TimerRegistry>,
    watchers: WatcherRegistry,
    counters: Counters,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    resource_locks: DashMap<String, ResourceLock>,
    /// First-insertion-first order of live tags per resource, tracked
    /// alongside the storage hash. This is the engine's in-memory mirror of
    /// spec invariant 3 (a tag appearing in the per-resource hash also
    /// exists in the per-resource tag set); it also pins the tie-break order
    /// aggregation needs (spec §9: "earliest insertion wins").
    tag_order: DashMap<String, SyncMutex<Vec<String>>>,
}

impl PresenceEngine {
    /// Builds a new engine over `storage` with the given `watchers`, reading
    /// the real system clock.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        watchers: Vec<Arc<dyn Watcher>>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Self::with_clock(storage, watchers, config, Arc::new(SystemClock))
    }

    /// Builds a new engine with an injected [`Clock`], for deterministic tests.
    #[must_use]
    pub fn with_clock(
        storage: Arc<dyn StorageBackend>,
        watchers: Vec<Arc<dyn Watcher>>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let timers = Arc::new(TimerRegistry::new(storage.clone()));
        let engine = Arc::new(Self {
            storage: storage.clone(),
            timers: timers.clone(),
            watchers: WatcherRegistry::new(watchers),
            counters: Counters::default(),
            config,
            clock,
            resource_locks: DashMap::new(),
            tag_order: DashMap::new(),
        });

        let fire_engine: Weak<PresenceEngine> = Arc::downgrade(&engine);
        timers.bind_fire_callback(Arc::new(move |resource: String, tag: String| {
            let fire_engine = fire_engine.clone();
            Box::pin(async move {
                if let Some(engine) = fire_engine.upgrade() {
                    if let Err(err) = engine.remove(&resource, &tag).await {
                        warn!(resource, tag, error = %err, "timer-fire remove failed");
                    }
                }
            })
        }));

        let recovery_engine: Weak<PresenceEngine> = Arc::downgrade(&engine);
        storage.add_callback_on_connected(Arc::new(move || {
            let recovery_engine = recovery_engine.clone();
            Box::pin(async move {
                if let Some(engine) = recovery_engine.upgrade() {
                    engine.recover().await;
                }
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        }));

        engine
    }

    /// Engine-owned operation counters, read-only (spec §9 design note).
    #[must_use]
    pub fn stats(&self) -> &Counters {
        &self.counters
    }

    /// Stores a new status report for `resource`, generating a 10-character
    /// tag if the caller didn't supply one.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] if `resource` is empty, `expires_s`
    /// is non-positive or exceeds the configured limit, or `presence_doc` has
    /// no valid `status` field; [`EngineError::Storage`] on a backend failure.
    #[allow(clippy::cast_precision_loss)]
    pub async fn put(
        &self,
        resource: &str,
        presence_doc: Value,
        expires_s: i64,
        priority: i32,
        tag: Option<String>,
    ) -> Result<String, EngineError> {
        validate_resource(resource)?;
        validate_expires(expires_s, self.config.max_expires_s)?;

        let lock = self.resource_lock(resource);
        let _guard = lock.lock().await;

        let tag = tag.unwrap_or_else(tag_gen::generate);
        let now = self.clock.now();
        let expires_at = now + expires_s as f64;
        let status = Status::new(presence_doc, expires_at, priority)?;

        let table = keys::resource_table(resource);
        let serialized = serde_json::to_string(&status).map_err(anyhow::Error::from)?;
        self.storage.hset(&table, &tag, serialized).await?;
        self.storage.sadd(keys::RESOURCES_SET, resource).await?;
        self.record_tag(resource, &tag);

        self.timers
            .install(resource, &tag, expires_at, Duration::from_secs_f64(expires_s as f64), false)
            .await;
        self.sync_active_timers();

        self.notify_and_cache(resource).await;
        self.counters.record_put();
        info!(resource, tag = %tag, expires_s, priority, "put status");
        Ok(tag)
    }

    /// Replaces the expiry of an existing `(resource, tag)` status, resetting
    /// its timer. Returns `Ok(false)` if no such status exists -- per spec §7
    /// this is a not-found sentinel, not an error.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] if `expires_s` is non-positive or
    /// exceeds the configured limit; [`EngineError::Storage`] on a backend
    /// failure.
    #[allow(clippy::cast_precision_loss)]
    pub async fn update(&self, resource: &str, tag: &str, expires_s: i64) -> Result<bool, EngineError> {
        validate_expires(expires_s, self.config.max_expires_s)?;

        let lock = self.resource_lock(resource);
        let _guard = lock.lock().await;

        let table = keys::resource_table(resource);
        let Some(raw) = self.storage.hget(&table, tag).await? else {
            info!(resource, tag, "update status not found");
            return Ok(false);
        };
        let mut status: Status = serde_json::from_str(&raw).map_err(anyhow::Error::from)?;

        let now = self.clock.now();
        let expires_at = now + expires_s as f64;
        status.expires_at = expires_at;

        let serialized = serde_json::to_string(&status).map_err(anyhow::Error::from)?;
        self.storage.hset(&table, tag, serialized).await?;

        self.timers
            .install(resource, tag, expires_at, Duration::from_secs_f64(expires_s as f64), false)
            .await;
        self.sync_active_timers();

        self.notify_and_cache(resource).await;
        self.counters.record_update();
        info!(resource, tag, expires_s, "update status ok");
        Ok(true)
    }

    /// Returns the live `(tag, status)` pairs for `resource`, or just the one
    /// named by `tag` if given. Statuses whose `expires_at` has already
    /// passed are pruned (removed, watchers notified) before the result is
    /// built -- the lazy sweeper that complements the timer-driven path
    /// (spec §4.1).
    ///
    /// # Errors
    /// Returns [`EngineError::Storage`] on a backend failure.
    pub async fn get(&self, resource: &str, tag: Option<&str>) -> Result<Vec<(String, Status)>, EngineError> {
        let lock = self.resource_lock(resource);
        let _guard = lock.lock().await;
        self.counters.record_get();

        let table = keys::resource_table(resource);
        let now = self.clock.now();

        if let Some(tag) = tag {
            let Some(raw) = self.storage.hget(&table, tag).await? else {
                return Ok(Vec::new());
            };
            let Some(status) = parse_status(&raw, resource, tag) else {
                return Ok(Vec::new());
            };
            if status.is_expired(now) {
                self.remove_locked(resource, tag).await?;
                self.notify_and_cache(resource).await;
                return Ok(Vec::new());
            }
            return Ok(vec![(tag.to_string(), status)]);
        }

        let raw = self.storage.hgetall(&table).await?;
        let mut active = Vec::with_capacity(raw.len());
        let mut expired_tags = Vec::new();
        for t in self.ordered_tags(resource, &raw) {
            let Some(raw_status) = raw.get(&t) else { continue };
            let Some(status) = parse_status(raw_status, resource, &t) else {
                continue;
            };
            if status.is_expired(now) {
                expired_tags.push(t);
            } else {
                active.push((t, status));
            }
        }

        if !expired_tags.is_empty() {
            for t in &expired_tags {
                self.remove_locked(resource, t).await?;
            }
            self.notify_and_cache(resource).await;
        }

        Ok(active)
    }

    /// Removes `(resource, tag)`: cancels its timer, deletes the status
    /// record, and drops `resource` from the resources set if it was the
    /// last live tag. Returns `Ok(false)` if nothing was there to remove.
    ///
    /// # Errors
    /// Returns [`EngineError::Storage`] on a backend failure.
    pub async fn remove(&self, resource: &str, tag: &str) -> Result<bool, EngineError> {
        let lock = self.resource_lock(resource);
        let _guard = lock.lock().await;
        let removed = self.remove_locked(resource, tag).await?;
        if removed {
            self.notify_and_cache(resource).await;
            info!(resource, tag, "remove status ok");
        } else {
            info!(resource, tag, "remove status not found");
        }
        Ok(removed)
    }

    /// Core of [`Self::remove`], assuming the caller already holds
    /// `resource`'s lock. Used directly by [`Self::get`]'s lazy sweep so it
    /// doesn't try to re-acquire a lock it's already holding.
    async fn remove_locked(&self, resource: &str, tag: &str) -> Result<bool, EngineError> {
        let table = keys::resource_table(resource);
        if self.storage.hget(&table, tag).await?.is_none() {
            return Ok(false);
        }

        self.timers.cancel(resource, tag).await;
        self.sync_active_timers();
        self.storage.hdel(&table, tag).await?;
        self.forget_tag(resource, tag);

        let remaining = self.storage.hgetall(&table).await?;
        if remaining.is_empty() {
            self.storage.srem(keys::RESOURCES_SET, resource).await?;
            self.storage.hdrop(&table).await?;
            self.tag_order.remove(resource);
        }

        self.counters.record_remove();
        Ok(true)
    }

    /// Enumerates every live resource and its statuses. Expired entries
    /// encountered along the way are pruned exactly as in [`Self::get`].
    ///
    /// # Errors
    /// Returns [`EngineError::Storage`] on a backend failure.
    pub async fn dump(&self) -> Result<HashMap<String, Vec<(String, Status)>>, EngineError> {
        let resources = self.storage.sgetall(keys::RESOURCES_SET).await?;
        let mut result = HashMap::with_capacity(resources.len());
        for resource in resources {
            let statuses = self.get(&resource, None).await?;
            result.insert(resource, statuses);
        }
        self.counters.record_dump();
        Ok(result)
    }

    /// The current aggregated view for `resource`, computed read-time from
    /// its live statuses (spec §4.3) -- the read path an HTTP `GET` adapter
    /// would call. Does not notify watchers; that only happens as a side
    /// effect of a mutation.
    ///
    /// # Errors
    /// Returns [`EngineError::Storage`] on a backend failure.
    pub async fn aggregated_view(&self, resource: &str) -> Result<Value, EngineError> {
        let statuses = self.live_statuses(resource).await?;
        Ok(aggregate_status(&statuses))
    }

    /// Rebuilds in-memory timers from the durable mirror (spec §4.2).
    /// Registered as the storage backend's `on_connected` hook at
    /// construction time; safe to call again -- recovery is idempotent.
    pub async fn recover(&self) {
        let now = self.clock.now();
        timer::run(&self.timers, self.storage.as_ref(), now, |resource, tag| async move {
            if let Err(err) = self.remove(&resource, &tag).await {
                warn!(resource, tag, error = %err, "recovery: failed to remove expired entry");
            }
        })
        .await;
        self.sync_active_timers();
    }

    async fn live_statuses(&self, resource: &str) -> Result<Vec<Status>, EngineError> {
        let table = keys::resource_table(resource);
        let raw = self.storage.hgetall(&table).await?;
        let now = self.clock.now();
        let mut statuses = Vec::with_capacity(raw.len());
        for t in self.ordered_tags(resource, &raw) {
            let Some(raw_status) = raw.get(&t) else { continue };
            if let Some(status) = parse_status(raw_status, resource, &t) {
                if !status.is_expired(now) {
                    statuses.push(status);
                }
            }
        }
        Ok(statuses)
    }

    /// Recomputes the aggregated view for `resource`, fans it out to every
    /// watcher, and best-effort writes the winning status to the optional
    /// `sys:aggregated_statuses` cache. The cache is never read back by the
    /// engine; write failures are logged and swallowed, same as watcher
    /// failures (spec §7).
    async fn notify_and_cache(&self, resource: &str) {
        let statuses = match self.live_statuses(resource).await {
            Ok(statuses) => statuses,
            Err(err) => {
                warn!(resource, error = %err, "failed to read statuses for aggregation");
                Vec::new()
            }
        };

        let view = aggregate_status(&statuses);
        self.watchers.notify(resource, view);

        if let Some(winner) = aggregate_winner(&statuses) {
            match serde_json::to_string(winner) {
                Ok(serialized) => {
                    if let Err(err) = self
                        .storage
                        .hset(keys::AGGREGATED_TABLE, resource, serialized)
                        .await
                    {
                        warn!(resource, error = %err, "failed to write aggregated-view cache");
                    }
                }
                Err(err) => warn!(resource, error = %err, "failed to serialize aggregated-view cache entry"),
            }
        }
    }

    fn resource_lock(&self, resource: &str) -> ResourceLock {
        self.resource_locks
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn record_tag(&self, resource: &str, tag: &str) {
        let order = self.tag_order.entry(resource.to_string()).or_default();
        let mut order = order.lock();
        if !order.iter().any(|t| t == tag) {
            order.push(tag.to_string());
        }
    }

    fn forget_tag(&self, resource: &str, tag: &str) {
        if let Some(order) = self.tag_order.get(resource) {
            order.lock().retain(|t| t != tag);
        }
    }

    /// Orders the tags present in `present` by first-insertion (spec §9's
    /// tie-break pin), falling back to a lexicographic order for any tag
    /// this engine instance never saw registered (e.g. loaded from storage
    /// by a process that didn't put it there).
    fn ordered_tags(&self, resource: &str, present: &HashMap<String, String>) -> Vec<String> {
        let mut ordered = Vec::with_capacity(present.len());
        if let Some(order) = self.tag_order.get(resource) {
            for t in order.lock().iter() {
                if present.contains_key(t) {
                    ordered.push(t.clone());
                }
            }
        }
        let mut stragglers: Vec<String> = present
            .keys()
            .filter(|t| !ordered.contains(t))
            .cloned()
            .collect();
        stragglers.sort();
        ordered.extend(stragglers);
        ordered
    }

    #[allow(clippy::cast_possible_truncation)]
    fn sync_active_timers(&self) {
        self.counters.set_active_timers(self.timers.active_count() as u64);
    }
}

fn validate_resource(resource: &str) -> Result<(), PresenceError> {
    if resource.is_empty() {
        Err(PresenceError::EmptyResource)
    } else {
        Ok(())
    }
}

fn parse_status(raw: &str, resource: &str, tag: &str) -> Option<Status> {
    match serde_json::from_str(raw) {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(resource, tag, error = %err, "skipping corrupt status record");
            None
        }
    }
}
