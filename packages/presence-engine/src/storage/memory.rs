//! In-memory [`StorageBackend`] implementation backed by `DashMap`.
//!
//! Provides concurrent read/write access without external locking, the same
//! role the teacher's `HashMapStorage` plays for `StorageEngine`: a
//! development/test backend, not a production one. Used as the presence
//! engine's default backend in examples and the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;

use super::{OnConnected, StorageBackend};

/// In-memory storage backed by `DashMap`/`DashSet`.
///
/// This backend has no real connection lifecycle -- it is "connected" the
/// moment it is constructed. Per spec §4.5, a backend without a connect
/// event should have its `on_connected` hook invoked synchronously at
/// start-up; [`MemoryBackend::fire_connected`] is that synchronous
/// invocation point, called explicitly by whoever wires the engine together
/// rather than automatically from the constructor, so recovery timing stays
/// deterministic in tests.
#[derive(Default)]
pub struct MemoryBackend {
    hashes: DashMap<String, DashMap<String, String>>,
    sets: DashMap<String, DashSet<String>>,
    on_connected: Mutex<Vec<Arc<dyn OnConnected>>>,
}

impl MemoryBackend {
    /// Creates a new, empty `MemoryBackend`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every registered `on_connected` callback, in registration order.
    pub async fn fire_connected(&self) {
        let callbacks = self.on_connected.lock().clone();
        for callback in callbacks {
            callback.call().await;
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn hset(&self, table: &str, field: &str, value: String) -> anyhow::Result<()> {
        self.hashes
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hget(&self, table: &str, field: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .hashes
            .get(table)
            .and_then(|t| t.get(field).map(|v| v.clone())))
    }

    async fn hgetall(&self, table: &str) -> anyhow::Result<HashMap<String, String>> {
        Ok(self.hashes.get(table).map_or_else(HashMap::new, |t| {
            t.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
        }))
    }

    async fn hdel(&self, table: &str, field: &str) -> anyhow::Result<()> {
        if let Some(t) = self.hashes.get(table) {
            t.remove(field);
        }
        Ok(())
    }

    async fn hdrop(&self, table: &str) -> anyhow::Result<()> {
        self.hashes.remove(table);
        Ok(())
    }

    async fn hsetn(&self, table: &str, fields: &[(String, String)]) -> anyhow::Result<()> {
        let entry = self.hashes.entry(table.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn sadd(&self, set: &str, member: &str) -> anyhow::Result<()> {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> anyhow::Result<()> {
        if let Some(s) = self.sets.get(set) {
            s.remove(member);
        }
        Ok(())
    }

    async fn sgetall(&self, set: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .sets
            .get(set)
            .map_or_else(Vec::new, |s| s.iter().map(|m| m.clone()).collect()))
    }

    fn add_callback_on_connected(&self, callback: Arc<dyn OnConnected>) {
        self.on_connected.lock().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hset_hget_round_trip() {
        let backend = MemoryBackend::new();
        backend.hset("res:alice", "t1", "payload".to_string()).await.unwrap();
        assert_eq!(
            backend.hget("res:alice", "t1").await.unwrap(),
            Some("payload".to_string())
        );
    }

    #[tokio::test]
    async fn hget_missing_table_returns_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.hget("res:nobody", "t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hgetall_returns_all_fields() {
        let backend = MemoryBackend::new();
        backend.hset("res:alice", "t1", "a".to_string()).await.unwrap();
        backend.hset("res:alice", "t2", "b".to_string()).await.unwrap();
        let all = backend.hgetall("res:alice").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("t1"), Some(&"a".to_string()));
        assert_eq!(all.get("t2"), Some(&"b".to_string()));
    }

    #[tokio::test]
    async fn hgetall_missing_table_returns_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.hgetall("res:nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hdel_removes_field_only() {
        let backend = MemoryBackend::new();
        backend.hset("res:alice", "t1", "a".to_string()).await.unwrap();
        backend.hset("res:alice", "t2", "b".to_string()).await.unwrap();
        backend.hdel("res:alice", "t1").await.unwrap();
        let all = backend.hgetall("res:alice").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("t2"));
    }

    #[tokio::test]
    async fn hdel_missing_field_is_noop() {
        let backend = MemoryBackend::new();
        backend.hdel("res:nobody", "t1").await.unwrap();
    }

    #[tokio::test]
    async fn hdrop_removes_whole_table() {
        let backend = MemoryBackend::new();
        backend.hset("res:alice", "t1", "a".to_string()).await.unwrap();
        backend.hdrop("res:alice").await.unwrap();
        assert!(backend.hgetall("res:alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hsetn_bulk_sets_fields() {
        let backend = MemoryBackend::new();
        backend
            .hsetn(
                "res:alice",
                &[
                    ("t1".to_string(), "a".to_string()),
                    ("t2".to_string(), "b".to_string()),
                ],
            )
            .await
            .unwrap();
        let all = backend.hgetall("res:alice").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn set_add_remove_getall() {
        let backend = MemoryBackend::new();
        backend.sadd("sys:resources", "alice").await.unwrap();
        backend.sadd("sys:resources", "bob").await.unwrap();
        let mut members = backend.sgetall("sys:resources").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["alice".to_string(), "bob".to_string()]);

        backend.srem("sys:resources", "alice").await.unwrap();
        let members = backend.sgetall("sys:resources").await.unwrap();
        assert_eq!(members, vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn srem_missing_member_is_noop() {
        let backend = MemoryBackend::new();
        backend.srem("sys:resources", "nobody").await.unwrap();
    }

    #[tokio::test]
    async fn sgetall_missing_set_returns_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.sgetall("sys:nothing").await.unwrap().is_empty());
    }

    struct CountingHook(Arc<std::sync::atomic::AtomicU32>);

    #[async_trait]
    impl OnConnected for CountingHook {
        async fn call(&self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fire_connected_invokes_registered_callbacks() {
        let backend = MemoryBackend::new();
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        backend.add_callback_on_connected(Arc::new(CountingHook(count.clone())));
        backend.add_callback_on_connected(Arc::new(CountingHook(count.clone())));

        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
        backend.fire_connected().await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
