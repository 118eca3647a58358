//! Storage abstraction the engine is built against (spec §4.5, component A).
//!
//! The engine requires only hash-map and set primitives plus a connection
//! lifecycle hook -- it is agnostic to whether the backend is in-memory,
//! Redis, etcd, or anything else. [`memory`] provides a reference
//! implementation for development and tests; production deployments plug in
//! a real backend (out of scope per spec.md §1).

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

/// Callback invoked once the storage backend is connected and ready.
///
/// The engine registers its recovery procedure through this hook at
/// construction time (see `recovery::run`). If a backend has no connect
/// lifecycle of its own, it should invoke the hook synchronously at
/// registration time (spec §4.5).
#[async_trait]
pub trait OnConnected: Send + Sync {
    /// Runs the registered callback.
    async fn call(&self);
}

#[async_trait]
impl<F> OnConnected for F
where
    F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
{
    async fn call(&self) {
        (self)().await;
    }
}

/// Hash-map and set primitives the presence engine is built on top of.
///
/// All operations are asynchronous and fail with the generic `anyhow::Error`
/// on a backend I/O failure; a missing key/field is represented as `None` or
/// an empty collection, never as an error (spec §4.5, §7).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Sets a single hash field.
    async fn hset(&self, table: &str, field: &str, value: String) -> anyhow::Result<()>;

    /// Gets a single hash field, or `None` if the table or field is absent.
    async fn hget(&self, table: &str, field: &str) -> anyhow::Result<Option<String>>;

    /// Returns every field/value pair in a hash. Empty if the table is absent.
    async fn hgetall(&self, table: &str) -> anyhow::Result<HashMap<String, String>>;

    /// Deletes a single hash field. A no-op if it was already absent.
    async fn hdel(&self, table: &str, field: &str) -> anyhow::Result<()>;

    /// Deletes an entire hash table.
    async fn hdrop(&self, table: &str) -> anyhow::Result<()>;

    /// Bulk-sets multiple fields of a hash in one call.
    async fn hsetn(&self, table: &str, fields: &[(String, String)]) -> anyhow::Result<()>;

    /// Adds a member to a set.
    async fn sadd(&self, set: &str, member: &str) -> anyhow::Result<()>;

    /// Removes a member from a set. A no-op if it was already absent.
    async fn srem(&self, set: &str, member: &str) -> anyhow::Result<()>;

    /// Returns every member of a set. Empty if the set is absent.
    async fn sgetall(&self, set: &str) -> anyhow::Result<Vec<String>>;

    /// Registers a function to run once the backend is connected/ready.
    fn add_callback_on_connected(&self, callback: Arc<dyn OnConnected>);
}

/// Key layout constants from spec §6.2.
pub mod keys {
    /// `res:<resource>` -- per-resource status hash.
    #[must_use]
    pub fn resource_table(resource: &str) -> String {
        format!("res:{resource}")
    }

    /// `sys:resources` -- the global live-resources set.
    pub const RESOURCES_SET: &str = "sys:resources";

    /// `sys:status_timers` -- the durable timer mirror.
    pub const TIMERS_TABLE: &str = "sys:status_timers";

    /// `sys:aggregated_statuses` -- the optional aggregated-view cache.
    pub const AGGREGATED_TABLE: &str = "sys:aggregated_statuses";

    /// Field name within [`TIMERS_TABLE`] for a given `(resource, tag)` pair.
    #[must_use]
    pub fn timer_field(resource: &str, tag: &str) -> String {
        format!("{resource}:{tag}")
    }
}
