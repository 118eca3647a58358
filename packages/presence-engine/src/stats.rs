//! Engine-owned counters, exposed read-only (spec §9 design note: "a
//! counters object owned by the engine, exposed read-only").
//!
//! Names match the original's `stats` dict keys directly, so anyone who
//! operated the Python service recognises the metric names unchanged.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic operation counters. All increments happen from engine methods
/// only (spec §5: "Stats counters: monotonically incremented from the
/// engine task only").
#[derive(Debug, Default)]
pub struct Counters {
    presence_put_statuses: AtomicU64,
    presence_updated_statuses: AtomicU64,
    presence_removed_statuses: AtomicU64,
    presence_gotten_statuses: AtomicU64,
    presence_dumped_statuses: AtomicU64,
    presence_active_timers: AtomicU64,
}

impl Counters {
    pub(crate) fn record_put(&self) {
        self.presence_put_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.presence_updated_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.presence_removed_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.presence_gotten_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dump(&self) {
        self.presence_dumped_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_active_timers(&self, count: u64) {
        self.presence_active_timers.store(count, Ordering::Relaxed);
    }

    /// Total successful `Put` calls.
    #[must_use]
    pub fn presence_put_statuses(&self) -> u64 {
        self.presence_put_statuses.load(Ordering::Relaxed)
    }

    /// Total successful `Update` calls.
    #[must_use]
    pub fn presence_updated_statuses(&self) -> u64 {
        self.presence_updated_statuses.load(Ordering::Relaxed)
    }

    /// Total successful `Remove` calls (including timer-fire and lazy-sweep removals).
    #[must_use]
    pub fn presence_removed_statuses(&self) -> u64 {
        self.presence_removed_statuses.load(Ordering::Relaxed)
    }

    /// Total `Get` calls.
    #[must_use]
    pub fn presence_gotten_statuses(&self) -> u64 {
        self.presence_gotten_statuses.load(Ordering::Relaxed)
    }

    /// Total `Dump` calls.
    #[must_use]
    pub fn presence_dumped_statuses(&self) -> u64 {
        self.presence_dumped_statuses.load(Ordering::Relaxed)
    }

    /// Current count of active expiry timers.
    #[must_use]
    pub fn presence_active_timers(&self) -> u64 {
        self.presence_active_timers.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let counters = Counters::default();
        assert_eq!(counters.presence_put_statuses(), 0);
        assert_eq!(counters.presence_active_timers(), 0);
    }

    #[test]
    fn record_methods_increment_independently() {
        let counters = Counters::default();
        counters.record_put();
        counters.record_put();
        counters.record_update();
        counters.record_remove();
        counters.record_get();
        counters.record_dump();

        assert_eq!(counters.presence_put_statuses(), 2);
        assert_eq!(counters.presence_updated_statuses(), 1);
        assert_eq!(counters.presence_removed_statuses(), 1);
        assert_eq!(counters.presence_gotten_statuses(), 1);
        assert_eq!(counters.presence_dumped_statuses(), 1);
    }

    #[test]
    fn active_timers_is_a_gauge_not_a_counter() {
        let counters = Counters::default();
        counters.set_active_timers(5);
        assert_eq!(counters.presence_active_timers(), 5);
        counters.set_active_timers(2);
        assert_eq!(counters.presence_active_timers(), 2);
    }
}
