//! Per-connection tool list cache with a TTL.
//!
//! Entries are tagged with the connection generation that produced them, so
//! a listing from a transport that has since been replaced is never served.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use flowmcp_core::ToolDescriptor;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    generation: u64,
    tools: Vec<ToolDescriptor>,
    fetched_at: Instant,
}

/// Cached `tools/list` result for one server.
#[derive(Debug)]
pub struct ToolCache {
    ttl: Duration,
    entry: Mutex<Option<Entry>>,
}

impl ToolCache {
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Tools fetched by `generation` within the TTL.
    pub fn fresh(&self, generation: u64) -> Option<Vec<ToolDescriptor>> {
        let entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        entry
            .as_ref()
            .filter(|e| e.generation == generation && e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.tools.clone())
    }

    /// Tools fetched by `generation`, regardless of age.
    ///
    /// Served when a live listing fails: a previously good answer is better
    /// than none.
    pub fn stale(&self, generation: u64) -> Option<Vec<ToolDescriptor>> {
        let entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        entry
            .as_ref()
            .filter(|e| e.generation == generation)
            .map(|e| e.tools.clone())
    }

    pub fn store(&self, generation: u64, tools: Vec<ToolDescriptor>) {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = Some(Entry {
            generation,
            tools,
            fetched_at: Instant::now(),
        });
    }

    pub fn clear(&self) {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new("add")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ToolCache::new(Duration::from_secs(60));
        cache.store(1, tools());
        assert!(cache.fresh(1).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.fresh(1).is_none());
        assert!(cache.stale(1).is_some());
    }

    #[tokio::test]
    async fn test_other_generation_is_invisible() {
        let cache = ToolCache::new(Duration::from_secs(60));
        cache.store(1, tools());
        assert!(cache.fresh(2).is_none());
        assert!(cache.stale(2).is_none());
    }

    #[tokio::test]
    async fn test_clear_drops_entry() {
        let cache = ToolCache::new(Duration::from_secs(60));
        cache.store(3, tools());
        cache.clear();
        assert!(cache.stale(3).is_none());
    }
}
