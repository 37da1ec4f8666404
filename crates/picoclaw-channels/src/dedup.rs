//! Inbound dedup cache — TTL + bounded-size eviction, shared across
//! adapters instead of each one reimplementing its own seen-ID map.
//!
//! Grounded in the teacher's per-adapter `typing_tasks`-style
//! `Arc<RwLock<HashMap<...>>>` pattern (`discord.rs`), generalized from a
//! map of join handles to a map of insertion timestamps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Default TTL for a seen message ID (spec floor: >= 60s).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Default max tracked IDs (spec floor: >= 1000).
pub const DEFAULT_MAX_SIZE: usize = 1000;

struct Entry {
    inserted_at: Instant,
    seq: u64,
}

/// Dedup set of recently seen platform message IDs.
///
/// Eviction order: first remove an already-TTL-expired entry if one
/// exists; otherwise, if at capacity, remove the oldest-inserted entry
/// (by insertion sequence, not wall clock) — deterministic even when
/// many entries share the same `Instant`.
pub struct DedupCache {
    ttl: Duration,
    max_size: usize,
    seen: RwLock<HashMap<String, Entry>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl DedupCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            seen: RwLock::new(HashMap::new()),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_SIZE)
    }

    /// Returns `true` if `id` was already seen within the TTL (i.e. this
    /// call is a duplicate and should be dropped). Otherwise records it
    /// and returns `false`.
    pub async fn check_and_insert(&self, id: &str) -> bool {
        let mut seen = self.seen.write().await;
        let now = Instant::now();

        if let Some(entry) = seen.get(id) {
            if now.duration_since(entry.inserted_at) < self.ttl {
                return true;
            }
        }

        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        seen.insert(
            id.to_string(),
            Entry {
                inserted_at: now,
                seq,
            },
        );

        if seen.len() > self.max_size {
            evict_one(&mut seen, now, self.ttl);
        }

        false
    }

    pub async fn len(&self) -> usize {
        self.seen.read().await.len()
    }
}

fn evict_one(seen: &mut HashMap<String, Entry>, now: Instant, ttl: Duration) {
    let expired = seen
        .iter()
        .filter(|(_, e)| now.duration_since(e.inserted_at) >= ttl)
        .min_by_key(|(_, e)| e.seq)
        .map(|(k, _)| k.clone());

    let victim = expired.or_else(|| {
        seen.iter()
            .min_by_key(|(_, e)| e.seq)
            .map(|(k, _)| k.clone())
    });

    if let Some(key) = victim {
        seen.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_insert_within_ttl_is_duplicate() {
        let cache = DedupCache::new(Duration::from_secs(3600), 10);
        assert!(!cache.check_and_insert("msg-1").await);
        assert!(cache.check_and_insert("msg-1").await);
    }

    #[tokio::test]
    async fn test_bounded_eviction_drops_oldest_inserted() {
        let cache = DedupCache::new(Duration::from_secs(3600), 3);
        assert!(!cache.check_and_insert("a").await);
        assert!(!cache.check_and_insert("b").await);
        assert!(!cache.check_and_insert("c").await);
        assert!(!cache.check_and_insert("d").await);

        assert_eq!(cache.len().await, 3);
        // `a` was evicted, `{b, c, d}` retained.
        assert!(cache.check_and_insert("b").await);
        assert!(cache.check_and_insert("c").await);
        assert!(cache.check_and_insert("d").await);
    }

    #[tokio::test]
    async fn test_dedup_ttl_eviction_scenario() {
        // Max size 3, insert a,b,c,d: cache size 3, `a` evicted, `{b,c,d}` retained.
        let cache = DedupCache::new(Duration::from_secs(3600), 3);
        for id in ["a", "b", "c", "d"] {
            assert!(!cache.check_and_insert(id).await);
        }
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn test_expired_entry_evicted_before_oldest_inserted() {
        let cache = DedupCache::new(Duration::from_millis(20), 2);
        assert!(!cache.check_and_insert("a").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cache.check_and_insert("b").await);
        assert!(!cache.check_and_insert("c").await);

        assert_eq!(cache.len().await, 2);
        assert!(!cache.check_and_insert("b").await);
        assert!(cache.check_and_insert("c").await);
    }
}
