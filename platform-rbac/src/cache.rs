//! Authorization decision cache.
//!
//! Caches allow/deny outcomes keyed by the exact set of candidate roles, the
//! application and the permission code. Entries expire after a fixed TTL and
//! the cache never grows past its capacity: when full, the oldest decision is
//! evicted.
//!
//! # Invalidation
//!
//! Grant and revoke writes drop every entry whose role set contains the
//! affected role; reconciliations drop every entry of the application. Each
//! invalidation bumps a generation counter under the write lock. A resolver
//! reads the generation before computing a decision and passes it back to
//! [`DecisionCache::insert`], which discards the decision if an invalidation
//! happened in between.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::apps::AppId;
use crate::roles::RoleId;

/// Cache key of one authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    roles: Vec<RoleId>,
    app_id: AppId,
    code: String,
}

impl DecisionKey {
    /// Build a key; the role list is normalized to a sorted set.
    pub fn new(
        roles: impl IntoIterator<Item = RoleId>,
        app_id: AppId,
        code: impl Into<String>,
    ) -> Self {
        let mut roles: Vec<RoleId> = roles.into_iter().collect();
        roles.sort();
        roles.dedup();
        Self {
            roles,
            app_id,
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    allowed: bool,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Entries {
    decisions: HashMap<DecisionKey, CachedDecision>,
    /// Insertion order. Holds stale keys after invalidations and overwrites;
    /// those are skipped when popped.
    order: VecDeque<(DecisionKey, Instant)>,
}

impl Entries {
    fn remove_if_current(&mut self, key: &DecisionKey, expires_at: Instant) -> bool {
        let current = self
            .decisions
            .get(key)
            .is_some_and(|cached| cached.expires_at == expires_at);
        if current {
            self.decisions.remove(key);
        }
        current
    }

    fn purge_expired(&mut self, now: Instant) {
        while self
            .order
            .front()
            .is_some_and(|(_, expires_at)| *expires_at <= now)
        {
            if let Some((key, expires_at)) = self.order.pop_front() {
                self.remove_if_current(&key, expires_at);
            }
        }
    }

    fn evict_oldest(&mut self) {
        while let Some((key, expires_at)) = self.order.pop_front() {
            if self.remove_if_current(&key, expires_at) {
                return;
            }
        }
    }

    fn compact(&mut self, capacity: usize) {
        if self.order.len() <= capacity.saturating_mul(2) {
            return;
        }
        let decisions = &self.decisions;
        self.order.retain(|(key, expires_at)| {
            decisions
                .get(key)
                .is_some_and(|cached| cached.expires_at == *expires_at)
        });
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
}

/// TTL and capacity bounded cache of authorization decisions.
#[derive(Debug)]
pub struct DecisionCache {
    entries: RwLock<Entries>,
    generation: AtomicU64,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    /// Create an empty cache.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            generation: AtomicU64::new(0),
            ttl,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Look up a decision that has not expired.
    pub async fn get(&self, key: &DecisionKey) -> Option<bool> {
        let entries = self.entries.read().await;
        let found = entries
            .decisions
            .get(key)
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.allowed);

        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a decision computed at `generation`.
    ///
    /// Evicts the oldest decision when the cache is full. Returns `false`
    /// when the decision was discarded: an invalidation happened since
    /// `generation` was read, the capacity is zero, or the TTL does not fit
    /// the clock.
    pub async fn insert(&self, key: DecisionKey, allowed: bool, generation: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(self.ttl) else {
            return false;
        };

        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }

        entries.purge_expired(now);
        if entries.decisions.len() >= self.capacity && !entries.decisions.contains_key(&key) {
            entries.evict_oldest();
        }

        entries.decisions.insert(key.clone(), CachedDecision { allowed, expires_at });
        entries.order.push_back((key, expires_at));
        entries.compact(self.capacity);
        true
    }

    /// Drop every decision whose role set contains `role_id`.
    pub async fn invalidate_role(&self, role_id: RoleId) -> usize {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = entries.decisions.len();
        entries
            .decisions
            .retain(|key, _| key.roles.binary_search(&role_id).is_err());
        before - entries.decisions.len()
    }

    /// Drop every decision about `app_id`.
    pub async fn invalidate_app(&self, app_id: &AppId) -> usize {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = entries.decisions.len();
        entries.decisions.retain(|key, _| &key.app_id != app_id);
        before - entries.decisions.len()
    }

    /// Drop everything.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.decisions.clear();
        entries.order.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.decisions.len()
    }

    /// Check if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.decisions.is_empty()
    }

    /// Hit and miss counts since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> AppId {
        AppId::parse(id).unwrap()
    }

    fn key(roles: &[RoleId], app_id: &str, code: &str) -> DecisionKey {
        DecisionKey::new(roles.iter().copied(), app(app_id), code)
    }

    #[test]
    fn test_key_ignores_role_order() {
        let (a, b) = (RoleId::new(), RoleId::new());
        assert_eq!(
            key(&[a, b, a], "junkquit", "x"),
            key(&[b, a], "junkquit", "x")
        );
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = DecisionCache::new(Duration::from_secs(30), 10);
        let k = key(&[RoleId::new()], "junkquit", "recipes:read");

        assert_eq!(cache.get(&k).await, None);
        assert!(cache.insert(k.clone(), true, cache.generation()).await);
        assert_eq!(cache.get(&k).await, Some(true));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = DecisionCache::new(Duration::from_secs(30), 10);
        let k = key(&[RoleId::new()], "junkquit", "recipes:read");
        cache.insert(k.clone(), false, cache.generation()).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&k).await, None);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_skips_caching() {
        let cache = DecisionCache::new(Duration::MAX, 10);
        let k = key(&[RoleId::new()], "junkquit", "recipes:read");

        assert!(!cache.insert(k.clone(), true, cache.generation()).await);
        assert_eq!(cache.get(&k).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let cache = DecisionCache::new(Duration::from_secs(30), 10);
        let role = RoleId::new();
        let k = key(&[role], "junkquit", "recipes:read");

        let generation = cache.generation();
        cache.invalidate_role(role).await;
        assert!(!cache.insert(k.clone(), true, generation).await);
        assert_eq!(cache.get(&k).await, None);
    }

    #[tokio::test]
    async fn test_invalidation_scope() {
        let cache = DecisionCache::new(Duration::from_secs(30), 10);
        let (admin, viewer) = (RoleId::new(), RoleId::new());

        let g = cache.generation();
        cache.insert(key(&[admin], "junkquit", "a"), true, g).await;
        cache.insert(key(&[admin, viewer], "recipes", "b"), true, g).await;
        cache.insert(key(&[viewer], "junkquit", "c"), false, g).await;

        assert_eq!(cache.invalidate_role(admin).await, 2);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.invalidate_app(&app("junkquit")).await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_oldest() {
        let cache = DecisionCache::new(Duration::from_secs(30), 2);
        let role = RoleId::new();
        let (first, second, third) = (
            key(&[role], "a", "1"),
            key(&[role], "a", "2"),
            key(&[role], "a", "3"),
        );

        assert!(cache.insert(first.clone(), true, 0).await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.insert(second.clone(), true, 0).await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.insert(third.clone(), false, 0).await);

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&first).await, None);
        assert_eq!(cache.get(&second).await, Some(true));
        assert_eq!(cache.get(&third).await, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidated_entries_do_not_count_toward_eviction() {
        let cache = DecisionCache::new(Duration::from_secs(30), 2);
        let (admin, viewer) = (RoleId::new(), RoleId::new());

        cache.insert(key(&[admin], "a", "1"), true, 0).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(key(&[viewer], "a", "2"), true, 0).await;
        cache.invalidate_role(admin).await;

        let g = cache.generation();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(key(&[viewer], "a", "3"), true, g).await;
        assert_eq!(cache.len().await, 2);

        // The queue front still names the invalidated key; eviction skips it
        // and drops the oldest live decision.
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(key(&[viewer], "a", "4"), true, g).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&key(&[viewer], "a", "2")).await, None);
        assert_eq!(cache.get(&key(&[viewer], "a", "3")).await, Some(true));
        assert_eq!(cache.get(&key(&[viewer], "a", "4")).await, Some(true));

        // Expired entries are purged before anything live is evicted
        tokio::time::advance(Duration::from_secs(60)).await;
        cache.insert(key(&[viewer], "a", "5"), true, g).await;
        assert_eq!(cache.len().await, 1);
    }
}
