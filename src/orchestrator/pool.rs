//! LRU-ordered warm pool of tenant container sets.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::sidecar::status::TenantContainerSet;

/// Tenants with running containers, least recently used first.
///
/// Pure bookkeeping: eviction hands back the popped sets and the caller is
/// responsible for stopping their containers.
pub struct WarmPool {
    entries: LruCache<String, TenantContainerSet>,
    max_warm: usize,
}

impl WarmPool {
    pub fn new(max_warm: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_warm,
        }
    }

    pub fn set_max_warm(&mut self, max_warm: usize) {
        self.max_warm = max_warm;
    }

    /// Mark `tenant` most recently used and refresh its access times.
    pub fn touch(&mut self, tenant: &str) -> Option<&TenantContainerSet> {
        let set = self.entries.get_mut(tenant)?;
        set.touch();
        Some(set)
    }

    /// Look at a tenant without changing its recency.
    pub fn peek(&self, tenant: &str) -> Option<&TenantContainerSet> {
        self.entries.peek(tenant)
    }

    /// Add or replace a tenant's set at the most recently used position.
    pub fn insert(&mut self, set: TenantContainerSet) -> Option<TenantContainerSet> {
        debug_assert!(set.has_unique_host_ports());
        self.entries
            .push(set.tenant.clone(), set)
            .map(|(_, previous)| previous)
    }

    pub fn remove(&mut self, tenant: &str) -> Option<TenantContainerSet> {
        self.entries.pop(tenant)
    }

    /// Pop least recently used tenants until the pool fits `max_warm`.
    pub fn evict_over_capacity(&mut self) -> Vec<TenantContainerSet> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_warm {
            match self.entries.pop_lru() {
                Some((_, set)) => evicted.push(set),
                None => break,
            }
        }
        evicted
    }

    /// Tenant names, least recently used first.
    pub fn tenants(&self) -> Vec<String> {
        self.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Tenants last accessed before `cutoff`, least recently used first.
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .filter(|(_, set)| set.last_accessed < cutoff)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Runtime ids of every container tracked by a resident tenant.
    pub fn tracked_container_ids(&self) -> HashSet<String> {
        self.entries
            .iter()
            .flat_map(|(_, set)| set.container_ids().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tenant: &str) -> TenantContainerSet {
        TenantContainerSet::new(tenant)
    }

    #[test]
    fn test_lru_order_follows_insert_and_touch() {
        let mut pool = WarmPool::new(3);
        pool.insert(set("a"));
        pool.insert(set("b"));
        pool.insert(set("c"));
        assert_eq!(pool.tenants(), vec!["a", "b", "c"]);

        assert!(pool.touch("a").is_some());
        assert_eq!(pool.tenants(), vec!["b", "c", "a"]);

        assert!(pool.peek("b").is_some());
        assert_eq!(pool.tenants(), vec!["b", "c", "a"]);

        assert!(pool.touch("missing").is_none());
    }

    #[test]
    fn test_evict_over_capacity_pops_oldest() {
        let mut pool = WarmPool::new(2);
        pool.insert(set("a"));
        pool.insert(set("b"));
        pool.insert(set("c"));

        let evicted: Vec<String> = pool
            .evict_over_capacity()
            .into_iter()
            .map(|s| s.tenant)
            .collect();
        assert_eq!(evicted, vec!["a"]);
        assert_eq!(pool.tenants(), vec!["b", "c"]);
        assert!(pool.evict_over_capacity().is_empty());
    }

    #[test]
    fn test_shrinking_capacity_evicts_several() {
        let mut pool = WarmPool::new(3);
        for t in ["a", "b", "c"] {
            pool.insert(set(t));
        }
        pool.set_max_warm(1);
        assert_eq!(pool.evict_over_capacity().len(), 2);
        assert_eq!(pool.tenants(), vec!["c"]);
    }

    #[test]
    fn test_reinsert_moves_to_back_and_returns_previous() {
        let mut pool = WarmPool::new(3);
        pool.insert(set("a"));
        pool.insert(set("b"));
        assert!(pool.insert(set("a")).is_some());
        assert_eq!(pool.tenants(), vec!["b", "a"]);
    }

    #[test]
    fn test_idle_since() {
        let mut pool = WarmPool::new(3);
        let mut old = set("old");
        old.last_accessed = Utc::now() - chrono::Duration::hours(2);
        pool.insert(old);
        pool.insert(set("fresh"));

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(pool.idle_since(cutoff), vec!["old"]);
    }
}
