//! Read-through cache for the topic listing.
//!
//! Pages are keyed by the canonical listing query. Every create, update or delete calls
//! `invalidate_all` after its write commits and before it responds, so a listing request issued
//! after a mutation always misses and reloads from the database.
//!
//! Entries carry the cache generation that was current when the read producing them started.
//! `invalidate_all` advances the generation before clearing, and `get` ignores entries from an
//! older generation, so a slow read racing an invalidation cannot put a stale page back.
//!
//! Keys come from client input, so the number of entries is capped. A put into a full cache
//! first drops entries from older generations, then the oldest inserted entry.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{models::TopicSummary, pagination::{Page, Pageable}};

pub type CachedPage = Arc<Page<TopicSummary>>;

/// Entry limit used by `ListingCache::default`.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// ListingKey
///
/// Canonical form of a listing request: the optional course filter plus the full page request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ListingKey {
    pub course_name: Option<String>,
    pub pageable: Pageable,
}

/// Generation
///
/// Snapshot of the invalidation counter, taken before a read goes to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

struct Entry {
    generation: u64,
    // Insertion order, for picking an eviction victim.
    sequence: u64,
    page: CachedPage,
}

/// Cache statistics for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

/// ListingCache
///
/// Concurrent map of listing pages holding at most `capacity` entries. Shared by every request
/// through `Arc`; all methods take `&self`.
pub struct ListingCache {
    entries: DashMap<ListingKey, Entry>,
    capacity: usize,
    generation: AtomicU64,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ListingCache {
    /// A cache holding at most `capacity` pages. A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            capacity,
            generation: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The current generation. Take it before querying the database and hand it to `put_at`.
    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::Acquire))
    }

    /// get
    ///
    /// Returns the cached page for `key` if one was stored in the current generation.
    pub fn get(&self, key: &ListingKey) -> Option<CachedPage> {
        let current = self.generation.load(Ordering::Acquire);

        let stale = match self.entries.get(key) {
            Some(entry) if entry.generation == current => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.page.clone());
            }
            Some(_) => true,
            None => false,
        };

        if stale {
            self.entries.remove_if(key, |_, entry| entry.generation != current);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `page` under `key` in the current generation, replacing any previous entry.
    pub fn put(&self, key: ListingKey, page: CachedPage) {
        let generation = self.generation();
        self.put_at(generation, key, page);
    }

    /// put_at
    ///
    /// Stores `page` only if no invalidation happened since `generation` was taken, evicting
    /// to make room when the cache is full. Returns whether the page was stored.
    pub fn put_at(&self, generation: Generation, key: ListingKey, page: CachedPage) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if generation != self.generation() {
            tracing::debug!("discarding listing page read before the last invalidation");
            return false;
        }
        if !self.entries.contains_key(&key) {
            self.make_room(generation.0);
        }
        self.entries.insert(
            key,
            Entry {
                generation: generation.0,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                page,
            },
        );
        true
    }

    fn make_room(&self, current: u64) {
        if self.entries.len() < self.capacity {
            return;
        }

        let mut evicted = 0usize;
        self.entries.retain(|_, entry| {
            let keep = entry.generation == current;
            if !keep {
                evicted += 1;
            }
            keep
        });

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().sequence)
                .map(|entry| entry.key().clone());
            match oldest.and_then(|key| self.entries.remove(&key)) {
                Some(_) => evicted += 1,
                None => break,
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "listing cache full; evicted entries");
        }
    }

    /// invalidate_all
    ///
    /// Drops every cached page. Call after the mutating write has committed.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("topic listing cache invalidated");
    }

    /// Number of entries readable in the current generation.
    pub fn len(&self) -> usize {
        let current = self.generation.load(Ordering::Acquire);
        self.entries
            .iter()
            .filter(|entry| entry.value().generation == current)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
