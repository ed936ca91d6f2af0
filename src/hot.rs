/// Hot cache: the working-memory tier.
///
/// A bounded, per-owner, recency-biased store of the most recent
/// conversational items. Fast, limited, holds what was "just said".
///
/// ## Eviction policy
///
/// Bounded by count, not by wall-clock TTL alone, so behavior is
/// deterministic under test: inserting the (N+1)-th item for an owner
/// evicts the least-recently-inserted item for that owner. Evictions at
/// or above the hot floor are surfaced as promotion candidates so a
/// highly important item is never lost just because it aged out of the
/// recency window; the tier controller decides the destination.
///
/// ## Read-triggers-touch
///
/// `get_recent` updates `last_referenced_at` on every item it returns,
/// and the touch is observable within the same logical operation.
use crate::config::HotConfig;
use crate::types::{ItemId, MemoryItem};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// An item evicted from the hot cache, labeled with routing intent.
#[derive(Debug, Clone)]
pub enum HotEviction {
    /// Importance cleared the hot floor: promote rather than drop
    Promote(MemoryItem),
    /// Below the hot floor: the controller may still archive or drop it
    Drop(MemoryItem),
}

impl HotEviction {
    /// The evicted item, regardless of label.
    pub fn item(&self) -> &MemoryItem {
        match self {
            HotEviction::Promote(item) => item,
            HotEviction::Drop(item) => item,
        }
    }

    /// Consume the eviction, yielding the item.
    pub fn into_item(self) -> MemoryItem {
        match self {
            HotEviction::Promote(item) => item,
            HotEviction::Drop(item) => item,
        }
    }
}

/// Bounded per-owner recency cache.
///
/// Thread-safe: rings live in a `DashMap` keyed by owner, counters are
/// atomics. An owner with no prior data self-initializes on `put`.
#[derive(Debug)]
pub struct HotCache {
    config: HotConfig,

    /// Per-owner ring, front = most recently inserted
    rings: DashMap<String, VecDeque<MemoryItem>>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl HotCache {
    /// Create a hot cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(HotConfig::default())
    }

    /// Create a hot cache with custom configuration.
    pub fn with_config(config: HotConfig) -> Self {
        Self {
            config,
            rings: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Insert an item for its owner, self-initializing unknown owners.
    ///
    /// Returns the eviction produced when the owner's ring was already at
    /// capacity, labeled by the hot-floor rule.
    pub fn put(&self, item: MemoryItem) -> Option<HotEviction> {
        let mut ring = self.rings.entry(item.owner_id.clone()).or_default();

        ring.push_front(item);

        if ring.len() > self.config.capacity {
            // Back of the ring = least recently inserted.
            let victim = ring.pop_back()?;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return Some(self.label(victim));
        }

        None
    }

    /// Return up to `limit` items for an owner, most-recent-first.
    ///
    /// Every returned item is touched (`last_referenced_at = now`) in the
    /// stored copy before the clone is handed back.
    pub fn get_recent(&self, owner_id: &str, limit: usize) -> Vec<MemoryItem> {
        let now = Utc::now();

        let Some(mut ring) = self.rings.get_mut(owner_id) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        };

        let returned: Vec<MemoryItem> = ring
            .iter_mut()
            .take(limit)
            .map(|item| {
                item.touch(now);
                item.clone()
            })
            .collect();

        if returned.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        returned
    }

    /// Evict every item of an owner that has exited the recency window.
    ///
    /// Returned evictions carry the same promotion labels as capacity
    /// evictions; routing stays with the controller.
    pub fn evict_expired(&self, owner_id: &str, now: DateTime<Utc>) -> Vec<HotEviction> {
        let Some(mut ring) = self.rings.get_mut(owner_id) else {
            return Vec::new();
        };

        // Ring is insertion-ordered, so the back is always the oldest.
        let mut expired = Vec::new();
        while ring
            .back()
            .is_some_and(|oldest| oldest.age(now) > self.config.recency_window)
        {
            if let Some(victim) = ring.pop_back() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                expired.push(self.label(victim));
            }
        }

        expired
    }

    /// Put an item back at the old end of its owner's ring after a failed
    /// tier transition. Never evicts, even past capacity; the next insert
    /// rebalances.
    pub(crate) fn restore(&self, item: MemoryItem) {
        self.rings
            .entry(item.owner_id.clone())
            .or_default()
            .push_back(item);
    }

    /// Remove a specific item, for controller-driven tier transitions.
    pub fn take(&self, owner_id: &str, id: ItemId) -> Option<MemoryItem> {
        let mut ring = self.rings.get_mut(owner_id)?;
        let position = ring.iter().position(|item| item.id == id)?;
        ring.remove(position)
    }

    /// Whether an item currently resides in the owner's ring.
    pub fn contains(&self, owner_id: &str, id: ItemId) -> bool {
        self.rings
            .get(owner_id)
            .map(|ring| ring.iter().any(|item| item.id == id))
            .unwrap_or(false)
    }

    /// Number of resident items for one owner.
    pub fn len(&self, owner_id: &str) -> usize {
        self.rings.get(owner_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the owner's ring is empty (or uninitialized).
    pub fn is_empty(&self, owner_id: &str) -> bool {
        self.len(owner_id) == 0
    }

    /// Cache statistics across all owners.
    pub fn stats(&self) -> HotStats {
        HotStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            resident: self.rings.iter().map(|r| r.len()).sum(),
            capacity_per_owner: self.config.capacity,
        }
    }

    /// Dump all rings for snapshotting.
    pub(crate) fn export(&self) -> Vec<(String, Vec<MemoryItem>)> {
        self.rings
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect()
    }

    /// Restore rings from a snapshot dump.
    pub(crate) fn import(&self, rings: Vec<(String, Vec<MemoryItem>)>) {
        for (owner, items) in rings {
            self.rings.insert(owner, items.into_iter().collect());
        }
    }

    fn label(&self, victim: MemoryItem) -> HotEviction {
        if victim.importance >= self.config.hot_floor {
            HotEviction::Promote(victim)
        } else {
            HotEviction::Drop(victim)
        }
    }
}

impl Default for HotCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Hot cache statistics.
#[derive(Debug, Clone)]
pub struct HotStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub resident: usize,
    pub capacity_per_owner: usize,
}

impl HotStats {
    /// Hit rate over all `get_recent` calls (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
