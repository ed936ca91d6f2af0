/// Engine configuration.
///
/// Every tunable of the memory engine lives here, grouped per tier. All
/// configuration is explicitly constructed and injected into
/// [`crate::engine::MemoryEngine`] — there is no ambient global state.
use chrono::Duration;
use std::path::PathBuf;

/// Hot cache configuration.
#[derive(Debug, Clone)]
pub struct HotConfig {
    /// N most-recent items kept per owner; inserting the (N+1)-th evicts
    pub capacity: usize,

    /// Evictions at or above this importance are surfaced as promotion
    /// candidates instead of silent drops
    pub hot_floor: f64,

    /// Items older than this exit the recency window on `evict_expired`
    pub recency_window: Duration,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            hot_floor: 5.0,
            recency_window: Duration::hours(1),
        }
    }
}

/// Warm graph configuration.
#[derive(Debug, Clone)]
pub struct WarmConfig {
    /// Items at or above this importance promote to Warm on hot eviction
    pub warm_threshold: f64,

    /// Items resident in Warm demote to Cold once older than this,
    /// regardless of importance
    pub retention: Duration,

    /// Minimum related items on one topic before a summary node is built
    pub summary_min_items: usize,

    /// Default traversal radius for context queries
    pub max_hops: usize,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            warm_threshold: 5.0,
            retention: Duration::days(30),
            summary_min_items: 3,
            max_hops: 3,
        }
    }
}

/// Cold archive configuration.
#[derive(Debug, Clone)]
pub struct ColdConfig {
    /// Items below `warm_threshold` but at or above this floor are
    /// archived on hot eviction; below it they are dropped
    pub retention_floor: f64,

    /// Minimum text similarity ratio (0.0–1.0) for storing a delta
    /// against the previous chunk instead of the full payload
    pub delta_similarity: f64,
}

impl Default for ColdConfig {
    fn default() -> Self {
        Self {
            retention_floor: 2.0,
            delta_similarity: 0.5,
        }
    }
}

/// Top-level engine configuration.
///
/// `data_dir` enables durability: when set, cold-tier appends are written
/// to a per-owner append-only log before `append` returns, and snapshots
/// can be saved/loaded through [`crate::persistence`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Hot cache tunables
    pub hot: HotConfig,
    /// Warm graph tunables
    pub warm: WarmConfig,
    /// Cold archive tunables
    pub cold: ColdConfig,
    /// Durable storage directory; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// In-memory configuration with all defaults.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable configuration rooted at `dir`.
    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }
}
