/// Tier controller: the engine facade.
///
/// `MemoryEngine` is the sole entry and exit point of the memory
/// subsystem. Conversational turns flow in through `record_turn`;
/// ranked context flows out through `recall_context`. Everything else —
/// importance scoring, tier placement, promotion and demotion, hash-chain
/// maintenance, redaction — happens behind this facade.
///
/// ## Item lifecycle
///
/// ```text
/// record_turn ──> Hot ──┬─ importance ≥ warm_threshold ──> Warm ──┐
///                       ├─ importance ≥ retention_floor ─> Cold   │ retention
///                       └─ below the floor ──────────────> gone   │ window
///                                                          Cold <─┘
/// ```
///
/// Cold is terminal: payloads may later be redacted, but the tier never
/// regresses.
///
/// ## Concurrency
///
/// The engine is cheaply clonable (`Arc` internals) and thread-safe.
/// Mutating operations serialize per owner through an async mutex, which
/// protects the one piece of state that demands strict ordering: the hash
/// chain tail. Queuing entry points wait their turn; `try_` variants
/// fail fast with [`MemoryError::OwnerBusy`]. Read-only queries run
/// concurrently and see either the pre-append or post-append chain,
/// never a partial chunk.
use crate::archive::{ColdArchive, ColdStats};
use crate::config::EngineConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::graph::{NodeKind, RelationKind, WarmGraph, WarmStats};
use crate::hot::{HotCache, HotEviction, HotStats};
use crate::persistence::{ChunkLog, EngineSnapshot};
use crate::redaction::{PrivacyRedactor, Redaction};
use crate::scoring::{self, ScoringWeights, SCORE_MAX};
use crate::types::{Depth, ItemId, MemoryItem, RecalledMemory, Tier, TurnContent, TurnSignals};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a maintenance sweep for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Hot items that exited the recency window
    pub expired: usize,
    /// Warm items demoted to the archive
    pub demoted: usize,
    /// Summary nodes created or refreshed
    pub summaries: usize,
    /// Items dropped entirely (below the retention floor)
    pub evicted: usize,
}

/// One line of an audit export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the owner's chain
    pub chunk_id: u64,
    /// Append time
    pub created_at: DateTime<Utc>,
    /// Whether the payload was redacted after archival
    pub redacted: bool,
    /// Importance at archival time
    pub importance: f64,
    /// The chunk's chain hash, for external cross-checking
    pub content_hash: String,
    /// The rehydrated (possibly redacted) payload
    pub payload: String,
}

/// A verified, reconstructed history for compliance tooling.
///
/// This is the only interface audit/evidence features should use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    /// The exported owner
    pub owner_id: String,
    /// Chain records, oldest first
    pub records: Vec<AuditRecord>,
}

/// Aggregate engine statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub hot: HotStats,
    pub warm: WarmStats,
    pub cold: ColdStats,
    /// Items currently tracked by the residency registry
    pub tracked_items: usize,
}

struct EngineInner {
    config: EngineConfig,
    weights: ScoringWeights,
    hot: HotCache,
    warm: WarmGraph,
    cold: ColdArchive,
    redactor: PrivacyRedactor,

    /// Which tier owns each item's live copy; the exclusivity invariant
    /// lives here
    residency: DashMap<ItemId, Tier>,

    /// Per-owner serialization of mutating operations
    owner_locks: DashMap<String, Arc<Mutex<()>>>,

    /// Durable cold-tier log, present when a data directory is configured
    chunk_log: Option<ChunkLog>,
}

/// The tiered conversational memory engine.
///
/// # Example
///
/// ```ignore
/// use hearth::{MemoryEngine, TurnContent, TurnSignals, Depth};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = MemoryEngine::start().await?;
///
///     engine.record_turn(
///         "alice",
///         "session-1",
///         TurnContent::text_only("I got the job!"),
///         TurnSignals::new(8.0, 9.0, 7.0, 0),
///     ).await?;
///
///     let context = engine.recall_context("alice", None, Depth::Shallow).await?;
///     println!("{} memories recalled", context.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("config", &self.inner.config)
            .field("tracked_items", &self.inner.residency.len())
            .finish()
    }
}

impl MemoryEngine {
    /// Start an in-memory engine with default configuration.
    pub async fn start() -> MemoryResult<Self> {
        Self::start_with_config(EngineConfig::default()).await
    }

    /// Start an engine with explicit configuration.
    ///
    /// When `config.data_dir` is set, the durable chunk log is opened
    /// under it and every cold append is persisted before it returns.
    pub async fn start_with_config(config: EngineConfig) -> MemoryResult<Self> {
        Self::start_with_redactor(config, PrivacyRedactor::new()).await
    }

    /// Start an engine with a custom privacy redactor.
    pub async fn start_with_redactor(
        config: EngineConfig,
        redactor: PrivacyRedactor,
    ) -> MemoryResult<Self> {
        let chunk_log = match &config.data_dir {
            Some(dir) => Some(ChunkLog::open(dir.join("chains")).await?),
            None => None,
        };

        let inner = EngineInner {
            hot: HotCache::with_config(config.hot.clone()),
            warm: WarmGraph::new(),
            cold: ColdArchive::with_config(config.cold.clone()),
            weights: ScoringWeights::default(),
            redactor,
            residency: DashMap::new(),
            owner_locks: DashMap::new(),
            chunk_log,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Ingest one conversational turn.
    ///
    /// Signals are validated and scored before any tier write; the item
    /// then lands in Hot. A capacity eviction caused by this insert is
    /// routed immediately (promotion to Warm, archival to Cold, or drop).
    /// Queues behind any in-flight mutation for the same owner.
    pub async fn record_turn(
        &self,
        owner_id: &str,
        session_id: &str,
        content: TurnContent,
        signals: TurnSignals,
    ) -> MemoryResult<MemoryItem> {
        let importance = scoring::score_with(&self.inner.weights, &signals)?;

        let guard = self.owner_lock(owner_id);
        let _guard = guard.lock().await;
        self.record_turn_locked(owner_id, session_id, content, signals, importance)
            .await
    }

    /// Fail-fast variant of [`record_turn`](Self::record_turn): errors
    /// with [`MemoryError::OwnerBusy`] instead of queuing.
    pub async fn try_record_turn(
        &self,
        owner_id: &str,
        session_id: &str,
        content: TurnContent,
        signals: TurnSignals,
    ) -> MemoryResult<MemoryItem> {
        let importance = scoring::score_with(&self.inner.weights, &signals)?;

        let guard = self.owner_lock(owner_id);
        let Ok(_guard) = guard.try_lock() else {
            return Err(MemoryError::OwnerBusy {
                owner_id: owner_id.to_string(),
            });
        };
        self.record_turn_locked(owner_id, session_id, content, signals, importance)
            .await
    }

    /// Retrieve ranked context for an owner.
    ///
    /// Consults Hot first (just-said context), then the Warm graph;
    /// the Cold archive's reconstructed history joins only at
    /// [`Depth::Deep`]. Results are merged and ranked by a combination of
    /// importance and recency. Unknown owners yield an empty result.
    pub async fn recall_context(
        &self,
        owner_id: &str,
        hint: Option<&str>,
        depth: Depth,
    ) -> MemoryResult<Vec<RecalledMemory>> {
        let now = Utc::now();
        let mut recalled: Vec<RecalledMemory> = Vec::new();

        // Hot: most relevant for what was just said; touched on return.
        for item in self.inner.hot.get_recent(owner_id, self.inner.config.hot.capacity) {
            let relevance = rank_item(&item, now);
            recalled.push(RecalledMemory::Item { item, relevance });
        }

        // Warm: graph context around the hint, plus the live items the
        // reached nodes index into.
        let ranked_nodes =
            self.inner
                .warm
                .query_context(owner_id, hint, self.inner.config.warm.max_hops);
        let mut seen_items: HashSet<ItemId> = HashSet::new();

        for ranked in ranked_nodes {
            if let Some(item_id) = ranked.node.item_ref {
                if seen_items.insert(item_id) {
                    if let Some(item) = self.inner.warm.touch_item(item_id, now) {
                        let relevance = rank_item(&item, now);
                        recalled.push(RecalledMemory::Item { item, relevance });
                    }
                }
            }
            recalled.push(RecalledMemory::Context {
                relevance: ranked.score,
                node: ranked.node,
            });
        }

        // Cold: reconstructed history, only on explicit deep recall.
        if depth == Depth::Deep {
            let chunk_count = self.inner.cold.chunk_count(owner_id);
            if chunk_count > 0 {
                let sequence = self
                    .inner
                    .cold
                    .reconstruct(owner_id, chunk_count as u64 - 1)?;
                let chunks = self.inner.cold.chunks(owner_id);
                for (chunk, payload) in chunks.into_iter().zip(sequence) {
                    recalled.push(RecalledMemory::Archived {
                        chunk_id: chunk.chunk_id,
                        payload,
                        relevance: chunk.importance * 0.3,
                    });
                }
            }
        }

        recalled.sort_by(|a, b| {
            b.relevance()
                .partial_cmp(&a.relevance())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(recalled)
    }

    /// Run periodic maintenance for one owner: expire the hot recency
    /// window, demote warm items past the retention window, and refresh
    /// summary nodes.
    pub async fn sweep(&self, owner_id: &str) -> MemoryResult<SweepReport> {
        let guard = self.owner_lock(owner_id);
        let _guard = guard.lock().await;

        let now = Utc::now();
        let mut report = SweepReport::default();

        // Hot items that exited the recency window.
        for eviction in self.inner.hot.evict_expired(owner_id, now) {
            report.expired += 1;
            if self.route_eviction(eviction).await?.is_none() {
                report.evicted += 1;
            }
        }

        // Distill summaries while the items are still warm, then demote;
        // a summary outlives the items it condenses.
        report.summaries = self.refresh_summaries(owner_id);

        // Warm items past the retention window demote regardless of
        // importance, bounding warm-tier size. Nodes stay behind.
        let cutoff = now - self.inner.config.warm.retention;
        for item in self.inner.warm.items_older_than(owner_id, cutoff) {
            if let Some(live) = self.inner.warm.take_item(item.id) {
                self.archive_item(live, Tier::Warm).await?;
                report.demoted += 1;
            }
        }

        debug!(owner = %owner_id, ?report, "sweep complete");
        Ok(report)
    }

    /// Verify the owner's archive chain, reporting validity as a bool.
    ///
    /// A verification failure is logged and reported as `false`; callers
    /// that need the failure detail use [`verify_chain`](Self::verify_chain).
    pub fn verify_integrity(&self, owner_id: &str) -> bool {
        match self.inner.cold.verify_chain(owner_id) {
            Ok(()) => true,
            Err(e) => {
                warn!(owner = %owner_id, error = %e, "integrity verification failed");
                false
            }
        }
    }

    /// Verify the owner's archive chain, surfacing the failure detail.
    pub fn verify_chain(&self, owner_id: &str) -> MemoryResult<()> {
        self.inner.cold.verify_chain(owner_id)
    }

    /// Export an owner's verified, reconstructed history.
    ///
    /// Verification runs first and a corrupt chain surfaces as
    /// [`MemoryError::ChainIntegrity`] — an audit must never silently
    /// export unverifiable evidence.
    pub fn export_for_audit(&self, owner_id: &str) -> MemoryResult<AuditExport> {
        self.inner.cold.verify_chain(owner_id)?;

        let chunks = self.inner.cold.chunks(owner_id);
        if chunks.is_empty() {
            return Ok(AuditExport {
                owner_id: owner_id.to_string(),
                records: Vec::new(),
            });
        }

        let sequence = self
            .inner
            .cold
            .reconstruct(owner_id, chunks.len() as u64 - 1)?;

        let records = chunks
            .into_iter()
            .zip(sequence)
            .map(|(chunk, payload)| AuditRecord {
                chunk_id: chunk.chunk_id,
                created_at: chunk.created_at,
                redacted: chunk.redacted,
                importance: chunk.importance,
                content_hash: chunk.content_hash,
                payload,
            })
            .collect();

        Ok(AuditExport {
            owner_id: owner_id.to_string(),
            records,
        })
    }

    /// Redact personally identifying content from one archived chunk.
    ///
    /// The chain stays verifiable afterwards; when a durable log is
    /// configured it is rewritten to match.
    pub async fn redact(&self, owner_id: &str, chunk_id: u64) -> MemoryResult<Redaction> {
        let guard = self.owner_lock(owner_id);
        let _guard = guard.lock().await;

        let redactor = &self.inner.redactor;
        let outcome = self
            .inner
            .cold
            .redact_chunk_with(owner_id, chunk_id, |text| redactor.redact_text(text))?;

        if outcome.is_dirty() {
            info!(owner = %owner_id, chunk = chunk_id, hits = ?outcome.hits, "chunk redacted");
            if let Some(log) = &self.inner.chunk_log {
                log.rewrite(owner_id, &self.inner.cold.chunks(owner_id)).await?;
            }
        }

        Ok(outcome)
    }

    /// Which tier currently owns an item's live copy, if any.
    pub fn tier_of(&self, item_id: ItemId) -> Option<Tier> {
        self.inner.residency.get(&item_id).map(|t| *t)
    }

    /// Restore an owner's archive chain from the durable log.
    ///
    /// Used at startup for owners known to have history on disk. A no-op
    /// when the owner already has an in-memory chain or no log exists.
    pub async fn load_owner_chain(&self, owner_id: &str) -> MemoryResult<usize> {
        let Some(log) = &self.inner.chunk_log else {
            return Ok(0);
        };
        if self.inner.cold.chunk_count(owner_id) > 0 {
            return Ok(0);
        }

        let guard = self.owner_lock(owner_id);
        let _guard = guard.lock().await;

        let chunks = log.load_owner(owner_id).await?;
        let loaded = chunks.len();
        self.inner.cold.import_owner(owner_id, chunks)?;
        self.inner.cold.verify_chain(owner_id)?;
        Ok(loaded)
    }

    /// Aggregate statistics across all tiers.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            hot: self.inner.hot.stats(),
            warm: self.inner.warm.stats(),
            cold: self.inner.cold.stats(),
            tracked_items: self.inner.residency.len(),
        }
    }

    /// Direct access to the cold archive (audit tooling, tests).
    pub fn archive(&self) -> &ColdArchive {
        &self.inner.cold
    }

    /// Direct access to the warm graph (context tooling, tests).
    pub fn graph(&self) -> &WarmGraph {
        &self.inner.warm
    }

    /// Dump the full engine state for snapshotting.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::new(
            self.inner.hot.export(),
            self.inner.warm.export(),
            self.inner.cold.export(),
            self.inner
                .residency
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        )
    }

    /// Rebuild an engine from a snapshot.
    pub async fn from_snapshot(
        config: EngineConfig,
        snapshot: EngineSnapshot,
    ) -> MemoryResult<Self> {
        let engine = Self::start_with_config(config).await?;
        engine.inner.hot.import(snapshot.hot);
        engine.inner.warm.import(snapshot.warm);
        engine.inner.cold.import(snapshot.cold)?;
        for (item_id, tier) in snapshot.residency {
            engine.inner.residency.insert(item_id, tier);
        }
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn record_turn_locked(
        &self,
        owner_id: &str,
        session_id: &str,
        content: TurnContent,
        signals: TurnSignals,
        importance: f64,
    ) -> MemoryResult<MemoryItem> {
        let item = MemoryItem::new(owner_id, session_id, content, signals, importance, Utc::now());
        self.inner.residency.insert(item.id, Tier::Hot);

        let evicted = self.inner.hot.put(item.clone());
        debug!(owner = %owner_id, item = %item.id, importance, "turn recorded");

        if let Some(eviction) = evicted {
            self.route_eviction(eviction).await?;
        }

        Ok(item)
    }

    /// Route a hot eviction per the tier policy. Returns the tier the
    /// item landed in, or `None` when it was dropped entirely.
    async fn route_eviction(&self, eviction: HotEviction) -> MemoryResult<Option<Tier>> {
        let promote_hint = matches!(eviction, HotEviction::Promote(_));
        let item = eviction.into_item();

        if item.importance >= self.inner.config.warm.warm_threshold {
            self.promote_to_warm(item);
            Ok(Some(Tier::Warm))
        } else if item.importance >= self.inner.config.cold.retention_floor {
            self.archive_item(item, Tier::Hot).await?;
            Ok(Some(Tier::Cold))
        } else {
            // Below the retention floor and never referenced again: gone.
            debug!(
                item = %item.id,
                importance = item.importance,
                promote_hint,
                "item evicted below retention floor"
            );
            self.inner.residency.remove(&item.id);
            self.inner.warm.mark_orphaned(item.id);
            Ok(None)
        }
    }

    /// Promote an item into the warm tier, growing the context graph.
    fn promote_to_warm(&self, mut item: MemoryItem) {
        item.tier = Tier::Warm;

        let mut entity_nodes = Vec::new();
        for entity in &item.content.entities {
            entity_nodes.push(self.inner.warm.create_node(
                &item.owner_id,
                NodeKind::Entity,
                entity,
                entity.clone(),
                item.importance,
                Some(item.id),
            ));
        }

        let mut topic_nodes = Vec::new();
        for topic in &item.content.topics {
            topic_nodes.push(self.inner.warm.create_node(
                &item.owner_id,
                NodeKind::Topic,
                topic,
                topic.clone(),
                item.importance,
                Some(item.id),
            ));
        }

        // Entities co-occur with the turn's topics; adjacent entities
        // relate to each other.
        for entity in &entity_nodes {
            for topic in &topic_nodes {
                self.inner.warm.link(*entity, *topic, RelationKind::CoOccurs, 1.0);
            }
        }
        for pair in entity_nodes.windows(2) {
            self.inner.warm.link(pair[0], pair[1], RelationKind::Mentions, 1.0);
        }
        for pair in topic_nodes.windows(2) {
            self.inner.warm.link(pair[0], pair[1], RelationKind::RelatedTo, 1.0);
        }

        debug!(item = %item.id, owner = %item.owner_id, "promoted to warm");
        self.inner.residency.insert(item.id, Tier::Warm);
        self.inner.warm.insert_item(item);
    }

    /// Archive an item's payload into the cold chain.
    ///
    /// The durable write (when configured) happens between `prepare` and
    /// `commit`: a failed write restores the item to its prior tier and
    /// never advances the chain tail.
    async fn archive_item(&self, mut item: MemoryItem, prior: Tier) -> MemoryResult<()> {
        let chunk = self
            .inner
            .cold
            .prepare(&item.owner_id, &item.content.text, item.importance);

        if let Some(log) = &self.inner.chunk_log {
            if let Err(e) = log.append(&chunk).await {
                self.restore_to_tier(item, prior);
                return Err(e);
            }
        }

        if let Err(e) = self.inner.cold.commit(chunk) {
            self.restore_to_tier(item, prior);
            return Err(e);
        }

        item.tier = Tier::Cold;
        debug!(item = %item.id, owner = %item.owner_id, "archived to cold");
        self.inner.residency.insert(item.id, Tier::Cold);
        Ok(())
    }

    /// Put an item back where it came from after a failed transition.
    fn restore_to_tier(&self, mut item: MemoryItem, prior: Tier) {
        item.tier = prior;
        match prior {
            Tier::Hot => {
                self.inner.hot.restore(item);
            }
            Tier::Warm => {
                self.inner.warm.insert_item(item);
            }
            Tier::Cold => {}
        }
    }

    /// Rebuild summary nodes for topics with enough warm items.
    fn refresh_summaries(&self, owner_id: &str) -> usize {
        let items = self.inner.warm.owner_items(owner_id);
        let min_items = self.inner.config.warm.summary_min_items;

        let mut by_topic: std::collections::HashMap<String, Vec<&MemoryItem>> =
            std::collections::HashMap::new();
        for item in &items {
            for topic in &item.content.topics {
                by_topic
                    .entry(topic.trim().to_lowercase())
                    .or_default()
                    .push(item);
            }
        }

        let mut refreshed = 0;
        for (topic, mut group) in by_topic {
            if group.len() < min_items {
                continue;
            }
            group.sort_by_key(|item| item.created_at);

            let digest: Vec<String> = group
                .iter()
                .map(|item| truncate(&item.content.text, 80))
                .collect();
            let total_importance: f64 = group.iter().map(|item| item.importance).sum();

            // create_node accrues weight on dedup; pass only the delta so
            // the summary's weight tracks the group total.
            let existing_weight = self
                .inner
                .warm
                .find_node(owner_id, NodeKind::Summary, &topic)
                .and_then(|id| self.inner.warm.node(id))
                .map(|node| node.weight)
                .unwrap_or(0.0);
            let delta = (total_importance - existing_weight).max(0.0);

            let summary = self.inner.warm.create_node(
                owner_id,
                NodeKind::Summary,
                &topic,
                digest.join(" | "),
                delta,
                None,
            );

            if let Some(topic_node) = self.inner.warm.find_node(owner_id, NodeKind::Topic, &topic)
            {
                self.inner
                    .warm
                    .link(topic_node, summary, RelationKind::SummarizedBy, 1.0);
            }

            refreshed += 1;
        }

        refreshed
    }

    fn owner_lock(&self, owner_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .owner_locks
            .entry(owner_id.to_string())
            .or_default()
            .clone()
    }
}

/// Rank a live item by importance blended with creation recency.
fn rank_item(item: &MemoryItem, now: DateTime<Utc>) -> f64 {
    let age_days = item.age(now).num_seconds().max(0) as f64 / 86_400.0;
    let recency = SCORE_MAX * (-age_days).exp();
    0.6 * item.importance + 0.4 * recency
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
