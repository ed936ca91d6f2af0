/// Common types used throughout hearth.
///
/// This module defines the core data structures of the memory engine's
/// internal model: the atomic `MemoryItem`, the tier enumeration, and the
/// signal/content bundles that arrive with every conversational turn.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a memory item.
pub type ItemId = Uuid;

/// Unique identifier of a warm-graph node.
pub type NodeId = Uuid;

/// The storage tier owning an item's live copy.
///
/// Exactly one tier owns a given item at any point in time; the engine's
/// residency registry enforces this. `Cold` is terminal: a payload may
/// later be redacted, but the tier never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Bounded, fast, recency-biased cache of just-said context
    Hot,
    /// Persistent context graph of entities, topics, and summaries
    Warm,
    /// Append-only, hash-chained, delta-compressed archive
    Cold,
}

/// Retrieval depth for context recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Hot and warm tiers only (the default conversational path)
    Shallow,
    /// Also replay the cold archive's reconstructed history
    Deep,
}

/// The payload of one conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContent {
    /// The turn text as spoken
    pub text: String,
    /// Entities mentioned in the turn (people, places, products)
    pub entities: Vec<String>,
    /// Topics the turn touches on
    pub topics: Vec<String>,
}

impl TurnContent {
    /// Create turn content from text with no tagged entities or topics.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entities: Vec::new(),
            topics: Vec::new(),
        }
    }

    /// Create fully tagged turn content.
    pub fn new(
        text: impl Into<String>,
        entities: Vec<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            text: text.into(),
            entities,
            topics,
        }
    }
}

/// The four normalized importance inputs accompanying a turn.
///
/// The first three are expected in `0..=10`; `recurrence_count` is an
/// unbounded occurrence counter that earns a diminishing-returns bonus.
/// Validation happens in [`crate::scoring`] before any tier write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnSignals {
    /// How semantically novel this turn is relative to prior conversation
    pub semantic_novelty: f64,
    /// Emotional intensity of the turn
    pub sentiment_intensity: f64,
    /// Explicit user feedback weight (thumbs-up, starred, corrected)
    pub user_feedback: f64,
    /// How many times this topic has recurred for the owner
    pub recurrence_count: u32,
}

impl TurnSignals {
    /// Create a signal bundle.
    pub fn new(
        semantic_novelty: f64,
        sentiment_intensity: f64,
        user_feedback: f64,
        recurrence_count: u32,
    ) -> Self {
        Self {
            semantic_novelty,
            sentiment_intensity,
            user_feedback,
            recurrence_count,
        }
    }

    /// Neutral signals: mid novelty, no sentiment, no feedback.
    pub fn neutral() -> Self {
        Self::new(5.0, 0.0, 0.0, 0)
    }
}

/// The atomic unit of conversational memory.
///
/// Created by the tier controller at ingestion, written into Hot, and
/// later promoted or demoted based on importance and age. The `tier`
/// field mirrors the residency registry and is updated on every
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique id, assigned at creation, immutable
    pub id: ItemId,
    /// Partitioning key: all tier operations are scoped per owner
    pub owner_id: String,
    /// The conversation session this turn belongs to
    pub session_id: String,
    /// Turn text plus structured metadata
    pub content: TurnContent,
    /// The signals the importance score was computed from
    pub signals: TurnSignals,
    /// Importance score, computed at ingestion, recomputable
    pub importance: f64,
    /// When the item was created
    pub created_at: DateTime<Utc>,
    /// Updated whenever a retrieval query returns this item
    pub last_referenced_at: DateTime<Utc>,
    /// The tier currently owning the live copy
    pub tier: Tier,
}

impl MemoryItem {
    /// Create a new item in the Hot tier.
    pub fn new(
        owner_id: impl Into<String>,
        session_id: impl Into<String>,
        content: TurnContent,
        signals: TurnSignals,
        importance: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            session_id: session_id.into(),
            content,
            signals,
            importance,
            created_at: now,
            last_referenced_at: now,
            tier: Tier::Hot,
        }
    }

    /// Record that a retrieval query returned this item.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_referenced_at = now;
    }

    /// Age of the item relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// One entry of a ranked recall result.
///
/// Recall merges hot items, warm graph context, and (at deep retrieval)
/// reconstructed archive payloads into a single relevance-ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecalledMemory {
    /// A live memory item from the hot or warm tier
    Item {
        /// The item, with `last_referenced_at` already touched
        item: MemoryItem,
        /// Combined importance + recency relevance
        relevance: f64,
    },
    /// A warm-graph context node reached by traversal
    Context {
        /// The graph node
        node: crate::graph::GraphNode,
        /// Traversal score: weight discounted by path distance
        relevance: f64,
    },
    /// A payload rehydrated from the cold archive (deep recall only)
    Archived {
        /// Position of the chunk in the owner's chain
        chunk_id: u64,
        /// The rehydrated (possibly redacted) payload
        payload: String,
        /// Importance recorded at archival time, discounted
        relevance: f64,
    },
}

impl RecalledMemory {
    /// The relevance used for ranking, regardless of source tier.
    pub fn relevance(&self) -> f64 {
        match self {
            RecalledMemory::Item { relevance, .. } => *relevance,
            RecalledMemory::Context { relevance, .. } => *relevance,
            RecalledMemory::Archived { relevance, .. } => *relevance,
        }
    }
}
