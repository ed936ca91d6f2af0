//! # hearth — Tiered Conversational Memory
//!
//! **Tagline:** *"Remember. Rank. Verify."*
//!
//! hearth is a three-tier memory engine for conversational applications:
//! - **Hot** — a bounded, recency-biased cache of what was just said
//! - **Warm** — a persistent context graph of entities, topics, and
//!   summaries, queried by shortest-path traversal
//! - **Cold** — an append-only, hash-chained, delta-compressed archive
//!   whose history is tamper-evident and reconstructable
//!
//! Every turn is scored for importance at ingestion; the score drives
//! tier placement, promotion, demotion, and retrieval ranking. Archived
//! payloads can be scrubbed of personally identifying content without
//! breaking the hash chain's verifiability.
//!
//! ## Quick Start
//!
//! ```ignore
//! use hearth::{Depth, MemoryEngine, TurnContent, TurnSignals};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Start the engine (in-memory, zero configuration)
//!     let engine = MemoryEngine::start().await?;
//!
//!     // Record a conversational turn with its importance signals
//!     engine.record_turn(
//!         "alice",
//!         "session-1",
//!         TurnContent::new(
//!             "I finally accepted the Berlin offer!",
//!             vec!["Berlin".into()],
//!             vec!["career".into()],
//!         ),
//!         TurnSignals::new(9.0, 8.5, 7.0, 2),
//!     ).await?;
//!
//!     // Recall ranked context
//!     let context = engine.recall_context("alice", Some("career"), Depth::Shallow).await?;
//!     for memory in &context {
//!         println!("relevance {:.2}", memory.relevance());
//!     }
//!
//!     // Verify the archive's hash chain
//!     assert!(engine.verify_integrity("alice"));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The engine is built from five components behind one facade:
//!
//! 1. **Tier Controller** ([`engine`]) — routes writes, promotes and
//!    demotes items, serves merged, ranked reads
//! 2. **Importance Scorer** ([`scoring`]) — pure, deterministic signal
//!    weighting
//! 3. **Hot Cache** ([`hot`]) — count-bounded per-owner recency rings
//! 4. **Warm Graph** ([`graph`]) — deduplicated entity/topic/summary
//!    nodes with weighted edges
//! 5. **Cold Archive** ([`archive`]) — per-owner hash chains with delta
//!    compression and redaction-safe commitments ([`redaction`])
//!
//! ## Thread Safety
//!
//! All engine operations are thread-safe. A `MemoryEngine` clones
//! cheaply (`Arc` internally) and can be shared across tasks:
//!
//! ```ignore
//! let engine = MemoryEngine::start().await?;
//! let handle = engine.clone();
//!
//! tokio::spawn(async move {
//!     handle.record_turn("bob", "s1", content, signals).await.unwrap();
//! });
//! ```
//!
//! Mutations serialize per owner; operations for distinct owners run
//! concurrently.

// Internal modules
mod config;
mod error;
mod types;

// Tier components
pub mod archive;
pub mod graph;
pub mod hot;
pub mod redaction;
pub mod scoring;

// The controller facade
pub mod engine;

// Persistence (snapshots + durable chunk log)
pub mod persistence;

// Public API exports
pub use config::{ColdConfig, EngineConfig, HotConfig, WarmConfig};
pub use engine::{AuditExport, AuditRecord, EngineStats, MemoryEngine, SweepReport};
pub use error::{MemoryError, MemoryResult};
pub use types::{Depth, ItemId, MemoryItem, NodeId, RecalledMemory, Tier, TurnContent, TurnSignals};

// Component exports
pub use archive::{ArchiveChunk, ColdArchive, DeltaOp, DeltaPayload};
pub use graph::{GraphEdge, GraphNode, NodeKind, RankedNode, RelationKind, WarmGraph};
pub use hot::{HotCache, HotEviction, HotStats};
pub use redaction::{PrivacyRedactor, Redaction, REDACTION_TOKEN};
pub use scoring::{score, score_with, ScoringWeights, SCORE_MAX};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};

/// Prelude module for convenient imports.
///
/// Import everything you need with:
/// ```ignore
/// use hearth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ColdConfig, EngineConfig, HotConfig, WarmConfig};
    pub use crate::engine::{AuditExport, AuditRecord, MemoryEngine, SweepReport};
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::redaction::{PrivacyRedactor, Redaction};
    pub use crate::scoring::{score, ScoringWeights, SCORE_MAX};
    pub use crate::types::{
        Depth, ItemId, MemoryItem, RecalledMemory, Tier, TurnContent, TurnSignals,
    };
    pub use chrono::{DateTime, Utc};
}
