/// Error types for hearth operations.
///
/// This module provides the error hierarchy covering all failure modes in
/// the memory engine. All errors are well-typed and can be pattern-matched
/// for precise handling.
use thiserror::Error;

/// The main error type for hearth operations.
///
/// All fallible operations in hearth return `Result<T, MemoryError>`.
/// Integrity and input-validation errors are always surfaced to the
/// immediate caller and never retried internally.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// A scoring signal was out of its documented range
    #[error("Invalid signal '{name}': {value} is outside 0..={max}")]
    InvalidSignal {
        /// Which signal was malformed
        name: &'static str,
        /// The offending value
        value: f64,
        /// The documented upper bound
        max: f64,
    },

    /// A stored chunk's recomputed hash does not match, or a previous-hash
    /// link is broken. Never silently corrected.
    #[error("Chain integrity failure for owner '{owner_id}' at chunk {chunk_id}: {reason}")]
    ChainIntegrity {
        /// The owner whose chain failed verification
        owner_id: String,
        /// The chunk where verification failed
        chunk_id: u64,
        /// What mismatched
        reason: String,
    },

    /// A fail-fast mutating call found another mutation in flight for the
    /// same owner. Queuing entry points never raise this.
    #[error("Another mutation is in flight for owner '{owner_id}'")]
    OwnerBusy {
        /// The contended owner
        owner_id: String,
    },

    /// `reconstruct` was asked for a chunk beyond the chain tail
    #[error("Chunk {chunk_id} not found for owner '{owner_id}'")]
    ChunkNotFound {
        /// The owner that was queried
        owner_id: String,
        /// The chunk id that does not exist
        chunk_id: u64,
    },

    /// Durable storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error when encoding or decoding stored state
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for hearth operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
