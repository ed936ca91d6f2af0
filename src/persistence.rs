/// Persistence layer.
///
/// Two durability mechanisms, both rooted at the engine's data directory:
///
/// 1. **Chunk log** — a per-owner append-only JSONL file of archive
///    chunks. The tier controller writes a chunk here *before* committing
///    it to the in-memory chain, so a cold append is durable before it
///    returns. Writes are retried a bounded number of times; the chain
///    tail only advances after a successful write, never more than once
///    per logical append.
/// 2. **Snapshots** — a single-file dump of the whole engine state
///    (hot rings, warm graph, cold chains, residency registry), written
///    to a temporary file and atomically renamed into place.
use crate::archive::ArchiveChunk;
use crate::engine::MemoryEngine;
use crate::error::{MemoryError, MemoryResult};
use crate::graph::WarmSnapshot;
use crate::types::{ItemId, MemoryItem, Tier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Bounded retry count for durable chunk writes.
const WRITE_ATTEMPTS: u32 = 3;

/// Serializable snapshot of the entire engine state.
#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Format version for future compatibility
    pub version: u32,
    /// Hot rings per owner, most-recent-first
    pub hot: Vec<(String, Vec<MemoryItem>)>,
    /// Warm graph nodes, edges, and live items
    pub warm: WarmSnapshot,
    /// Cold chains per owner
    pub cold: Vec<(String, Vec<ArchiveChunk>)>,
    /// Tier residency registry
    pub residency: Vec<(ItemId, Tier)>,
}

impl EngineSnapshot {
    /// Create a snapshot envelope at the current format version.
    pub fn new(
        hot: Vec<(String, Vec<MemoryItem>)>,
        warm: WarmSnapshot,
        cold: Vec<(String, Vec<ArchiveChunk>)>,
        residency: Vec<(ItemId, Tier)>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            hot,
            warm,
            cold,
            residency,
        }
    }
}

/// Save the engine state to disk.
///
/// The snapshot is written to a temporary file first, then moved to the
/// final path, so a crash mid-write never leaves a torn snapshot.
pub async fn save(engine: &MemoryEngine, path: &Path) -> MemoryResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to create directory: {e}")))?;
    }

    let snapshot = engine.snapshot();
    let bytes = serde_json::to_vec(&snapshot)?;

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| MemoryError::Storage(format!("failed to write temporary file: {e}")))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| MemoryError::Storage(format!("failed to rename snapshot: {e}")))?;

    Ok(())
}

/// Load an engine snapshot from disk.
pub async fn load_snapshot(path: &Path) -> MemoryResult<EngineSnapshot> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| MemoryError::Storage(format!("failed to read snapshot: {e}")))?;

    let snapshot: EngineSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(MemoryError::Storage(format!(
            "incompatible snapshot version: {} (expected {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }

    Ok(snapshot)
}

/// Whether a snapshot exists at the given path.
pub async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

/// Per-owner append-only chunk log.
///
/// One JSONL file per owner under the log directory; the filename is the
/// hex encoding of the owner id, so arbitrary owner strings stay
/// filesystem-safe.
#[derive(Debug, Clone)]
pub struct ChunkLog {
    dir: PathBuf,
}

impl ChunkLog {
    /// Open (creating if needed) a chunk log rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> MemoryResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to create log directory: {e}")))?;
        Ok(Self { dir })
    }

    /// Durably append one chunk to its owner's log.
    ///
    /// Retries transient failures up to a bound, then surfaces the error.
    /// The caller commits the chunk to the in-memory chain only after
    /// this returns, which is what keeps retries from ever advancing the
    /// chain tail twice.
    pub async fn append(&self, chunk: &ArchiveChunk) -> MemoryResult<()> {
        let line = serde_json::to_string(chunk)?;
        let path = self.owner_path(&chunk.owner_id);

        let mut last_error = None;
        for attempt in 1..=WRITE_ATTEMPTS {
            match self.append_line(&path, &line).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        owner = %chunk.owner_id,
                        chunk = chunk.chunk_id,
                        attempt,
                        error = %e,
                        "durable chunk write failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(MemoryError::Storage(format!(
            "chunk write failed after {WRITE_ATTEMPTS} attempts: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Rewrite an owner's whole log (after redaction).
    ///
    /// Uses the same temp-then-rename scheme as snapshots.
    pub async fn rewrite(&self, owner_id: &str, chunks: &[ArchiveChunk]) -> MemoryResult<()> {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(&serde_json::to_string(chunk)?);
            body.push('\n');
        }

        let path = self.owner_path(owner_id);
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, body.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to rewrite log: {e}")))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to swap log: {e}")))?;

        Ok(())
    }

    /// Load an owner's chain from its log. A missing file is an empty
    /// chain, not an error.
    pub async fn load_owner(&self, owner_id: &str) -> MemoryResult<Vec<ArchiveChunk>> {
        let path = self.owner_path(owner_id);

        let body = match fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MemoryError::Storage(format!("failed to read log: {e}"))),
        };

        let mut chunks = Vec::new();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            chunks.push(serde_json::from_str(line)?);
        }
        Ok(chunks)
    }

    async fn append_line(&self, path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_data().await?;
        Ok(())
    }

    fn owner_path(&self, owner_id: &str) -> PathBuf {
        self.dir.join(format!("{}.chain.jsonl", hex::encode(owner_id)))
    }
}
