use crate::error::{DocragError, Result};
use crate::index::bm25::Bm25Index;
use crate::store::{VectorRecord, VectorStore};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use uuid::Uuid;

/// File name of the per-corpus BM25 snapshot inside the snapshot dir
const SNAPSHOT_FILE: &str = "bm25_index.bin";

/// Sequences every corpus mutation so the vector store and the BM25
/// index never diverge.
///
/// The vector store is the source of truth. Every `add` or `delete`
/// first mutates the store, then rebuilds the BM25 index wholesale from
/// a fresh scroll. Writers are serialized behind a mutex so concurrent
/// mutations produce a linear history; the BM25 index sits behind a
/// read-write lock whose exclusive side is held for the whole rebuild,
/// so retrieval never observes a partially rebuilt index. Vector-only
/// retrieval does not touch the lock at all.
pub struct IndexCoordinator {
    store: Arc<dyn VectorStore>,
    bm25: RwLock<Bm25Index>,
    writer: Mutex<()>,
    snapshot_path: PathBuf,
}

impl IndexCoordinator {
    pub fn new(store: Arc<dyn VectorStore>, snapshot_dir: &Path) -> Self {
        Self {
            store,
            bm25: RwLock::new(Bm25Index::new()),
            writer: Mutex::new(()),
            snapshot_path: snapshot_dir.join(SNAPSHOT_FILE),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Upsert `records` into the vector store, then rebuild the BM25
    /// index from a fresh scroll. Returns the number of points written.
    pub async fn add(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let added = records.len();
        self.store.upsert(records).await?;
        self.rebuild().await?;
        Ok(added)
    }

    /// Delete every point of `doc_id` from the vector store, then
    /// rebuild. Deleting an absent document is a no-op rebuild, which
    /// makes the operation idempotent.
    pub async fn delete(&self, doc_id: &str) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.store.delete_where(doc_id).await?;
        self.rebuild().await
    }

    /// Scroll the store and rebuild the in-memory index while holding
    /// the exclusive lock, then persist a snapshot. A failed snapshot
    /// write is a warning, not an error: the index is a cache and the
    /// next rebuild will try again.
    async fn rebuild(&self) -> Result<()> {
        let mut guard = self.bm25.write().await;
        let payloads = self.store.scroll().await?;
        log::info!("Rebuilding BM25 index with {} chunks", payloads.len());
        guard.build(payloads);

        if let Err(e) = guard.save(&self.snapshot_path) {
            log::warn!(
                "Failed to save BM25 snapshot to {}: {}",
                self.snapshot_path.display(),
                e
            );
        }
        Ok(())
    }

    /// Restore the BM25 index from the on-disk snapshot, verifying its
    /// chunk-id set against the vector store. A stale or undecodable
    /// snapshot is `IndexCorrupt`; the caller decides whether to
    /// rebuild.
    pub async fn load_snapshot(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let restored = Bm25Index::load(&self.snapshot_path)?;

        let store_ids = self.store_chunk_ids().await?;
        if restored.chunk_id_set() != store_ids {
            return Err(DocragError::IndexCorrupt(format!(
                "snapshot covers {} chunks but the vector store holds {}",
                restored.len(),
                store_ids.len()
            )));
        }

        let mut guard = self.bm25.write().await;
        *guard = restored;
        match guard.snapshot_saved_at() {
            Some(saved_at) => log::info!(
                "Restored BM25 snapshot ({} chunks, saved {})",
                guard.len(),
                saved_at
            ),
            None => log::info!("Restored BM25 snapshot ({} chunks)", guard.len()),
        }
        Ok(())
    }

    /// Restore from the snapshot if it is present and consistent,
    /// otherwise rebuild from the store.
    pub async fn load_or_rebuild(&self) -> Result<()> {
        match self.load_snapshot().await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("BM25 snapshot unusable ({}), rebuilding", e);
                let _writer = self.writer.lock().await;
                self.rebuild().await
            }
        }
    }

    /// Acquire the shared BM25 lock for the retrieval pipeline.
    ///
    /// With no deadline the caller waits out any rebuild in progress.
    /// With a deadline, failing to acquire the lock before it expires
    /// is `NotReady`: a rebuild holds the exclusive lock and no time
    /// remains.
    pub async fn bm25_read(
        &self,
        deadline: Option<Instant>,
    ) -> Result<RwLockReadGuard<'_, Bm25Index>> {
        match deadline {
            None => Ok(self.bm25.read().await),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::timeout(remaining, self.bm25.read())
                    .await
                    .map_err(|_| {
                        DocragError::NotReady(
                            "BM25 rebuild in progress and the query deadline expired".to_string(),
                        )
                    })
            }
        }
    }

    /// Number of chunks currently indexed for BM25.
    pub async fn bm25_len(&self) -> usize {
        self.bm25.read().await.len()
    }

    /// Check the index-consistency invariant: the BM25 chunk-id set
    /// equals the vector store chunk-id set.
    pub async fn verify(&self) -> Result<()> {
        let store_ids = self.store_chunk_ids().await?;
        let bm25_ids = self.bm25.read().await.chunk_id_set();
        if bm25_ids != store_ids {
            return Err(DocragError::IndexCorrupt(format!(
                "BM25 index holds {} chunks, vector store holds {}",
                bm25_ids.len(),
                store_ids.len()
            )));
        }
        Ok(())
    }

    async fn store_chunk_ids(&self) -> Result<HashSet<Uuid>> {
        Ok(self
            .store
            .scroll()
            .await?
            .into_iter()
            .map(|payload| payload.chunk_id)
            .collect())
    }
}
