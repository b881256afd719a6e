//! Embedding index derived from a corpus version.
//!
//! The index holds one vector per corpus message and is keyed by the
//! corpus version it was built from. It is built lazily on first use and
//! reused until the corpus identity changes (e.g. after a forced refresh),
//! at which point it is rebuilt in full and swapped atomically. Readers
//! always observe either the old complete index or the new complete one.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::models::Corpus;

/// Immutable vector index over one corpus version.
pub struct EmbeddingIndex {
    version: u64,
    /// Message vectors, parallel to `Corpus::messages`. A message's corpus
    /// position identifies its vector within this version.
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector for the message at `index` in the corpus this was built from.
    pub fn vector(&self, index: usize) -> &[f32] {
        &self.vectors[index]
    }
}

/// Owns the current index and rebuilds it when the corpus version moves.
pub struct IndexHolder {
    batch_size: usize,
    current: RwLock<Option<Arc<EmbeddingIndex>>>,
}

impl IndexHolder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            current: RwLock::new(None),
        }
    }

    /// Return the index for `corpus`, building it if absent or stale.
    ///
    /// A version mismatch is resolved by rebuilding; a stale index is never
    /// handed out. The write lock is held for the duration of a rebuild, so
    /// concurrent callers wait for one build instead of racing their own.
    pub async fn ensure(
        &self,
        corpus: &Corpus,
        embedder: &dyn Embedder,
    ) -> Result<Arc<EmbeddingIndex>> {
        {
            let guard = self.current.read().await;
            if let Some(index) = guard.as_ref() {
                if index.version == corpus.version {
                    debug!(version = corpus.version, "embedding index reused");
                    return Ok(index.clone());
                }
            }
        }

        let mut guard = self.current.write().await;
        // Re-check: another task may have finished the rebuild while this
        // one waited for the write lock.
        if let Some(index) = guard.as_ref() {
            if index.version == corpus.version {
                return Ok(index.clone());
            }
        }

        let index = Arc::new(build_index(corpus, embedder, self.batch_size).await?);
        info!(
            version = index.version,
            vectors = index.len(),
            model = embedder.model_name(),
            "embedding index built"
        );
        *guard = Some(index.clone());
        Ok(index)
    }
}

async fn build_index(
    corpus: &Corpus,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<EmbeddingIndex> {
    let texts: Vec<String> = corpus.messages.iter().map(|m| m.text.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let mut batch_vecs = embedder.embed(batch).await?;
        if batch_vecs.len() != batch.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} texts",
                batch_vecs.len(),
                batch.len()
            );
        }
        vectors.append(&mut batch_vecs);
    }

    Ok(EmbeddingIndex {
        version: corpus.version,
        vectors,
    })
}
