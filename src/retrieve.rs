//! Semantic retrieval: ranking one member's messages against a question.
//!
//! The question is embedded into the same space as the message index and
//! every message belonging to the resolved member is scored by cosine
//! similarity. Results come back sorted descending, truncated to top-K,
//! with ties broken by corpus order (stable sort). Low-similarity messages
//! are still eligible for the top-K; the similarity threshold only feeds
//! confidence scoring, favoring recall over precision.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::index::IndexHolder;
use crate::models::{Corpus, RetrievalResult};

/// Name reported in answer metadata for this retrieval channel.
pub const RETRIEVAL_METHOD: &str = "semantic";

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: IndexHolder,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize, top_k: usize) -> Self {
        Self {
            embedder,
            index: IndexHolder::new(batch_size),
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rank `person`'s messages in `corpus` by similarity to `question`.
    ///
    /// Returns at most `top_k` results; all of the member's messages when
    /// they have fewer. An empty result means the member has no messages
    /// at all; the caller treats that as "no evidence".
    pub async fn retrieve(
        &self,
        question: &str,
        corpus: &Corpus,
        person: &str,
    ) -> Result<Vec<RetrievalResult>> {
        let indices = corpus.indices_for(person);
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index.ensure(corpus, self.embedder.as_ref()).await?;
        let query_vec = embed_query(self.embedder.as_ref(), question).await?;

        let mut results: Vec<RetrievalResult> = indices
            .iter()
            .map(|&i| {
                let sim = cosine_similarity(&query_vec, index.vector(i));
                RetrievalResult {
                    message_id: corpus.messages[i].id.clone(),
                    index: i,
                    score: sim.clamp(0.0, 1.0),
                }
            })
            .collect();

        // Stable sort: equal scores keep corpus order.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(self.top_k);

        debug!(
            person,
            candidates = indices.len(),
            returned = results.len(),
            top_score = results.first().map(|r| r.score).unwrap_or(0.0),
            "retrieval complete"
        );

        Ok(results)
    }
}
