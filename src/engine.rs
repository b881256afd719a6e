//! Pipeline orchestrator: question in, structured answer out.
//!
//! One request moves linearly through resolve → load → retrieve →
//! synthesize → score, with a single branch point: a question naming no
//! roster member short-circuits to a low-confidence result without
//! touching the store, the retriever, or the generator. Data-source and
//! generation failures surface as typed errors; the engine never returns
//! a result with a missing or fabricated answer.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::confidence;
use crate::generate::{build_prompt, GenerationError, Generator};
use crate::models::{AnswerMetadata, AnswerResult, CorpusSource, Member};
use crate::retrieve::{Retriever, RETRIEVAL_METHOD};
use crate::roster::Roster;
use crate::store::{CorpusStore, StoreError};

/// Fatal pipeline errors. Resolution misses and empty retrievals are not
/// errors; they downgrade to low-confidence results instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// All corpus sources failed; there is nothing to answer from.
    #[error(transparent)]
    DataUnavailable(#[from] StoreError),
    /// Embedding the query or building the index failed.
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
    /// The external generation call errored, timed out, or returned
    /// nothing usable.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// System statistics for the `stats` command and endpoint.
#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_messages: usize,
    pub total_members: usize,
    pub cache_state: String,
    pub generation_model: String,
    pub generation_available: bool,
    pub member_message_counts: Vec<(String, usize)>,
}

pub struct QaEngine {
    roster: Roster,
    store: CorpusStore,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    threshold: f32,
}

impl QaEngine {
    pub fn new(
        roster: Roster,
        store: CorpusStore,
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        threshold: f32,
    ) -> Self {
        Self {
            roster,
            store,
            retriever,
            generator,
            threshold,
        }
    }

    /// Answer a question about a roster member.
    ///
    /// `use_cached_data=false` forces a refresh from the remote API before
    /// answering; the durable snapshot is never modified either way.
    pub async fn answer(
        &self,
        question: &str,
        use_cached_data: bool,
    ) -> Result<AnswerResult, EngineError> {
        info!(question, use_cached_data, "processing question");

        let member = match self.roster.resolve(question) {
            Some(member) => member,
            None => {
                info!("no member resolved, short-circuiting");
                return Ok(self.short_circuit(question));
            }
        };
        info!(person = %member.name, "resolved member");

        let (corpus, source) = self.store.load(!use_cached_data).await?;
        let used_cached_data = source == CorpusSource::CacheHit;
        let messages_found = corpus.indices_for(&member.name).len();
        info!(
            person = %member.name,
            messages_found,
            source = source.as_str(),
            "corpus loaded"
        );

        if messages_found == 0 {
            warn!(person = %member.name, "member has no messages");
            return Ok(AnswerResult {
                answer: format!(
                    "I couldn't find any messages from {} to answer that.",
                    member.name
                ),
                confidence: 0.0,
                metadata: AnswerMetadata {
                    person: Some(member.name.clone()),
                    messages_found: 0,
                    relevant_messages: 0,
                    retrieval_method: RETRIEVAL_METHOD.to_string(),
                    used_cached_data,
                },
            });
        }

        let results = self
            .retriever
            .retrieve(question, &corpus, &member.name)
            .await
            .map_err(EngineError::Embedding)?;

        let context: Vec<&crate::models::Message> =
            results.iter().map(|r| &corpus.messages[r.index]).collect();
        let prompt = build_prompt(question, &member.name, &context);

        let answer = self.generator.generate(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(GenerationError::EmptyAnswer.into());
        }

        let confidence = confidence::score(
            &results,
            true,
            self.threshold,
            self.retriever.top_k(),
        );
        let relevant_messages = confidence::relevant_count(&results, self.threshold);

        info!(
            person = %member.name,
            confidence,
            relevant_messages,
            scoring = confidence::SCORING_VERSION,
            "answer complete"
        );

        Ok(AnswerResult {
            answer,
            confidence,
            metadata: AnswerMetadata {
                person: Some(member.name.clone()),
                messages_found,
                relevant_messages,
                retrieval_method: RETRIEVAL_METHOD.to_string(),
                used_cached_data,
            },
        })
    }

    fn short_circuit(&self, _question: &str) -> AnswerResult {
        AnswerResult {
            answer: "I couldn't tell which member that question is about. \
                     Try including a name from the roster."
                .to_string(),
            confidence: 0.0,
            metadata: AnswerMetadata {
                person: None,
                messages_found: 0,
                relevant_messages: 0,
                retrieval_method: RETRIEVAL_METHOD.to_string(),
                used_cached_data: false,
            },
        }
    }

    /// Reload the corpus. With `force`, the remote API is attempted and the
    /// in-memory cache replaced; the snapshot stays untouched.
    pub async fn refresh(&self, force: bool) -> Result<CorpusSource, EngineError> {
        if force {
            self.store.invalidate().await;
        }
        let (_, source) = self.store.load(force).await?;
        Ok(source)
    }

    pub fn list_members(&self) -> &[Member] {
        self.roster.members()
    }

    pub async fn stats(&self) -> Result<Stats, EngineError> {
        let (corpus, _) = self.store.load(false).await?;
        let mut member_message_counts: Vec<(String, usize)> =
            corpus.counts_by_person().into_iter().collect();
        member_message_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(Stats {
            total_messages: corpus.len(),
            total_members: self.roster.len(),
            cache_state: self.store.cache_state().await,
            generation_model: self.generator.model_name().to_string(),
            generation_available: self.generator.available().await,
            member_message_counts,
        })
    }
}
