//! Core data models used throughout Member QA.
//!
//! These types represent the members, messages, and results that flow
//! through the answer pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A roster member: canonical display name plus the name variants the
/// entity resolver will accept. Immutable once loaded from config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    /// Aliases matched during resolution (partial names, nicknames).
    /// When empty, defaults are derived from the full name at load time.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Member {
    /// Fill in default aliases (full name, first name, last name) when the
    /// config lists none.
    pub fn with_default_aliases(mut self) -> Self {
        if self.aliases.is_empty() {
            self.aliases.push(self.name.clone());
            let parts: Vec<&str> = self.name.split_whitespace().collect();
            if parts.len() > 1 {
                self.aliases.push(parts[0].to_string());
                self.aliases.push(parts[parts.len() - 1].to_string());
            }
        }
        self
    }
}

/// A single message as stored in the NDJSON snapshot and returned by the
/// remote API. The body field is named `message` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub user_name: String,
    /// ISO-8601 timestamp as emitted by the source; kept as text since
    /// upstream records are occasionally partial.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "message")]
    pub text: String,
    /// Opaque metadata carried through unparsed.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Date prefix (`YYYY-MM-DD`) for prompt context, if a timestamp exists.
    pub fn date(&self) -> Option<&str> {
        self.timestamp
            .as_deref()
            .and_then(|ts| ts.split('T').next())
            .filter(|d| !d.is_empty())
    }
}

/// The full message corpus for all members, versioned by load event.
///
/// Messages are immutable once loaded; a refresh replaces the whole corpus
/// with a new version. Duplicate text for a member may exist at low
/// cardinality and is deliberately not deduplicated.
#[derive(Debug)]
pub struct Corpus {
    /// Monotonic load-event version. The embedding index is keyed on this
    /// so a stale index can never be queried against a newer corpus.
    pub version: u64,
    pub messages: Vec<Message>,
    by_person: HashMap<String, Vec<usize>>,
}

impl Corpus {
    pub fn new(version: u64, messages: Vec<Message>) -> Self {
        let mut by_person: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, msg) in messages.iter().enumerate() {
            by_person
                .entry(msg.user_name.to_lowercase())
                .or_default()
                .push(i);
        }
        Self {
            version,
            messages,
            by_person,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Indices (in corpus order) of all messages authored by `person`.
    pub fn indices_for(&self, person: &str) -> &[usize] {
        self.by_person
            .get(&person.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Message count per author, for stats output.
    pub fn counts_by_person(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for msg in &self.messages {
            *counts.entry(msg.user_name.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Where the corpus store satisfied a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusSource {
    /// Served from the non-expired in-memory cache.
    CacheHit,
    /// Read from the durable NDJSON snapshot.
    LocalFile,
    /// Fetched from the remote messages API.
    RemoteApi,
}

impl CorpusSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorpusSource::CacheHit => "cache",
            CorpusSource::LocalFile => "local_file",
            CorpusSource::RemoteApi => "remote_api",
        }
    }
}

/// A ranked retrieval hit for one message.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub message_id: String,
    /// Position of the message in the corpus, for context lookup.
    pub index: usize,
    /// Cosine similarity clamped to `[0, 1]`.
    pub score: f32,
}

/// The structured answer produced by the pipeline. Built fresh per request
/// and never persisted by the core.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    /// Heuristic confidence in `[0, 1]`; not a calibrated probability.
    pub confidence: f32,
    pub metadata: AnswerMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerMetadata {
    /// Resolved member display name, or `None` when no member matched.
    pub person: Option<String>,
    pub messages_found: usize,
    pub relevant_messages: usize,
    pub retrieval_method: String,
    pub used_cached_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, user: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            user_id: format!("u-{}", user),
            user_name: user.to_string(),
            timestamp: Some("2025-06-01T10:00:00Z".to_string()),
            text: text.to_string(),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_corpus_partitions_by_person_case_insensitive() {
        let corpus = Corpus::new(
            1,
            vec![
                msg("1", "Layla Kawaguchi", "trip to London"),
                msg("2", "Vikram Desai", "aisle seat please"),
                msg("3", "layla kawaguchi", "hotel near the river"),
            ],
        );
        assert_eq!(corpus.indices_for("Layla Kawaguchi"), &[0, 2]);
        assert_eq!(corpus.indices_for("LAYLA KAWAGUCHI"), &[0, 2]);
        assert_eq!(corpus.indices_for("Vikram Desai"), &[1]);
        assert!(corpus.indices_for("Nobody").is_empty());
    }

    #[test]
    fn test_corpus_keeps_duplicates() {
        let corpus = Corpus::new(
            1,
            vec![
                msg("1", "Layla Kawaguchi", "same text"),
                msg("2", "Layla Kawaguchi", "same text"),
            ],
        );
        assert_eq!(corpus.indices_for("Layla Kawaguchi").len(), 2);
    }

    #[test]
    fn test_message_wire_format() {
        let json = r#"{"id":"m1","user_id":"u1","user_name":"Layla Kawaguchi","timestamp":"2025-06-01T10:00:00Z","message":"Planning my trip","channel":"travel"}"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.text, "Planning my trip");
        assert_eq!(m.date(), Some("2025-06-01"));
        assert_eq!(m.extra.get("channel").unwrap(), "travel");

        let out = serde_json::to_value(&m).unwrap();
        assert_eq!(out["message"], "Planning my trip");
        assert!(out.get("text").is_none());
    }

    #[test]
    fn test_message_missing_timestamp() {
        let json = r#"{"id":"m1","user_name":"Layla Kawaguchi","message":"hi"}"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.date(), None);
    }

    #[test]
    fn test_default_aliases() {
        let member = Member {
            name: "Layla Kawaguchi".to_string(),
            aliases: vec![],
        }
        .with_default_aliases();
        assert_eq!(member.aliases, vec!["Layla Kawaguchi", "Layla", "Kawaguchi"]);

        let explicit = Member {
            name: "Lily O'Sullivan".to_string(),
            aliases: vec!["Lily".to_string()],
        }
        .with_default_aliases();
        assert_eq!(explicit.aliases, vec!["Lily"]);
    }
}
