//! Answer synthesis boundary.
//!
//! The pipeline's only job here is to build the prompt (question plus the
//! retrieved messages in rank order) and hand it to a [`Generator`]. The
//! returned text is untrusted free-form content, with no parsing and no
//! validation beyond non-emptiness. Failures are typed so the caller can
//! tell a timeout from an API error instead of papering over them with a
//! fabricated answer.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::models::Message;

/// Errors from the external text-generation call.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("generation transport error: {0}")]
    Transport(String),
    #[error("generator returned an empty answer")]
    EmptyAnswer,
}

/// Capability interface for the external text-generation service.
///
/// Prompt in, text out. Substitutable with a deterministic fake in tests.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3.2:3b"`).
    fn model_name(&self) -> &str;

    /// Generate free text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Whether the backing service is reachable right now. Used for
    /// stats/health reporting only; answering goes straight to
    /// [`generate`](Generator::generate).
    async fn available(&self) -> bool {
        true
    }
}

/// Build the synthesis prompt from the question and ranked context.
///
/// Messages arrive in rank order; the best match is called out explicitly
/// since models weight early context more. Timestamps are included as
/// `[YYYY-MM-DD]` so relative dates in message text can be anchored.
pub fn build_prompt(question: &str, person: &str, context: &[&Message]) -> String {
    let mut lines = Vec::with_capacity(context.len());
    for (i, msg) in context.iter().enumerate() {
        let dated = match msg.date() {
            Some(date) => format!("[{}] {}", date, msg.text),
            None => msg.text.clone(),
        };
        if i == 0 {
            lines.push(format!("MOST RELEVANT: {}", dated));
        } else {
            lines.push(format!("{}. {}", i + 1, dated));
        }
    }

    format!(
        "{person}'s messages (sorted by relevance):\n\n\
         {context}\n\n\
         Question: {question}\n\n\
         Instructions:\n\
         - Focus on the most specific message that directly answers the question\n\
         - Don't link unrelated messages from different dates unless they're clearly about the same event\n\
         - Include specific details from the best matching message: dates, places, durations, names\n\
         - If a message uses relative dates like \"Monday\", anchor them with the [YYYY-MM-DD] timestamp\n\
         - Give a clear, concise answer\n\n\
         Answer:",
        person = person,
        context = lines.join("\n"),
        question = question,
    )
}

/// Generator backed by a local Ollama instance (`POST /api/generate`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config.url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "top_p": 0.9,
                "num_predict": self.max_tokens,
            }
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let answer = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        debug!(model = %self.model, chars = answer.len(), "generation complete");

        if answer.is_empty() {
            return Err(GenerationError::EmptyAnswer);
        }
        Ok(answer)
    }

    async fn available(&self) -> bool {
        let resp = match self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return false,
        };

        let json: serde_json::Value = match resp.json().await {
            Ok(json) => json,
            Err(_) => return false,
        };

        json.get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                    .any(|name| name == self.model)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn msg(text: &str, ts: Option<&str>) -> Message {
        Message {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            user_name: "Layla Kawaguchi".to_string(),
            timestamp: ts.map(|s| s.to_string()),
            text: text.to_string(),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_prompt_orders_and_marks_top_message() {
        let m1 = msg("trip to London in December", Some("2025-06-01T10:00:00Z"));
        let m2 = msg("hotel near the river", Some("2025-06-03T09:00:00Z"));
        let m3 = msg("aisle seat please", None);

        let prompt = build_prompt(
            "When is Layla's trip?",
            "Layla Kawaguchi",
            &[&m1, &m2, &m3],
        );

        assert!(prompt.starts_with("Layla Kawaguchi's messages"));
        assert!(prompt.contains("MOST RELEVANT: [2025-06-01] trip to London in December"));
        assert!(prompt.contains("2. [2025-06-03] hotel near the river"));
        assert!(prompt.contains("3. aisle seat please"));
        assert!(prompt.contains("Question: When is Layla's trip?"));
        assert!(prompt.ends_with("Answer:"));

        // Rank order preserved in the prompt body.
        let top = prompt.find("trip to London").unwrap();
        let second = prompt.find("hotel near").unwrap();
        assert!(top < second);
    }

    #[test]
    fn test_prompt_with_no_context() {
        let prompt = build_prompt("Anything?", "Vikram Desai", &[]);
        assert!(prompt.contains("Vikram Desai's messages"));
        assert!(prompt.contains("Question: Anything?"));
    }
}
