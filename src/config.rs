use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Member;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub roster: RosterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/messages_checkpoint.ndjson")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds before a cached corpus is considered stale.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            endpoint: default_remote_endpoint(),
            page_limit: default_page_limit(),
            timeout_secs: default_remote_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_remote_base_url() -> String {
    "https://november7-730026606190.europe-west1.run.app".to_string()
}
fn default_remote_endpoint() -> String {
    "/messages/".to_string()
}
fn default_page_limit() -> usize {
    100
}
fn default_remote_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of messages returned per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Similarity floor used by confidence scoring. Results below it are
    /// still returned; recall is favored over precision here.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_threshold() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    5
}
fn default_embed_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            url: default_generation_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_generation_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    200
}
fn default_generation_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

/// The fixed set of members questions may reference.
#[derive(Debug, Deserialize, Clone)]
pub struct RosterConfig {
    pub members: Vec<Member>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.roster.members.is_empty() {
        anyhow::bail!("roster.members must list at least one member");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [0.0, 1.0]");
    }

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.provider == "openai"
        && (config.embedding.model.is_none() || config.embedding.dims.is_none())
    {
        anyhow::bail!(
            "embedding.model and embedding.dims must be set when provider is 'openai'"
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mqa.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let (_tmp, path) = write_config(
            r#"
[[roster.members]]
name = "Layla Kawaguchi"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.model, "llama3.2:3b");
        assert_eq!(config.roster.members.len(), 1);
    }

    #[test]
    fn test_empty_roster_rejected() {
        let (_tmp, path) = write_config("[roster]\nmembers = []\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let (_tmp, path) = write_config(
            r#"
[retrieval]
threshold = 1.5

[[roster.members]]
name = "Layla Kawaguchi"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_unknown_embedding_provider_rejected() {
        let (_tmp, path) = write_config(
            r#"
[embedding]
provider = "magic"

[[roster.members]]
name = "Layla Kawaguchi"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let (_tmp, path) = write_config(
            r#"
[embedding]
provider = "openai"

[[roster.members]]
name = "Layla Kawaguchi"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_roster_aliases_parsed() {
        let (_tmp, path) = write_config(
            r#"
[[roster.members]]
name = "Lily O'Sullivan"
aliases = ["Lily", "O'Sullivan"]

[[roster.members]]
name = "Vikram Desai"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.roster.members[0].aliases.len(), 2);
        assert!(config.roster.members[1].aliases.is_empty());
    }
}
