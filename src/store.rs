//! Corpus store: where message data comes from and when.
//!
//! Load order is strict and short-circuiting:
//! 1. a non-expired in-memory cache (TTL, default one hour),
//! 2. the durable NDJSON snapshot on disk,
//! 3. the remote messages API, attempted only when the snapshot is
//!    unavailable or a refresh was explicitly forced.
//!
//! The snapshot is the permanent baseline: `load` never writes it, and a
//! successful remote fetch replaces only the in-memory cache. On restart
//! the corpus therefore comes from the snapshot again.
//!
//! Reloads are single-flight: the cache lock is held across the reload, so
//! concurrent requests that observe an expired cache wait for the one
//! in-flight reload and reuse its corpus instead of piling onto the
//! snapshot or the remote API.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::models::{Corpus, CorpusSource, Message};

/// Errors surfaced by [`CorpusStore::load`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Every load source failed; the request cannot be served.
    #[error("no message data available (snapshot: {snapshot}; remote: {remote})")]
    DataUnavailable { snapshot: String, remote: String },
}

/// Remote source of the full message set, invoked on refresh.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn fetch_all_messages(&self) -> anyhow::Result<Vec<Message>>;
}

/// Paginated HTTP client for the members messages API.
///
/// Walks `GET {base}{endpoint}?skip=&limit=` collecting `items` until
/// `total` is reached. The upstream API misbehaves on some pagination
/// offsets, so 400/405/500 on a page ends the walk with whatever was
/// collected rather than failing the fetch.
pub struct HttpRemoteClient {
    base_url: String,
    endpoint: String,
    page_limit: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            endpoint: config.endpoint.clone(),
            page_limit: config.page_limit,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn fetch_page(&self, skip: usize) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, self.endpoint);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self
                .client
                .get(&url)
                .query(&[("skip", skip), ("limit", self.page_limit)])
                .send()
                .await
            {
                Ok(resp) if resp.status().as_u16() == 429 || resp.status().is_server_error() => {
                    last_err = Some(anyhow::anyhow!("messages API error {}", resp.status()));
                    continue;
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("fetch failed after retries")))
    }
}

#[derive(serde::Deserialize)]
struct MessagesPage {
    #[serde(default)]
    items: Vec<Message>,
    #[serde(default)]
    total: usize,
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_all_messages(&self) -> anyhow::Result<Vec<Message>> {
        let mut all: Vec<Message> = Vec::new();
        let mut skip = 0;

        loop {
            let resp = match self.fetch_page(skip).await {
                Ok(resp) => resp,
                Err(e) => {
                    if all.is_empty() {
                        return Err(e);
                    }
                    // Known upstream pagination quirk: keep what we have.
                    warn!(skip, error = %e, "stopping pagination early");
                    break;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                if all.is_empty() {
                    anyhow::bail!("messages API error {}", status);
                }
                warn!(skip, %status, "stopping pagination early");
                break;
            }

            let page: MessagesPage = resp.json().await?;
            let total = page.total;
            if page.items.is_empty() {
                break;
            }

            all.extend(page.items);
            debug!(fetched = all.len(), total, "fetched messages page");

            if total > 0 && all.len() >= total {
                break;
            }

            skip += self.page_limit;
            // Light rate limiting between pages.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!(count = all.len(), "remote fetch complete");
        Ok(all)
    }
}

struct CacheEntry {
    corpus: Arc<Corpus>,
    loaded_at: Instant,
}

/// Owns the corpus lifecycle: cache, snapshot reads, and remote refreshes.
pub struct CorpusStore {
    snapshot_path: PathBuf,
    remote: Arc<dyn RemoteClient>,
    ttl: Duration,
    version: AtomicU64,
    cache: Mutex<Option<CacheEntry>>,
}

impl CorpusStore {
    pub fn new(snapshot_path: PathBuf, remote: Arc<dyn RemoteClient>, ttl: Duration) -> Self {
        Self {
            snapshot_path,
            remote,
            ttl,
            version: AtomicU64::new(0),
            cache: Mutex::new(None),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Load the corpus according to the cache → snapshot → remote policy.
    ///
    /// With `force_refresh`, the cache and snapshot are bypassed and the
    /// remote API is attempted first; a failed remote fetch still falls
    /// back to the snapshot so a flaky upstream does not take the service
    /// down. The snapshot file itself is never written here.
    pub async fn load(
        &self,
        force_refresh: bool,
    ) -> Result<(Arc<Corpus>, CorpusSource), StoreError> {
        let mut guard = self.cache.lock().await;

        if !force_refresh {
            if let Some(entry) = guard.as_ref() {
                if entry.loaded_at.elapsed() < self.ttl {
                    debug!(
                        version = entry.corpus.version,
                        messages = entry.corpus.len(),
                        "corpus cache hit"
                    );
                    return Ok((entry.corpus.clone(), CorpusSource::CacheHit));
                }
            }

            match self.read_snapshot() {
                Ok(Some(messages)) => {
                    let corpus = self.install(&mut guard, messages);
                    info!(
                        version = corpus.version,
                        messages = corpus.len(),
                        "corpus loaded from snapshot"
                    );
                    return Ok((corpus, CorpusSource::LocalFile));
                }
                Ok(None) => {
                    debug!(path = %self.snapshot_path.display(), "snapshot missing or empty");
                }
                Err(e) => {
                    warn!(error = %e, "snapshot read failed");
                }
            }
        }

        match self.remote.fetch_all_messages().await {
            Ok(messages) if !messages.is_empty() => {
                let corpus = self.install(&mut guard, messages);
                info!(
                    version = corpus.version,
                    messages = corpus.len(),
                    "corpus refreshed from remote API (snapshot untouched)"
                );
                Ok((corpus, CorpusSource::RemoteApi))
            }
            Ok(_) => self.fallback_to_snapshot(&mut guard, "remote returned no messages"),
            Err(e) => self.fallback_to_snapshot(&mut guard, &e.to_string()),
        }
    }

    /// Drop the cached corpus; the next load re-reads the snapshot.
    pub async fn invalidate(&self) {
        let mut guard = self.cache.lock().await;
        *guard = None;
        info!("corpus cache invalidated");
    }

    /// One-line cache description for stats output.
    pub async fn cache_state(&self) -> String {
        let guard = self.cache.lock().await;
        match guard.as_ref() {
            Some(entry) => {
                let age = entry.loaded_at.elapsed();
                if age < self.ttl {
                    format!("warm ({}s old, v{})", age.as_secs(), entry.corpus.version)
                } else {
                    format!("expired ({}s old)", age.as_secs())
                }
            }
            None => "empty".to_string(),
        }
    }

    fn install(&self, guard: &mut Option<CacheEntry>, messages: Vec<Message>) -> Arc<Corpus> {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let corpus = Arc::new(Corpus::new(version, messages));
        *guard = Some(CacheEntry {
            corpus: corpus.clone(),
            loaded_at: Instant::now(),
        });
        corpus
    }

    fn fallback_to_snapshot(
        &self,
        guard: &mut Option<CacheEntry>,
        remote_err: &str,
    ) -> Result<(Arc<Corpus>, CorpusSource), StoreError> {
        warn!(error = remote_err, "remote fetch failed, trying snapshot");
        match self.read_snapshot() {
            Ok(Some(messages)) => {
                let corpus = self.install(guard, messages);
                Ok((corpus, CorpusSource::LocalFile))
            }
            Ok(None) => Err(StoreError::DataUnavailable {
                snapshot: "missing or empty".to_string(),
                remote: remote_err.to_string(),
            }),
            Err(e) => Err(StoreError::DataUnavailable {
                snapshot: e.to_string(),
                remote: remote_err.to_string(),
            }),
        }
    }

    /// Read the durable NDJSON snapshot. `Ok(None)` when the file is
    /// missing or holds no messages. Unparseable lines are skipped so one
    /// bad record never poisons the whole corpus.
    fn read_snapshot(&self) -> anyhow::Result<Option<Vec<Message>>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.snapshot_path)?;
        let mut messages = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "skipping invalid snapshot line");
                }
            }
        }

        if messages.is_empty() {
            Ok(None)
        } else {
            Ok(Some(messages))
        }
    }
}
