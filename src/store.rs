// src/store.rs
//! Persisted entities and the corpus store abstraction.
//!
//! The pipeline needs only a handful of operations and never assumes multi-row
//! transactions. Two implementations: [`MemoryStore`] (tests, ephemeral deployments) and
//! [`JsonFileStore`] (whole-snapshot JSON file rewritten after each mutation; the
//! in-memory view only changes once the file write succeeded).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Day marker: its existence means "today's ingestion was attempted".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionRun {
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifiedArticle {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub source: String,
    pub is_fake: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields of an article before it gets an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub source: String,
    pub is_fake: bool,
    pub metadata: serde_json::Value,
}

/// One scoring request. `user_hash` is a one-way hash; the identity is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryLog {
    pub user_hash: String,
    pub query_text: String,
    pub prediction_score: f32,
    pub prediction_label: String,
    #[serde(default)]
    pub explainability: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn run_exists_for(&self, date: NaiveDate) -> Result<bool>;
    /// Insert-if-absent. `true` when this call created the marker.
    async fn create_run_marker(&self, date: NaiveDate) -> Result<bool>;
    async fn article_exists_with_title(&self, title: &str) -> Result<bool>;
    async fn insert_article(&self, article: NewArticle) -> Result<VerifiedArticle>;
    /// A uniformly random `is_fake` article, if any exist.
    async fn random_fake_article(&self) -> Result<Option<VerifiedArticle>>;
    async fn append_query_log(&self, entry: QueryLog) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub runs: Vec<IngestionRun>,
    #[serde(default)]
    pub articles: Vec<VerifiedArticle>,
    #[serde(default)]
    pub query_logs: Vec<QueryLog>,
    #[serde(default)]
    pub next_id: u64,
}

impl Snapshot {
    fn run_exists_for(&self, date: NaiveDate) -> bool {
        self.runs.iter().any(|r| r.date == date)
    }

    fn create_run_marker(&mut self, date: NaiveDate) -> bool {
        if self.run_exists_for(date) {
            return false;
        }
        self.runs.push(IngestionRun {
            date,
            created_at: Utc::now(),
        });
        true
    }

    fn article_exists_with_title(&self, title: &str) -> bool {
        self.articles.iter().any(|a| a.title == title)
    }

    fn insert_article(&mut self, a: NewArticle) -> VerifiedArticle {
        self.next_id += 1;
        let row = VerifiedArticle {
            id: self.next_id,
            title: a.title,
            description: a.description,
            source: a.source,
            is_fake: a.is_fake,
            metadata: a.metadata,
            created_at: Utc::now(),
        };
        self.articles.push(row.clone());
        row
    }

    fn random_fake_article(&self) -> Option<VerifiedArticle> {
        let fakes: Vec<&VerifiedArticle> = self.articles.iter().filter(|a| a.is_fake).collect();
        fakes.choose(&mut rand::rng()).map(|a| (*a).clone())
    }
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.clone()
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn run_exists_for(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.inner.lock().await.run_exists_for(date))
    }

    async fn create_run_marker(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.inner.lock().await.create_run_marker(date))
    }

    async fn article_exists_with_title(&self, title: &str) -> Result<bool> {
        Ok(self.inner.lock().await.article_exists_with_title(title))
    }

    async fn insert_article(&self, article: NewArticle) -> Result<VerifiedArticle> {
        Ok(self.inner.lock().await.insert_article(article))
    }

    async fn random_fake_article(&self) -> Result<Option<VerifiedArticle>> {
        Ok(self.inner.lock().await.random_fake_article())
    }

    async fn append_query_log(&self, entry: QueryLog) -> Result<()> {
        self.inner.lock().await.query_logs.push(entry);
        Ok(())
    }
}

// ------------------------------------------------------------
// JSON file
// ------------------------------------------------------------

pub struct JsonFileStore {
    path: PathBuf,
    /// Published state. Readers never wait on file I/O.
    inner: RwLock<Snapshot>,
    /// Serializes writers.
    writer: Mutex<()>,
}

impl JsonFileStore {
    /// Load `path` if it exists, otherwise start empty (the file is created on first write).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing corpus store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading corpus store {}", path.display()))
            }
        };
        tracing::info!(
            target: "corpus",
            path = %path.display(),
            articles = snapshot.articles.len(),
            runs = snapshot.runs.len(),
            "corpus store opened"
        );
        Ok(Self {
            path,
            inner: RwLock::new(snapshot),
            writer: Mutex::new(()),
        })
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    /// Apply `f` to a copy of the published snapshot; when it reports a change, persist
    /// the copy and only then publish it. A failed write leaves the store as it was.
    async fn commit<R>(&self, f: impl FnOnce(&mut Snapshot) -> (R, bool)) -> Result<R> {
        let _writer = self.writer.lock().await;
        let mut next = self.inner.read().await.clone();
        let (out, changed) = f(&mut next);
        if changed {
            self.persist(&next).await?;
            *self.inner.write().await = next;
        }
        Ok(out)
    }

    /// Write to a sibling temp file, then rename over the store.
    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(snapshot).context("serializing corpus store")?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for JsonFileStore {
    async fn run_exists_for(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.inner.read().await.run_exists_for(date))
    }

    async fn create_run_marker(&self, date: NaiveDate) -> Result<bool> {
        self.commit(|s| {
            let created = s.create_run_marker(date);
            (created, created)
        })
        .await
    }

    async fn article_exists_with_title(&self, title: &str) -> Result<bool> {
        Ok(self.inner.read().await.article_exists_with_title(title))
    }

    async fn insert_article(&self, article: NewArticle) -> Result<VerifiedArticle> {
        self.commit(|s| (s.insert_article(article), true)).await
    }

    async fn random_fake_article(&self) -> Result<Option<VerifiedArticle>> {
        Ok(self.inner.read().await.random_fake_article())
    }

    async fn append_query_log(&self, entry: QueryLog) -> Result<()> {
        self.commit(|s| {
            s.query_logs.push(entry);
            ((), true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(title: &str, is_fake: bool) -> NewArticle {
        NewArticle {
            title: title.into(),
            description: format!("{title} text"),
            source: "test".into(),
            is_fake,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn run_marker_is_created_once_per_day() {
        let store = MemoryStore::new();
        let d = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert!(!store.run_exists_for(d).await.unwrap());
        assert!(store.create_run_marker(d).await.unwrap());
        assert!(!store.create_run_marker(d).await.unwrap());
        assert!(store.run_exists_for(d).await.unwrap());
        assert!(!store.run_exists_for(d.succ_opt().unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn random_fake_only_picks_fakes() {
        let store = MemoryStore::new();
        assert!(store.random_fake_article().await.unwrap().is_none());
        store.insert_article(article("real", false)).await.unwrap();
        store.insert_article(article("fake", true)).await.unwrap();
        for _ in 0..20 {
            let a = store.random_fake_article().await.unwrap().unwrap();
            assert!(a.is_fake);
        }
    }

    #[tokio::test]
    async fn ids_increase() {
        let store = MemoryStore::new();
        let a = store.insert_article(article("a", false)).await.unwrap();
        let b = store.insert_article(article("b", false)).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/corpus.json");
        let d = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.create_run_marker(d).await.unwrap();
            store.insert_article(article("kept", false)).await.unwrap();
        }
        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(store.run_exists_for(d).await.unwrap());
        assert!(store.article_exists_with_title("kept").await.unwrap());
        let next = store.insert_article(article("next", false)).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("state");
        let store = JsonFileStore::open(parent.join("corpus.json")).await.unwrap();
        // a regular file where the store directory should be
        std::fs::write(&parent, b"not a directory").unwrap();
        let d = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

        assert!(store.insert_article(article("PM resigns", false)).await.is_err());
        assert!(!store.article_exists_with_title("PM resigns").await.unwrap());
        assert!(store.create_run_marker(d).await.is_err());
        assert!(!store.run_exists_for(d).await.unwrap());
        let snap = store.snapshot().await;
        assert!(snap.articles.is_empty());
        assert_eq!(snap.next_id, 0);

        std::fs::remove_file(&parent).unwrap();
        let row = store.insert_article(article("PM resigns", false)).await.unwrap();
        assert_eq!(row.id, 1);
        assert!(store.create_run_marker(d).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let store = std::sync::Arc::new(JsonFileStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.insert_article(article(&format!("story {i}"), i % 2 == 0)).await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=16).collect::<Vec<u64>>());

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await.articles.len(), 16);
    }
}
