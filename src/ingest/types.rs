// src/ingest/types.rs
use anyhow::Result;

/// One scraped story, as produced by a source adapter.
///
/// Construct through [`NewsItem::new`]: an item with an empty (or whitespace-only)
/// title cannot exist.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub source_url: String,
}

impl NewsItem {
    /// Trims all fields; returns `None` when the title is empty after trimming.
    pub fn new(
        title: impl AsRef<str>,
        summary: impl AsRef<str>,
        source_url: impl AsRef<str>,
    ) -> Option<Self> {
        let title = title.as_ref().trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            summary: summary.as_ref().trim().to_string(),
            source_url: source_url.as_ref().trim().to_string(),
        })
    }
}

/// A news site we can pull today's stories from.
///
/// Implementations keep whatever they managed to collect: an `Err` is reserved for
/// failures before any page was read (e.g. the browser could not be started).
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn produce(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}
