// src/ingest/sources/incremental_id.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use scraper::{Html, Selector};
use std::sync::Arc;

use super::{element_text, pause, selector};
use crate::config::IncrementalIdConfig;
use crate::ingest::browser::{BrowserError, BrowserLauncher, BrowserSession};
use crate::ingest::types::{NewsItem, NewsSource};

/// Site whose stories live at sequential numeric IDs: find the newest ID, then walk a
/// fixed window of IDs downwards, one page per story.
pub struct IncrementalIdSource {
    cfg: IncrementalIdConfig,
    max_items: usize,
    browser: Arc<dyn BrowserLauncher>,
    latest_link: Selector,
    title: Selector,
    body: Selector,
}

impl IncrementalIdSource {
    pub fn new(
        cfg: IncrementalIdConfig,
        max_items: usize,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        Ok(Self {
            latest_link: selector(&cfg.latest_link_selector)?,
            title: selector(&cfg.title_selector)?,
            body: selector(&cfg.body_selector)?,
            cfg,
            max_items,
            browser,
        })
    }

    pub fn story_url(&self, id: u64) -> String {
        self.cfg.story_url_template.replace("{id}", &id.to_string())
    }

    async fn collect(&self, session: &dyn BrowserSession) -> Vec<NewsItem> {
        let latest = self.discover_latest_id(session).await;
        let window = story_window(latest, self.max_items);
        tracing::info!(
            target: "ingest",
            source = %self.cfg.name,
            latest,
            oldest = window.last().copied().unwrap_or(latest),
            "fetching story window"
        );

        let mut items = Vec::new();
        for id in window {
            let url = self.story_url(id);
            match self.fetch_story(session, &url).await {
                Ok(Some(item)) => {
                    items.push(item);
                    if items.len() % 5 == 0 {
                        tracing::info!(target: "ingest", source = %self.cfg.name, collected = items.len(), "progress");
                    }
                }
                Ok(None) => {
                    tracing::debug!(target: "ingest", source = %self.cfg.name, %url, "no heading, skipping");
                }
                Err(e) => {
                    counter!("ingest_source_errors_total", "source" => self.cfg.name.clone())
                        .increment(1);
                    tracing::warn!(target: "ingest", source = %self.cfg.name, %url, error = %e, "story fetch failed");
                    if e.is_session_lost() {
                        tracing::warn!(target: "ingest", source = %self.cfg.name, "browser session lost, aborting window");
                        break;
                    }
                }
            }
            pause(self.cfg.page_delay_ms).await;
        }
        items
    }

    async fn discover_latest_id(&self, session: &dyn BrowserSession) -> u64 {
        let found = async {
            session.goto(&self.cfg.home_url).await?;
            pause(self.cfg.settle_delay_ms).await;
            let html = session.page_source().await?;
            Ok::<_, BrowserError>(self.parse_latest_id(&html))
        }
        .await;

        match found {
            Ok(Some(id)) => {
                tracing::info!(target: "ingest", source = %self.cfg.name, id, "latest story id");
                id
            }
            Ok(None) => {
                tracing::warn!(target: "ingest", source = %self.cfg.name, default = self.cfg.default_latest_id, "latest story link not found, using default id");
                self.cfg.default_latest_id
            }
            Err(e) => {
                tracing::warn!(target: "ingest", source = %self.cfg.name, error = %e, default = self.cfg.default_latest_id, "could not load home page, using default id");
                self.cfg.default_latest_id
            }
        }
    }

    /// First numeric path segment of the first breaking-news link
    /// (`/story/469175/` or an absolute URL).
    pub fn parse_latest_id(&self, html: &str) -> Option<u64> {
        let doc = Html::parse_document(html);
        let href = doc
            .select(&self.latest_link)
            .next()?
            .value()
            .attr("href")?
            .to_string();
        href.split('/')
            .filter(|s| !s.is_empty())
            .find_map(|s| s.parse::<u64>().ok())
    }

    async fn fetch_story(
        &self,
        session: &dyn BrowserSession,
        url: &str,
    ) -> Result<Option<NewsItem>, BrowserError> {
        session.goto(url).await?;
        let html = session.page_source().await?;
        Ok(self.parse_story(&html, url))
    }

    /// Heading plus all body paragraphs joined by newlines; `None` without a heading.
    pub fn parse_story(&self, html: &str, url: &str) -> Option<NewsItem> {
        let doc = Html::parse_document(html);
        let heading = element_text(doc.select(&self.title).next()?);
        let body = doc
            .select(&self.body)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        NewsItem::new(heading, body, url)
    }
}

/// `size` IDs counting down from `latest` (stops at 0).
pub fn story_window(latest: u64, size: usize) -> Vec<u64> {
    (0..size as u64)
        .filter_map(|k| latest.checked_sub(k))
        .collect()
}

#[async_trait]
impl NewsSource for IncrementalIdSource {
    async fn produce(&self) -> Result<Vec<NewsItem>> {
        tracing::info!(target: "ingest", source = %self.cfg.name, "starting incremental-id scrape");
        let session = self
            .browser
            .launch()
            .await
            .with_context(|| format!("{}: launching browser", self.cfg.name))?;

        let items = self.collect(session.as_ref()).await;

        if let Err(e) = session.quit().await {
            tracing::warn!(target: "ingest", source = %self.cfg.name, error = %e, "closing browser failed");
        }
        tracing::info!(target: "ingest", source = %self.cfg.name, collected = items.len(), "incremental-id scrape finished");
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.cfg.name
    }
}
