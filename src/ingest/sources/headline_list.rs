// src/ingest/sources/headline_list.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;

use super::{element_text, pause, selector};
use crate::config::HeadlineListConfig;
use crate::ingest::browser::{
    scroll_height, scroll_to_bottom, BrowserError, BrowserLauncher, BrowserSession,
};
use crate::ingest::types::{NewsItem, NewsSource};

/// Non-fatal iteration errors in a row before the scroll loop gives up.
const MAX_CONSECUTIVE_ERRORS: usize = 3;
/// Upper bound on scroll passes for pages that keep growing without new headings.
const MAX_SCROLL_PASSES: usize = 60;

/// Infinite-scroll listing page: scroll, re-parse the whole page, pair each heading
/// with the paragraph at the same position.
pub struct HeadlineListSource {
    cfg: HeadlineListConfig,
    max_items: usize,
    browser: Arc<dyn BrowserLauncher>,
    base_url: Url,
    heading: Selector,
    summary: Selector,
    anchor: Selector,
}

enum ScrollStep {
    Grew { added: usize },
    Bottom,
}

impl HeadlineListSource {
    pub fn new(
        cfg: HeadlineListConfig,
        max_items: usize,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        let base_url = Url::parse(&cfg.url)
            .with_context(|| format!("{}: invalid listing url {}", cfg.name, cfg.url))?;
        Ok(Self {
            heading: selector(&cfg.heading_selector)?,
            summary: selector(&cfg.summary_selector)?,
            anchor: selector("a[href]")?,
            base_url,
            cfg,
            max_items,
            browser,
        })
    }

    async fn collect(&self, session: &dyn BrowserSession) -> Vec<NewsItem> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();

        if let Err(e) = session.goto(&self.cfg.url).await {
            self.log_error(&e, "opening listing page failed");
            return items;
        }
        pause(self.cfg.settle_delay_ms).await;

        let mut last_height = match scroll_height(session).await {
            Ok(h) => h,
            Err(e) => {
                self.log_error(&e, "reading page height failed");
                return items;
            }
        };

        let mut errors_in_row = 0usize;
        let mut passes = 0usize;
        while items.len() < self.max_items && passes < MAX_SCROLL_PASSES {
            passes += 1;
            match self
                .scroll_pass(session, &mut last_height, &mut seen, &mut items)
                .await
            {
                Ok(ScrollStep::Grew { added }) => {
                    errors_in_row = 0;
                    tracing::info!(
                        target: "ingest",
                        source = %self.cfg.name,
                        added,
                        total = items.len(),
                        max = self.max_items,
                        "parsed listing page"
                    );
                }
                Ok(ScrollStep::Bottom) => {
                    tracing::info!(target: "ingest", source = %self.cfg.name, "reached bottom of page");
                    break;
                }
                Err(e) => {
                    self.log_error(&e, "scroll pass failed");
                    if e.is_session_lost() {
                        break;
                    }
                    errors_in_row += 1;
                    if errors_in_row >= MAX_CONSECUTIVE_ERRORS {
                        break;
                    }
                }
            }
        }

        items
    }

    async fn scroll_pass(
        &self,
        session: &dyn BrowserSession,
        last_height: &mut u64,
        seen: &mut HashSet<String>,
        items: &mut Vec<NewsItem>,
    ) -> Result<ScrollStep, BrowserError> {
        scroll_to_bottom(session).await?;
        pause(self.cfg.scroll_delay_ms).await;

        let new_height = scroll_height(session).await?;
        if new_height == *last_height {
            return Ok(ScrollStep::Bottom);
        }
        *last_height = new_height;

        let html = session.page_source().await?;
        let mut added = 0;
        for item in self.extract(&html) {
            if items.len() >= self.max_items {
                break;
            }
            if seen.insert(item.title.clone()) {
                items.push(item);
                added += 1;
            }
        }
        Ok(ScrollStep::Grew { added })
    }

    /// Pair the n-th heading with the n-th summary paragraph.
    pub fn extract(&self, html: &str) -> Vec<NewsItem> {
        let doc = Html::parse_document(html);
        doc.select(&self.heading)
            .zip(doc.select(&self.summary))
            .filter_map(|(h, p)| {
                let link = h
                    .select(&self.anchor)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| self.base_url.join(href).ok())
                    .unwrap_or_else(|| self.base_url.clone());
                NewsItem::new(element_text(h), element_text(p), link.as_str())
            })
            .collect()
    }

    fn log_error(&self, e: &BrowserError, what: &str) {
        counter!("ingest_source_errors_total", "source" => self.cfg.name.clone()).increment(1);
        tracing::warn!(target: "ingest", source = %self.cfg.name, error = %e, "{what}");
    }
}

#[async_trait]
impl NewsSource for HeadlineListSource {
    async fn produce(&self) -> Result<Vec<NewsItem>> {
        tracing::info!(target: "ingest", source = %self.cfg.name, url = %self.cfg.url, "starting headline-list scrape");
        let session = self
            .browser
            .launch()
            .await
            .with_context(|| format!("{}: launching browser", self.cfg.name))?;

        let items = self.collect(session.as_ref()).await;

        if let Err(e) = session.quit().await {
            tracing::warn!(target: "ingest", source = %self.cfg.name, error = %e, "closing browser failed");
        }
        tracing::info!(target: "ingest", source = %self.cfg.name, collected = items.len(), "headline-list scrape finished");
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.cfg.name
    }
}
