// src/corpus.rs
//! Corpus writer: persists verified items and keeps real/fake classes balanced.
//!
//! Every real article inserted here is followed by exactly one synthetic fake in the
//! same pass. The fake reuses the text of one stored fake article, picked once per pass.

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use serde_json::json;
use std::sync::Arc;

use crate::ingest::types::NewsItem;
use crate::scoring::Scorer;
use crate::store::{CorpusStore, NewArticle};

pub const FAKE_TITLE_PREFIX: &str = "Fake: ";
pub const FAKE_SOURCE: &str = "Generated-Fake";
pub const FAKE_PLACEHOLDER_TEXT: &str = "Fake news placeholder";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub real_written: usize,
    pub fake_written: usize,
    pub duplicates_skipped: usize,
}

#[derive(Clone)]
pub struct CorpusWriter {
    store: Arc<dyn CorpusStore>,
    scorer: Arc<dyn Scorer>,
}

impl CorpusWriter {
    pub fn new(store: Arc<dyn CorpusStore>, scorer: Arc<dyn Scorer>) -> Self {
        Self { store, scorer }
    }

    pub async fn write_verified(&self, items: &[NewsItem]) -> Result<WriteReport> {
        let mut report = WriteReport::default();
        if items.is_empty() {
            return Ok(report);
        }

        let fake_text = self
            .store
            .random_fake_article()
            .await
            .context("sampling stored fake article")?
            .map(|a| a.description)
            .unwrap_or_else(|| FAKE_PLACEHOLDER_TEXT.to_string());

        for item in items {
            if self
                .store
                .article_exists_with_title(&item.title)
                .await
                .context("title lookup")?
            {
                report.duplicates_skipped += 1;
                counter!("corpus_duplicates_skipped_total").increment(1);
                tracing::debug!(target: "corpus", title = %item.title, "already stored, skipping");
                continue;
            }

            self.store
                .insert_article(NewArticle {
                    title: item.title.clone(),
                    description: self.scorer.purify(&item.summary),
                    source: item.source_url.clone(),
                    is_fake: false,
                    metadata: json!({
                        "original_url": item.source_url,
                        "scraped_at": Utc::now().to_rfc3339(),
                    }),
                })
                .await
                .with_context(|| format!("inserting real article {:?}", item.title))?;
            report.real_written += 1;
            counter!("corpus_real_written_total").increment(1);

            self.store
                .insert_article(NewArticle {
                    title: format!("{FAKE_TITLE_PREFIX}{}", item.title),
                    description: fake_text.clone(),
                    source: FAKE_SOURCE.to_string(),
                    is_fake: true,
                    metadata: json!({ "paired_title": item.title }),
                })
                .await
                .with_context(|| format!("inserting paired fake for {:?}", item.title))?;
            report.fake_written += 1;
            counter!("corpus_fake_written_total").increment(1);
        }

        tracing::info!(
            target: "corpus",
            real = report.real_written,
            fake = report.fake_written,
            duplicates = report.duplicates_skipped,
            "corpus write finished"
        );
        Ok(report)
    }
}
