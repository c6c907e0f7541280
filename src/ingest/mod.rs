// src/ingest/mod.rs
pub mod browser;
pub mod corroborate;
pub mod scheduler;
pub mod sources;
pub mod types;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::corpus::{CorpusWriter, WriteReport};
use crate::ingest::browser::BrowserLauncher;
use crate::ingest::corroborate::{Corroborator, SourceBatch};
use crate::ingest::sources::{HeadlineListSource, IncrementalIdSource};
use crate::ingest::types::NewsSource;
use crate::retrain::RetrainTrigger;

/// Upper bound for a purified description.
const MAX_TEXT_CHARS: usize = 20_000;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Ingestion runs started.");
        describe_counter!(
            "ingest_run_failures_total",
            "Ingestion runs that ended with an error."
        );
        describe_counter!(
            "ingest_source_items_total",
            "Items produced per source."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Page/scroll/launch errors per source."
        );
        describe_counter!(
            "ingest_corroborated_total",
            "Items verified by cross-source corroboration."
        );
        describe_counter!("corpus_real_written_total", "Real articles inserted.");
        describe_counter!("corpus_fake_written_total", "Synthetic fake articles inserted.");
        describe_counter!(
            "corpus_duplicates_skipped_total",
            "Verified items skipped because the title is already stored."
        );
        describe_counter!("retrain_runs_total", "Retraining jobs started.");
        describe_counter!("retrain_failures_total", "Retraining jobs that failed.");
        describe_histogram!("ingest_run_ms", "Ingestion run duration in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last finished."
        );
    });
}

/// Purify scraped text: decode entities, strip tags, ASCII quotes, collapse
/// whitespace inside lines, drop empty lines.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace per line, keep paragraph breaks
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[^\S\n]+").unwrap());
    out = out
        .lines()
        .map(|l| re_ws.replace_all(l, " ").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// (source name, items produced), in scrape order
    pub scraped: Vec<(String, usize)>,
    pub verified: usize,
    pub written: WriteReport,
}

/// Scrape → corroborate → write → retrain.
pub struct IngestPipeline {
    sources: Vec<Arc<dyn NewsSource>>,
    corroborator: Corroborator,
    writer: CorpusWriter,
    retrain: RetrainTrigger,
}

impl IngestPipeline {
    /// `sources[0]` is the primary source for directional corroboration.
    pub fn new(
        sources: Vec<Arc<dyn NewsSource>>,
        corroborator: Corroborator,
        writer: CorpusWriter,
        retrain: RetrainTrigger,
    ) -> Self {
        Self {
            sources,
            corroborator,
            writer,
            retrain,
        }
    }

    /// Headline-list source first, then the incremental-ID source.
    pub fn from_config(
        cfg: &PipelineConfig,
        browser: Arc<dyn BrowserLauncher>,
        writer: CorpusWriter,
        retrain: RetrainTrigger,
    ) -> Result<Self> {
        let headline = HeadlineListSource::new(
            cfg.sources.headline_list.clone(),
            cfg.max_items,
            browser.clone(),
        )
        .context("configuring headline-list source")?;
        let incremental = IncrementalIdSource::new(
            cfg.sources.incremental_id.clone(),
            cfg.max_items,
            browser,
        )
        .context("configuring incremental-id source")?;

        let corroborator = Corroborator {
            metric: cfg.corroboration.metric,
            threshold: cfg.corroboration.threshold,
            mode: cfg.corroboration.mode,
        };
        Ok(Self::new(
            vec![Arc::new(headline), Arc::new(incremental)],
            corroborator,
            writer,
            retrain,
        ))
    }

    /// Sources run one after another; a failing source contributes an empty batch.
    pub async fn scrape_all(&self) -> Vec<SourceBatch> {
        let mut batches = Vec::with_capacity(self.sources.len());
        for src in &self.sources {
            let name = src.name().to_string();
            let items = match src.produce().await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, source = %name, "source failed");
                    counter!("ingest_source_errors_total", "source" => name.clone()).increment(1);
                    Vec::new()
                }
            };
            counter!("ingest_source_items_total", "source" => name.clone())
                .increment(items.len() as u64);
            batches.push(SourceBatch {
                source: name,
                items,
            });
        }
        batches
    }

    pub async fn run(&self) -> Result<RunReport> {
        ensure_metrics_described();
        let t0 = Instant::now();

        let batches = self.scrape_all().await;
        let scraped: Vec<(String, usize)> = batches
            .iter()
            .map(|b| (b.source.clone(), b.items.len()))
            .collect();
        tracing::info!(
            target: "ingest",
            threshold = self.corroborator.threshold,
            mode = ?self.corroborator.mode,
            ?scraped,
            "starting cross-validation"
        );

        let verified = self.corroborator.verify(&batches);
        counter!("ingest_corroborated_total").increment(verified.len() as u64);
        tracing::info!(target: "ingest", verified = verified.len(), "cross-validation complete");

        let written = self.writer.write_verified(&verified).await?;
        self.retrain.on_ingest_complete().await?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_run_ms").record(ms);
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        Ok(RunReport {
            scraped,
            verified: verified.len(),
            written,
        })
    }
}
