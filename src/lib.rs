// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod corpus;
pub mod ingest;
pub mod retrain;
pub mod scoring;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::ingest::corroborate::corroborate;
pub use crate::ingest::scheduler::{IngestScheduler, TriggerOutcome};
pub use crate::ingest::types::{NewsItem, NewsSource};

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::api::AppState;
use crate::config::PipelineConfig;
use crate::corpus::CorpusWriter;
use crate::ingest::browser::WebDriverLauncher;
use crate::ingest::scheduler::{IngestLock, TokioTaskRunner};
use crate::ingest::IngestPipeline;
use crate::retrain::{build_trainer, RetrainTrigger};
use crate::scoring::{ModelClient, Scorer};
use crate::store::{CorpusStore, JsonFileStore};

/// Wire the production pipeline from config and return the HTTP router
/// (API + `/metrics`). Installs the global metrics recorder.
pub async fn build_app(cfg: &PipelineConfig) -> Result<axum::Router> {
    let store: Arc<dyn CorpusStore> = Arc::new(JsonFileStore::open(&cfg.store.path).await?);
    let scorer: Arc<dyn Scorer> = Arc::new(ModelClient::from_config(&cfg.scoring)?);
    let browser = Arc::new(WebDriverLauncher::new(
        &cfg.browser.webdriver_url,
        cfg.browser.headless,
        &cfg.browser.extra_args,
    )?);

    let pipeline = IngestPipeline::from_config(
        cfg,
        browser,
        CorpusWriter::new(store.clone(), scorer.clone()),
        RetrainTrigger::new(build_trainer(&cfg.retrain)?),
    )?;

    let scheduler = IngestScheduler::new(
        store.clone(),
        IngestLock::new(),
        Arc::new(TokioTaskRunner),
        Arc::new(pipeline),
    );

    let metrics = telemetry::Metrics::install(cfg)?;
    info!(
        webdriver = %cfg.browser.webdriver_url,
        store = %cfg.store.path.display(),
        max_items = cfg.max_items,
        "pipeline wired"
    );

    let state = AppState {
        scheduler,
        scorer,
        store,
    };
    Ok(api::router(state).merge(metrics.router()))
}
