// src/telemetry.rs
//! Prometheus exposition for the `metrics` facade used across the pipeline.

use anyhow::{Context, Result};
use axum::{http::header, response::IntoResponse, routing::get, Router};
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;

/// Used when `RUST_LOG` is unset. Pipeline stages log under explicit targets, so each
/// one is listed next to the crate's own module path.
pub const DEFAULT_LOG_FILTER: &str =
    "news_corroborator=info,scheduler=info,ingest=info,corpus=info,retrain=info,api=info,warn";

/// `RUST_LOG` if set and valid, else [`DEFAULT_LOG_FILTER`].
pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish the effective pipeline limits.
    /// Call once per process.
    pub fn install(cfg: &PipelineConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        crate::ingest::ensure_metrics_described();
        describe_gauge!("ingest_max_items_per_source", "Configured per-source item ceiling.");
        describe_gauge!("corroboration_threshold", "Configured title similarity threshold.");
        gauge!("ingest_max_items_per_source").set(cfg.max_items as f64);
        gauge!("corroboration_threshold").set(cfg.corroboration.threshold);

        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let body = handle.render();
                async move { ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response() }
            }),
        )
    }
}
