//! News corroborator service: binary entrypoint.
//! Boots the Axum server; the daily ingestion starts lazily from incoming requests.

use news_corroborator::config::PipelineConfig;
use news_corroborator::telemetry::log_filter;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*};

/// Compact logs filtered by `RUST_LOG`. A subscriber installed by the host runtime wins.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(log_filter())
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = PipelineConfig::load_default()?;
    let router = news_corroborator::build_app(&cfg).await?;

    Ok(router.into())
}
