// src/ingest/sources/mod.rs
//! Browser-driven news sources.
//!
//! Both adapters follow the same discipline: the browser is launched once per
//! `produce()`, the collecting loop never returns an error (it logs and keeps what it
//! has), and the session is quit before returning.

pub mod headline_list;
pub mod incremental_id;

use anyhow::{anyhow, Result};
use scraper::Selector;
use std::time::Duration;

pub use headline_list::HeadlineListSource;
pub use incremental_id::IncrementalIdSource;

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid CSS selector `{css}`: {e}"))
}

/// Fixed pacing between page actions (no-op for 0).
pub(crate) async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Visible text of an element, whitespace-collapsed.
pub(crate) fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
