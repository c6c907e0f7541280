// src/scoring.rs
//! Authenticity scoring capability and the query-log sink.
//!
//! The model itself lives behind an HTTP endpoint; this crate only cleans text,
//! forwards it, and maps the returned probability onto a human label.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::ScoringConfig;
use crate::ingest::normalize_text;
use crate::store::{CorpusStore, QueryLog};

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Text cleanup applied before anything is persisted.
    fn purify(&self, text: &str) -> String;
    /// Probability in `[0, 1]` that `text` is authentic.
    async fn score(&self, text: &str) -> Result<f32>;
}

/// Client for the model service (`POST {endpoint}` with `{"text": ...}` →
/// `{"score": f32}`). Without an endpoint it still purifies, but cannot score.
pub struct ModelClient {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl ModelClient {
    pub fn from_config(cfg: &ScoringConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-corroborator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building scoring http client")?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone().filter(|e| !e.trim().is_empty()),
        })
    }
}

#[async_trait]
impl Scorer for ModelClient {
    fn purify(&self, text: &str) -> String {
        normalize_text(text)
    }

    async fn score(&self, text: &str) -> Result<f32> {
        #[derive(Deserialize)]
        struct Resp {
            score: f32,
        }

        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("scoring endpoint not configured"))?;
        let resp: Resp = self
            .http
            .post(endpoint)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("scoring request")?
            .error_for_status()
            .context("scoring status")?
            .json()
            .await
            .context("scoring response body")?;

        if !resp.score.is_finite() {
            return Err(anyhow!("model returned a non-finite score"));
        }
        Ok(resp.score.clamp(0.0, 1.0))
    }
}

/// Label bands over the score as a percentage (upper bounds exclusive).
const LABEL_BANDS: [(f32, &str); 4] = [
    (10.0, "Unauthentic"),
    (30.0, "Likely Unauthentic"),
    (60.0, "Possibly Unauthentic"),
    (95.0, "Likely Authentic"),
];

pub fn label_for(score: f32) -> &'static str {
    let pct = score.clamp(0.0, 1.0) * 100.0;
    LABEL_BANDS
        .iter()
        .find(|(upper, _)| pct < *upper)
        .map(|(_, label)| *label)
        .unwrap_or("Authentic")
}

/// SHA-256 hex of the requester identity.
pub fn anon_hash(identity: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(identity.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub score: f32,
    pub label: String,
}

/// Score `query` and append the anonymized log row.
pub async fn check_and_log(
    scorer: &dyn Scorer,
    store: &dyn CorpusStore,
    identity: &str,
    query: &str,
) -> Result<Verdict> {
    let input = scorer.purify(query);
    let score = scorer.score(&input).await?;
    let label = label_for(score).to_string();

    store
        .append_query_log(QueryLog {
            user_hash: anon_hash(identity),
            query_text: query.to_string(),
            prediction_score: score,
            prediction_label: label.clone(),
            explainability: json!({ "input_length": input.chars().count() }),
            timestamp: Utc::now(),
        })
        .await
        .context("appending query log")?;

    Ok(Verdict { score, label })
}
