// src/ingest/corroborate.rs
//! Cross-source corroboration of headlines.
//!
//! An item is *verified* when some item from another source has a title similar
//! enough to its own. Matching is directional: `corroborate(a, b)` only ever returns
//! items of `a`, in their original order, and stops at the first match in `b`.
//!
//! Similarity (default): indel ratio `2 * LCS / (|a| + |b|)` over lower-cased chars,
//! i.e. one minus the normalized insert/delete edit distance. Symmetric, in `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::DEFAULT_SIMILARITY_THRESHOLD;
use crate::ingest::types::NewsItem;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Indel,
    Levenshtein,
    JaroWinkler,
}

impl SimilarityMetric {
    /// Case-insensitive similarity in `[0, 1]`; 1.0 means identical.
    pub fn similarity(self, a: &str, b: &str) -> f64 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        match self {
            SimilarityMetric::Indel => indel_ratio(&a, &b),
            SimilarityMetric::Levenshtein => strsim::normalized_levenshtein(&a, &b),
            SimilarityMetric::JaroWinkler => strsim::jaro_winkler(&a, &b),
        }
    }
}

/// Which sources get verified.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorroborationMode {
    /// Only items of the first (primary) source are kept.
    #[default]
    Directional,
    /// Every source is checked against all others; results are concatenated.
    Symmetric,
}

/// Default title similarity.
pub fn similarity(a: &str, b: &str) -> f64 {
    SimilarityMetric::Indel.similarity(a, b)
}

fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Items scraped from one source during a run.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: String,
    pub items: Vec<NewsItem>,
}

#[derive(Debug, Clone, Copy)]
pub struct Corroborator {
    pub metric: SimilarityMetric,
    pub threshold: f64,
    pub mode: CorroborationMode,
}

impl Default for Corroborator {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::default(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            mode: CorroborationMode::default(),
        }
    }
}

impl Corroborator {
    /// Items of `list_a` whose title reaches the threshold against some title of `list_b`.
    pub fn corroborate(&self, list_a: &[NewsItem], list_b: &[NewsItem]) -> Vec<NewsItem> {
        list_a
            .iter()
            .filter(|a| {
                list_b
                    .iter()
                    .any(|b| self.metric.similarity(&a.title, &b.title) >= self.threshold)
            })
            .cloned()
            .collect()
    }

    /// Apply the configured mode to a run's batches (in scrape order).
    pub fn verify(&self, batches: &[SourceBatch]) -> Vec<NewsItem> {
        if batches.len() < 2 {
            return Vec::new();
        }
        match self.mode {
            CorroborationMode::Directional => {
                let others = items_except(batches, 0);
                self.corroborate(&batches[0].items, &others)
            }
            CorroborationMode::Symmetric => {
                let mut verified = Vec::new();
                for (i, batch) in batches.iter().enumerate() {
                    let others = items_except(batches, i);
                    verified.extend(self.corroborate(&batch.items, &others));
                }
                let mut seen = HashSet::new();
                verified.retain(|it| seen.insert(it.title.clone()));
                verified
            }
        }
    }
}

/// `corroborate` with the default metric and threshold (0.5).
pub fn corroborate(list_a: &[NewsItem], list_b: &[NewsItem]) -> Vec<NewsItem> {
    Corroborator::default().corroborate(list_a, list_b)
}

fn items_except(batches: &[SourceBatch], skip: usize) -> Vec<NewsItem> {
    batches
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .flat_map(|(_, b)| b.items.iter().cloned())
        .collect()
}
