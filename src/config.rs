// src/config.rs
//! Pipeline configuration (`config/pipeline.toml`).
//!
//! Every key is optional; a missing file yields the built-in defaults, which mirror
//! the production sources and constants.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::corroborate::{CorroborationMode, SimilarityMetric};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_WEBDRIVER_URL: &str = "WEBDRIVER_URL";
pub const ENV_CORPUS_STORE_PATH: &str = "CORPUS_STORE_PATH";

/// Per-source ceiling shared by both adapters.
pub const MAX_ITEMS_PER_SOURCE: usize = 30;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_items: usize,
    pub corroboration: CorroborationConfig,
    pub browser: BrowserConfig,
    pub sources: SourcesConfig,
    pub store: StoreConfig,
    pub scoring: ScoringConfig,
    pub retrain: RetrainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS_PER_SOURCE,
            corroboration: CorroborationConfig::default(),
            browser: BrowserConfig::default(),
            sources: SourcesConfig::default(),
            store: StoreConfig::default(),
            scoring: ScoringConfig::default(),
            retrain: RetrainConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorroborationConfig {
    pub threshold: f64,
    pub metric: SimilarityMetric,
    pub mode: CorroborationMode,
}

impl Default for CorroborationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            metric: SimilarityMetric::default(),
            mode: CorroborationMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// chromedriver / selenium endpoint
    pub webdriver_url: String,
    pub headless: bool,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            headless: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub headline_list: HeadlineListConfig,
    pub incremental_id: IncrementalIdConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlineListConfig {
    pub name: String,
    pub url: String,
    pub heading_selector: String,
    pub summary_selector: String,
    pub settle_delay_ms: u64,
    pub scroll_delay_ms: u64,
}

impl Default for HeadlineListConfig {
    fn default() -> Self {
        Self {
            name: "kantipur".to_string(),
            url: "https://ekantipur.com/news".to_string(),
            heading_selector: "h2".to_string(),
            summary_selector: "p".to_string(),
            settle_delay_ms: 3_000,
            scroll_delay_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalIdConfig {
    pub name: String,
    pub home_url: String,
    pub latest_link_selector: String,
    /// Must contain `{id}`.
    pub story_url_template: String,
    pub title_selector: String,
    pub body_selector: String,
    pub default_latest_id: u64,
    pub settle_delay_ms: u64,
    pub page_delay_ms: u64,
}

impl Default for IncrementalIdConfig {
    fn default() -> Self {
        Self {
            name: "annapurna".to_string(),
            home_url: "https://www.annapurnapost.com/".to_string(),
            latest_link_selector: "div.breaking__news a".to_string(),
            story_url_template: "https://www.annapurnapost.com/story/{id}/".to_string(),
            title_selector: "h1.news__title".to_string(),
            body_selector: "div.news__details p".to_string(),
            default_latest_id: 469_175,
            settle_delay_ms: 2_000,
            page_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/corpus.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Model service; `None` leaves purification local and scoring unavailable.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrainConfig {
    #[default]
    Disabled,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
    Http {
        url: String,
    },
}

impl PipelineConfig {
    /// Load from an explicit TOML path, then apply env overrides and validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        cfg.finish()
    }

    /// Resolve the config file:
    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_PIPELINE_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Self::default().finish()
    }

    fn finish(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(ENV_WEBDRIVER_URL) {
            if !url.trim().is_empty() {
                self.browser.webdriver_url = url.trim().to_string();
            }
        }
        if let Ok(p) = std::env::var(ENV_CORPUS_STORE_PATH) {
            if !p.trim().is_empty() {
                self.store.path = PathBuf::from(p.trim());
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&mut self) -> Result<()> {
        if self.max_items == 0 {
            bail!("max_items must be at least 1");
        }
        let t = self.corroboration.threshold;
        self.corroboration.threshold = if t.is_finite() {
            t.clamp(0.0, 1.0)
        } else {
            DEFAULT_SIMILARITY_THRESHOLD
        };
        if !self.sources.incremental_id.story_url_template.contains("{id}") {
            bail!("sources.incremental_id.story_url_template must contain {{id}}");
        }
        Ok(())
    }
}
