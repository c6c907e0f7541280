// src/retrain.rs
//! Downstream model retraining.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RetrainConfig;

#[async_trait]
pub trait Trainer: Send + Sync {
    /// Retrain on the current corpus. Must tolerate a tiny or unchanged corpus.
    async fn train_model(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Runs an external training command and waits for it.
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandTrainer {
    pub fn new(program: impl Into<String>, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir,
        }
    }
}

#[async_trait]
impl Trainer for CommandTrainer {
    async fn train_model(&self) -> Result<()> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let out = cmd
            .output()
            .await
            .with_context(|| format!("spawning trainer `{}`", self.program))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(500)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            bail!("trainer exited with {}: {}", out.status, tail.trim());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Asks a training service to retrain (`POST url`).
pub struct HttpTrainer {
    http: reqwest::Client,
    url: String,
}

impl HttpTrainer {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30 * 60))
            .build()
            .context("building trainer http client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Trainer for HttpTrainer {
    async fn train_model(&self) -> Result<()> {
        self.http
            .post(&self.url)
            .send()
            .await
            .context("retrain request")?
            .error_for_status()
            .context("retrain status")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Retraining switched off; logs and succeeds.
pub struct DisabledTrainer;

#[async_trait]
impl Trainer for DisabledTrainer {
    async fn train_model(&self) -> Result<()> {
        tracing::info!(target: "retrain", "retraining disabled in config, skipping");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

pub fn build_trainer(cfg: &RetrainConfig) -> Result<Arc<dyn Trainer>> {
    Ok(match cfg {
        RetrainConfig::Disabled => Arc::new(DisabledTrainer),
        RetrainConfig::Command {
            program,
            args,
            working_dir,
        } => Arc::new(CommandTrainer::new(
            program.clone(),
            args.clone(),
            working_dir.clone(),
        )),
        RetrainConfig::Http { url } => Arc::new(HttpTrainer::new(url.clone())?),
    })
}

/// Fired once per completed ingestion run, whatever the run wrote.
#[derive(Clone)]
pub struct RetrainTrigger {
    trainer: Arc<dyn Trainer>,
}

impl RetrainTrigger {
    pub fn new(trainer: Arc<dyn Trainer>) -> Self {
        Self { trainer }
    }

    /// Errors propagate to the run's outer guard; corpus writes are not rolled back.
    pub async fn on_ingest_complete(&self) -> Result<()> {
        let t0 = Instant::now();
        tracing::info!(target: "retrain", trainer = self.trainer.name(), "retraining started");
        counter!("retrain_runs_total").increment(1);

        if let Err(e) = self.trainer.train_model().await {
            counter!("retrain_failures_total").increment(1);
            return Err(e).context("retraining failed");
        }

        tracing::info!(
            target: "retrain",
            trainer = self.trainer.name(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "retraining finished"
        );
        Ok(())
    }
}
