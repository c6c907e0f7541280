// src/ingest/scheduler.rs
//! Single-flight daily scheduling.
//!
//! `trigger_if_needed` is called from request handlers. It never waits for a run and
//! never fails: at most one run is active per process (the [`IngestLock`]), and at most
//! one run starts per calendar day (the store's run marker, created before scraping).
//!
//! The lock is process-local. Several processes or hosts sharing a store need an
//! external lock or a single designated worker.

use anyhow::Context;
use chrono::{Local, NaiveDate};
use metrics::counter;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ingest::IngestPipeline;
use crate::store::CorpusStore;

pub type BoxTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Non-blocking exclusive lock guarding ingestion. Create one at startup and share
/// clones with whoever triggers runs.
#[derive(Clone, Default)]
pub struct IngestLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the whole run; dropping it (on any exit path) releases the lock.
pub struct IngestPermit {
    _guard: OwnedMutexGuard<()>,
}

impl IngestLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if a run already holds the lock. Never waits.
    pub fn try_acquire(&self) -> Option<IngestPermit> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| IngestPermit { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Fire-and-forget execution. Implementations must log a task's error or panic and
/// must never hand it back to the caller of `spawn`.
pub trait TaskRunner: Send + Sync {
    fn spawn(&self, name: &'static str, task: BoxTask);
}

/// Runs tasks on the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskRunner;

impl TaskRunner for TokioTaskRunner {
    fn spawn(&self, name: &'static str, task: BoxTask) {
        let handle = tokio::spawn(task);
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {
                    tracing::debug!(target: "scheduler", task = name, "background task finished")
                }
                Ok(Err(e)) => {
                    tracing::error!(target: "scheduler", task = name, error = ?e, "background task failed")
                }
                Err(e) => {
                    tracing::error!(target: "scheduler", task = name, error = %e, "background task panicked")
                }
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run marker for today exists.
    AlreadyRanToday,
    /// Another run holds the lock.
    InProgress,
    /// A background run was handed to the task runner.
    Started,
    /// The store could not be queried; nothing was started.
    CheckFailed,
}

#[derive(Clone)]
pub struct IngestScheduler {
    store: Arc<dyn CorpusStore>,
    lock: IngestLock,
    runner: Arc<dyn TaskRunner>,
    pipeline: Arc<IngestPipeline>,
}

impl IngestScheduler {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        lock: IngestLock,
        runner: Arc<dyn TaskRunner>,
        pipeline: Arc<IngestPipeline>,
    ) -> Self {
        Self {
            store,
            lock,
            runner,
            pipeline,
        }
    }

    /// Start today's run in the background unless it ran or is running.
    pub async fn trigger_if_needed(&self) -> TriggerOutcome {
        self.trigger_if_needed_on(Local::now().date_naive()).await
    }

    pub async fn trigger_if_needed_on(&self, today: NaiveDate) -> TriggerOutcome {
        match self.store.run_exists_for(today).await {
            Ok(true) => return TriggerOutcome::AlreadyRanToday,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(target: "scheduler", error = ?e, "run marker lookup failed");
                return TriggerOutcome::CheckFailed;
            }
        }

        let Some(permit) = self.lock.try_acquire() else {
            tracing::debug!(target: "scheduler", "ingestion already in progress");
            return TriggerOutcome::InProgress;
        };

        let store = self.store.clone();
        let pipeline = self.pipeline.clone();
        self.runner.spawn(
            "daily-ingest",
            Box::pin(async move {
                let _permit = permit;
                run_for_day(store.as_ref(), &pipeline, today).await
            }),
        );
        TriggerOutcome::Started
    }

    pub fn is_running(&self) -> bool {
        self.lock.is_held()
    }

    pub async fn ran_on(&self, date: NaiveDate) -> anyhow::Result<bool> {
        self.store.run_exists_for(date).await
    }
}

/// Marker first, so a crash mid-run still blocks re-entry for the rest of the day.
async fn run_for_day(
    store: &dyn CorpusStore,
    pipeline: &IngestPipeline,
    today: NaiveDate,
) -> anyhow::Result<()> {
    if !store
        .create_run_marker(today)
        .await
        .context("creating run marker")?
    {
        tracing::info!(target: "scheduler", %today, "run marker already present, skipping");
        return Ok(());
    }

    counter!("ingest_runs_total").increment(1);
    tracing::info!(target: "scheduler", %today, "daily ingestion started");

    match pipeline.run().await {
        Ok(report) => {
            tracing::info!(
                target: "scheduler",
                %today,
                scraped = ?report.scraped,
                verified = report.verified,
                real = report.written.real_written,
                fake = report.written.fake_written,
                duplicates = report.written.duplicates_skipped,
                "daily ingestion finished"
            );
            Ok(())
        }
        Err(e) => {
            counter!("ingest_run_failures_total").increment(1);
            Err(e.context(format!("ingestion run for {today}")))
        }
    }
}
