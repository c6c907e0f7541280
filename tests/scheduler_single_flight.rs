// tests/scheduler_single_flight.rs
//
// Concurrency behavior of the daily trigger: one run per day, one run at a time,
// lock released however the run ends.
mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{pipeline, GatedSource, PanickingSource, RecordingTrainer, StaticSource, TrackingRunner};
use news_corroborator::ingest::scheduler::{IngestLock, IngestScheduler, TriggerOutcome};
use news_corroborator::store::{CorpusStore, MemoryStore};
use news_corroborator::NewsSource;
use tokio::sync::Notify;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn scheduler(
    sources: Vec<Arc<dyn NewsSource>>,
    store: Arc<MemoryStore>,
    trainer: Arc<RecordingTrainer>,
    runner: Arc<TrackingRunner>,
) -> IngestScheduler {
    let p = pipeline(sources, store.clone(), trainer);
    IngestScheduler::new(store, IngestLock::new(), runner, Arc::new(p))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_start_exactly_one_run() {
    let gate = Arc::new(Notify::new());
    let store = Arc::new(MemoryStore::new());
    let trainer = Arc::new(RecordingTrainer::default());
    let runner = Arc::new(TrackingRunner::default());
    let sched = scheduler(
        vec![
            GatedSource::new(gate.clone(), &["PM resigns"]),
            StaticSource::ok("b", &["Prime Minister resigns today"]),
        ],
        store.clone(),
        trainer.clone(),
        runner.clone(),
    );

    let mut handles = Vec::new();
    for _ in 0..50 {
        let s = sched.clone();
        handles.push(tokio::spawn(async move { s.trigger_if_needed_on(day(1)).await }));
    }
    let mut outcomes = Vec::new();
    for h in handles {
        outcomes.push(h.await.unwrap());
    }

    let started = outcomes.iter().filter(|o| **o == TriggerOutcome::Started).count();
    assert_eq!(started, 1, "outcomes: {outcomes:?}");
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, TriggerOutcome::Started | TriggerOutcome::InProgress | TriggerOutcome::AlreadyRanToday)));
    assert!(sched.is_running());

    gate.notify_one();
    runner.join_all().await;

    assert!(!sched.is_running());
    assert_eq!(runner.spawned(), 1);
    assert_eq!(runner.failures(), 0);
    assert_eq!(trainer.calls(), 1);
    let snap = store.snapshot().await;
    assert_eq!(snap.runs.len(), 1);
    assert_eq!(snap.articles.len(), 2);

    assert_eq!(
        sched.trigger_if_needed_on(day(1)).await,
        TriggerOutcome::AlreadyRanToday
    );
    assert_eq!(runner.spawned(), 1);
}

#[tokio::test]
async fn existing_marker_spawns_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.create_run_marker(day(2)).await.unwrap();
    let runner = Arc::new(TrackingRunner::default());
    let trainer = Arc::new(RecordingTrainer::default());
    let sched = scheduler(
        vec![StaticSource::ok("a", &["x"]), StaticSource::ok("b", &["x"])],
        store,
        trainer.clone(),
        runner.clone(),
    );

    assert_eq!(
        sched.trigger_if_needed_on(day(2)).await,
        TriggerOutcome::AlreadyRanToday
    );
    assert_eq!(runner.spawned(), 0);
    assert_eq!(trainer.calls(), 0);
}

#[tokio::test]
async fn failed_run_releases_lock_and_still_marks_the_day() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(TrackingRunner::default());
    let trainer = Arc::new(RecordingTrainer::failing());
    let sched = scheduler(
        vec![StaticSource::ok("a", &["x"]), StaticSource::ok("b", &["y"])],
        store.clone(),
        trainer.clone(),
        runner.clone(),
    );

    assert_eq!(sched.trigger_if_needed_on(day(3)).await, TriggerOutcome::Started);
    runner.join_all().await;

    assert_eq!(runner.failures(), 1);
    assert!(!sched.is_running());
    assert!(sched.ran_on(day(3)).await.unwrap());
    assert_eq!(
        sched.trigger_if_needed_on(day(3)).await,
        TriggerOutcome::AlreadyRanToday
    );

    // next day is a fresh attempt
    assert_eq!(sched.trigger_if_needed_on(day(4)).await, TriggerOutcome::Started);
    runner.join_all().await;
    assert_eq!(trainer.calls(), 2);
}

#[tokio::test]
async fn panicking_run_releases_lock() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(TrackingRunner::default());
    let sched = scheduler(
        vec![Arc::new(PanickingSource) as Arc<dyn NewsSource>, StaticSource::ok("b", &["y"])],
        store.clone(),
        Arc::new(RecordingTrainer::default()),
        runner.clone(),
    );

    assert_eq!(sched.trigger_if_needed_on(day(5)).await, TriggerOutcome::Started);
    runner.join_all().await;

    assert_eq!(runner.failures(), 1);
    assert!(!sched.is_running());
    assert!(sched.ran_on(day(5)).await.unwrap());
    assert!(store.snapshot().await.articles.is_empty());
}
