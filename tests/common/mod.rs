// tests/common/mod.rs
//
// Test doubles shared by the integration tests: a scripted browser, static sources,
// a recording trainer, a fixed scorer and a task runner whose tasks can be awaited.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use news_corroborator::corpus::CorpusWriter;
use news_corroborator::ingest::browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession,
};
use news_corroborator::ingest::corroborate::Corroborator;
use news_corroborator::ingest::scheduler::{BoxTask, TaskRunner};
use news_corroborator::ingest::types::{NewsItem, NewsSource};
use news_corroborator::ingest::{normalize_text, IngestPipeline};
use news_corroborator::retrain::{RetrainTrigger, Trainer};
use news_corroborator::scoring::Scorer;
use news_corroborator::store::CorpusStore;

// ------------------------------------------------------------
// Scripted browser
// ------------------------------------------------------------

enum Page {
    /// Successive `page_source` calls walk the list; the last one sticks.
    Html(VecDeque<String>),
    Error(String),
    Crash,
}

#[derive(Default)]
struct Script {
    pages: Mutex<HashMap<String, Page>>,
    heights: Mutex<VecDeque<Option<u64>>>,
    current: Mutex<Option<String>>,
    visited: Mutex<Vec<String>>,
    lost: AtomicBool,
    launches: AtomicUsize,
    quits: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    script: Arc<Script>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.pages(url, &[html])
    }

    pub fn pages(self, url: &str, htmls: &[&str]) -> Self {
        let seq = htmls.iter().map(|s| s.to_string()).collect();
        self.script
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Page::Html(seq));
        self
    }

    pub fn failing(self, url: &str, message: &str) -> Self {
        self.script
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Page::Error(message.to_string()));
        self
    }

    pub fn crashing(self, url: &str) -> Self {
        self.script
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Page::Crash);
        self
    }

    /// Values returned by successive scrollHeight reads; the last one sticks.
    pub fn heights(self, hs: &[u64]) -> Self {
        let reads: Vec<Option<u64>> = hs.iter().copied().map(Some).collect();
        self.height_reads(&reads)
    }

    /// Like `heights`, but `None` makes that read fail with a script error.
    pub fn height_reads(self, reads: &[Option<u64>]) -> Self {
        *self.script.heights.lock().unwrap() = reads.iter().copied().collect();
        self
    }

    pub fn launches(&self) -> usize {
        self.script.launches.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.script.quits.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.script.visited.lock().unwrap().clone()
    }
}

fn session_lost() -> BrowserError {
    BrowserError::WebDriver {
        error: "invalid session id".into(),
        message: "session deleted because of page crash".into(),
    }
}

struct ScriptedSession {
    script: Arc<Script>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        if self.script.lost.load(Ordering::SeqCst) {
            return Err(session_lost());
        }
        self.script.visited.lock().unwrap().push(url.to_string());
        let pages = self.script.pages.lock().unwrap();
        match pages.get(url) {
            Some(Page::Error(msg)) => Err(BrowserError::WebDriver {
                error: "timeout".into(),
                message: msg.clone(),
            }),
            Some(Page::Crash) => {
                self.script.lost.store(true, Ordering::SeqCst);
                Err(session_lost())
            }
            _ => {
                *self.script.current.lock().unwrap() = Some(url.to_string());
                Ok(())
            }
        }
    }

    async fn page_source(&self) -> BrowserResult<String> {
        if self.script.lost.load(Ordering::SeqCst) {
            return Err(session_lost());
        }
        let current = self.script.current.lock().unwrap().clone();
        let mut pages = self.script.pages.lock().unwrap();
        let html = match current.as_deref().and_then(|u| pages.get_mut(u)) {
            Some(Page::Html(seq)) => {
                if seq.len() > 1 {
                    seq.pop_front().unwrap_or_default()
                } else {
                    seq.front().cloned().unwrap_or_default()
                }
            }
            _ => "<html><body>Not found</body></html>".to_string(),
        };
        Ok(html)
    }

    async fn execute(&self, script: &str) -> BrowserResult<Value> {
        if self.script.lost.load(Ordering::SeqCst) {
            return Err(session_lost());
        }
        if script.trim_start().starts_with("return") {
            let mut hs = self.script.heights.lock().unwrap();
            let h = if hs.len() > 1 {
                hs.pop_front().flatten()
            } else {
                hs.front().copied().unwrap_or(Some(0))
            };
            return h.map(Value::from).ok_or_else(|| BrowserError::WebDriver {
                error: "javascript error".into(),
                message: "document.body is null".into(),
            });
        }
        Ok(Value::Null)
    }

    async fn quit(&self) -> BrowserResult<()> {
        self.script.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        self.script.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
        }))
    }
}

// ------------------------------------------------------------
// Sources
// ------------------------------------------------------------

pub fn item(title: &str) -> NewsItem {
    NewsItem::new(title, format!("{title} summary"), format!("https://news.test/{}", title.len()))
        .expect("non-empty title")
}

pub struct StaticSource {
    name: String,
    items: Option<Vec<NewsItem>>,
}

impl StaticSource {
    pub fn ok(name: &str, titles: &[&str]) -> Arc<dyn NewsSource> {
        Arc::new(Self {
            name: name.to_string(),
            items: Some(titles.iter().map(|t| item(t)).collect()),
        })
    }

    pub fn failing(name: &str) -> Arc<dyn NewsSource> {
        Arc::new(Self {
            name: name.to_string(),
            items: None,
        })
    }
}

#[async_trait]
impl NewsSource for StaticSource {
    async fn produce(&self) -> Result<Vec<NewsItem>> {
        self.items
            .clone()
            .ok_or_else(|| anyhow!("{}: browser unavailable", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Blocks in `produce` until the gate is opened.
pub struct GatedSource {
    pub gate: Arc<Notify>,
    titles: Vec<String>,
}

impl GatedSource {
    pub fn new(gate: Arc<Notify>, titles: &[&str]) -> Arc<dyn NewsSource> {
        Arc::new(Self {
            gate,
            titles: titles.iter().map(|t| t.to_string()).collect(),
        })
    }
}

#[async_trait]
impl NewsSource for GatedSource {
    async fn produce(&self) -> Result<Vec<NewsItem>> {
        self.gate.notified().await;
        Ok(self.titles.iter().map(|t| item(t)).collect())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

pub struct PanickingSource;

#[async_trait]
impl NewsSource for PanickingSource {
    async fn produce(&self) -> Result<Vec<NewsItem>> {
        panic!("parser blew up");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

// ------------------------------------------------------------
// Trainer / scorer
// ------------------------------------------------------------

#[derive(Default)]
pub struct RecordingTrainer {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingTrainer {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Trainer for RecordingTrainer {
    async fn train_model(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("trainer crashed"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct FixedScorer(pub f32);

#[async_trait]
impl Scorer for FixedScorer {
    fn purify(&self, text: &str) -> String {
        normalize_text(text)
    }

    async fn score(&self, _text: &str) -> Result<f32> {
        Ok(self.0)
    }
}

// ------------------------------------------------------------
// Task runner
// ------------------------------------------------------------

#[derive(Default)]
pub struct TrackingRunner {
    handles: Mutex<Vec<JoinHandle<()>>>,
    spawned: AtomicUsize,
    failures: Arc<AtomicUsize>,
}

impl TaskRunner for TrackingRunner {
    fn spawn(&self, _name: &'static str, task: BoxTask) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let failures = self.failures.clone();
        let inner = tokio::spawn(task);
        let handle = tokio::spawn(async move {
            match inner.await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        self.handles.lock().unwrap().push(handle);
    }
}

impl TrackingRunner {
    pub async fn join_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for h in handles {
            h.await.expect("supervisor task");
        }
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

// ------------------------------------------------------------
// Wiring
// ------------------------------------------------------------

pub fn pipeline(
    sources: Vec<Arc<dyn NewsSource>>,
    store: Arc<dyn CorpusStore>,
    trainer: Arc<RecordingTrainer>,
) -> IngestPipeline {
    IngestPipeline::new(
        sources,
        Corroborator::default(),
        CorpusWriter::new(store, Arc::new(FixedScorer(0.5))),
        RetrainTrigger::new(trainer),
    )
}
