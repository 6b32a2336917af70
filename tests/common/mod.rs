//! Shared fixtures for integration tests: a scripted in-memory channel and a
//! recorder for the lifecycle callbacks.

#![allow(dead_code)]

use async_trait::async_trait;
use doc_batch_sender::transport::{ChannelOutcome, IndexChannel};
use doc_batch_sender::types::{ActionResult, PendingAction};
use doc_batch_sender::{ActionError, BatchSender, SenderBuilder, SenderConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Doc {
    pub id: String,
    pub title: String,
}

pub fn doc(id: &str) -> Doc {
    Doc {
        id: id.to_string(),
        title: format!("title {}", id),
    }
}

pub fn docs(ids: &[&str]) -> Vec<Doc> {
    ids.iter().map(|id| doc(id)).collect()
}

type Script = dyn Fn(usize, &[String]) -> ChannelOutcome + Send + Sync;

/// Channel answering from a closure of `(call index, batch keys)`.
pub struct ScriptedChannel {
    script: Box<Script>,
    calls: Mutex<Vec<Vec<String>>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new(
        script: impl Fn(usize, &[String]) -> ChannelOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every action answered with `status`.
    pub fn uniform(status: u16) -> Self {
        Self::new(move |_, keys| results(keys, status))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub fn results(keys: &[String], status: u16) -> ChannelOutcome {
    ChannelOutcome::Results(
        keys.iter()
            .map(|k| ActionResult::new(k.clone(), status))
            .collect(),
    )
}

#[async_trait]
impl<T: Send + Sync> IndexChannel<T> for ScriptedChannel {
    async fn send(&self, batch: &[PendingAction<T>]) -> ChannelOutcome {
        let keys: Vec<String> = batch.iter().map(|a| a.key().to_string()).collect();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(keys.clone());
            calls.len() - 1
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(call, &keys)
    }
}

/// Keys seen by each of the four callbacks, in firing order.
#[derive(Default)]
pub struct Recorder {
    added: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    succeeded: Mutex<Vec<String>>,
    errors: Mutex<Vec<(String, ActionError)>>,
}

impl Recorder {
    pub fn added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn succeeded(&self) -> Vec<String> {
        self.succeeded.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, ActionError)> {
        self.errors.lock().unwrap().clone()
    }
}

/// Manual flushing only, with millisecond-scale throttling delays.
pub fn fast_config() -> SenderConfig {
    SenderConfig::new()
        .with_auto_flush(false)
        .with_auto_flush_interval(None)
        .with_throttling_delay(Duration::from_millis(1))
        .with_max_throttling_delay(Duration::from_millis(20))
}

pub fn builder_with(
    channel: Arc<ScriptedChannel>,
    config: SenderConfig,
    recorder: &Arc<Recorder>,
) -> SenderBuilder<Doc> {
    record_into(SenderBuilder::new().shared_channel(channel), config, recorder)
}

pub fn builder_with_channel(
    channel: impl IndexChannel<Doc> + 'static,
    config: SenderConfig,
    recorder: &Arc<Recorder>,
) -> SenderBuilder<Doc> {
    record_into(SenderBuilder::new().channel(channel), config, recorder)
}

fn record_into(
    builder: SenderBuilder<Doc>,
    config: SenderConfig,
    recorder: &Arc<Recorder>,
) -> SenderBuilder<Doc> {
    let added = Arc::clone(recorder);
    let sent = Arc::clone(recorder);
    let succeeded = Arc::clone(recorder);
    let errors = Arc::clone(recorder);
    builder
        .key_extractor(|d: &Doc| Some(d.id.clone()))
        .config(config)
        .on_action_added(move |a| added.added.lock().unwrap().push(a.key().to_string()))
        .on_action_sent(move |a| sent.sent.lock().unwrap().push(a.key().to_string()))
        .on_action_succeeded(move |a| {
            succeeded
                .succeeded
                .lock()
                .unwrap()
                .push(a.key().to_string())
        })
        .on_action_error(move |a, e| {
            errors
                .errors
                .lock()
                .unwrap()
                .push((a.key().to_string(), e.clone()))
        })
}

pub fn sender_with(
    channel: Arc<ScriptedChannel>,
    config: SenderConfig,
) -> (BatchSender<Doc>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sender = builder_with(channel, config, &recorder)
        .build()
        .expect("sender builds");
    (sender, recorder)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
