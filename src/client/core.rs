use super::config::SenderConfig;
use super::flush::{run_round, FlushReport};
use super::signals::{LifecycleState, SenderSnapshot};
use crate::batch::{ActionQueue, BatchBuilder};
use crate::error::ActionError;
use crate::events::{EventNotifier, IndexingEvent};
use crate::resilience::RetryController;
use crate::transport::IndexChannel;
use crate::types::{ActionType, IndexAction, PendingAction};
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushKind {
    Manual,
    /// Threshold auto-flush; owns the `auto_flush_scheduled` claim.
    Auto,
    Interval,
    Close,
}

impl FlushKind {
    fn as_str(&self) -> &'static str {
        match self {
            FlushKind::Manual => "manual",
            FlushKind::Auto => "auto",
            FlushKind::Interval => "interval",
            FlushKind::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closing,
    Closed,
}

/// State shared by both execution modes.
pub(crate) struct SenderCore<T> {
    pub(crate) config: SenderConfig,
    pub(crate) queue: ActionQueue<T>,
    pub(crate) builder: BatchBuilder,
    pub(crate) retry: RetryController,
    pub(crate) channel: Arc<dyn IndexChannel<T>>,
    pub(crate) notifier: EventNotifier<T>,
    /// Single-flight coordinator. tokio's mutex queues waiters in FIFO order, so
    /// concurrent flushes run one after another, each doing its own round.
    flush_lock: tokio::sync::Mutex<()>,
    flushing: AtomicBool,
    auto_flush_scheduled: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    /// Enqueues admitted while open and not yet pushed. `close` waits for zero.
    active_enqueues: AtomicUsize,
    enqueues_drained: Notify,
}

/// Admission of one enqueue call; released once its actions are queued.
struct EnqueueGuard<'a, T> {
    core: &'a SenderCore<T>,
}

impl<T> Drop for EnqueueGuard<'_, T> {
    fn drop(&mut self) {
        if self.core.active_enqueues.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.core.enqueues_drained.notify_waiters();
        }
    }
}

impl<T: Send + Sync + 'static> SenderCore<T> {
    pub(crate) fn new(
        config: SenderConfig,
        queue: ActionQueue<T>,
        channel: Arc<dyn IndexChannel<T>>,
        notifier: EventNotifier<T>,
    ) -> Self {
        Self {
            builder: BatchBuilder::new(config.initial_batch_action_count),
            retry: RetryController::new(config.max_retries_per_action, config.backoff()),
            config,
            queue,
            channel,
            notifier,
            flush_lock: tokio::sync::Mutex::new(()),
            flushing: AtomicBool::new(false),
            auto_flush_scheduled: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Open),
            active_enqueues: AtomicUsize::new(0),
            enqueues_drained: Notify::new(),
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_open(&self, operation: &str) -> Result<()> {
        match self.lifecycle() {
            Lifecycle::Open => Ok(()),
            Lifecycle::Closing | Lifecycle::Closed => Err(Error::illegal_state_with_context(
                format!("cannot {} after close", operation),
                ErrorContext::new().with_source("batch_sender"),
            )),
        }
    }

    /// Admit an enqueue while the sender is open. The lifecycle check and the
    /// admission count change under one lock, so `close` sees every admitted call.
    fn admit_enqueue(&self) -> Result<EnqueueGuard<'_, T>> {
        let st = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if *st != Lifecycle::Open {
            return Err(Error::illegal_state_with_context(
                "cannot add actions after close",
                ErrorContext::new().with_source("batch_sender"),
            ));
        }
        self.active_enqueues.fetch_add(1, Ordering::SeqCst);
        Ok(EnqueueGuard { core: self })
    }

    async fn wait_for_enqueues(&self) {
        loop {
            let drained = self.enqueues_drained.notified();
            if self.active_enqueues.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Queue the actions. Returns `true` when an auto-flush should run.
    pub(crate) fn enqueue(&self, actions: Vec<IndexAction<T>>) -> Result<bool> {
        let _admitted = self.admit_enqueue()?;
        let prepared = self.queue.prepare(actions)?;
        for action in &prepared {
            self.notifier.action_added(action);
        }
        let len = self.queue.push(prepared);
        Ok(self.config.auto_flush && len >= self.config.initial_batch_action_count)
    }

    /// Claim the right to schedule an auto-flush; cleared once that flush starts.
    pub(crate) fn claim_auto_flush(&self) -> bool {
        !self.auto_flush_scheduled.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> SenderSnapshot {
        let state = match self.lifecycle() {
            Lifecycle::Open if self.flushing.load(Ordering::SeqCst) => LifecycleState::Flushing,
            Lifecycle::Open => LifecycleState::Idle,
            Lifecycle::Closing => LifecycleState::Closing,
            Lifecycle::Closed => LifecycleState::Closed,
        };
        SenderSnapshot {
            state,
            queued_actions: self.queue.len(),
            backoff: self.retry.snapshot(),
        }
    }

    /// Hold the coordinator and run rounds.
    ///
    /// A `Close` flush keeps running rounds while the queue is non-empty and the
    /// previous round transmitted something.
    async fn run_flush(&self, kind: FlushKind, cancel: CancellationToken) -> FlushReport {
        let _guard = self.flush_lock.lock().await;
        if kind == FlushKind::Auto {
            self.auto_flush_scheduled.store(false, Ordering::SeqCst);
        }

        let mut report = FlushReport::default();
        if self.queue.is_empty() {
            return report;
        }

        self.flushing.store(true, Ordering::SeqCst);
        let flush_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        debug!(
            flush_id = flush_id.as_str(),
            kind = kind.as_str(),
            queued = self.queue.len(),
            "flush started"
        );

        loop {
            let round = run_round(self, &flush_id, &cancel).await;
            let progressed = !round.is_empty();
            report.absorb(round);
            if kind != FlushKind::Close || !progressed || report.cancelled || self.queue.is_empty() {
                break;
            }
        }

        self.flushing.store(false, Ordering::SeqCst);
        report.elapsed = start.elapsed();
        report
    }

    /// Start a flush on the runtime and return a handle that waits for it.
    ///
    /// The round runs in its own task: timing out or dropping the handle stops
    /// further batches but never interrupts a request already on the wire.
    pub(crate) fn flush_task(
        self: &Arc<Self>,
        kind: FlushKind,
        timeout: Option<Duration>,
    ) -> FlushHandle {
        let cancel = CancellationToken::new();
        let core = Arc::clone(self);
        let token = cancel.clone();

        let fut = async move {
            let runner = Arc::clone(&core);
            let round_token = token.clone();
            let task = tokio::spawn(async move { runner.run_flush(kind, round_token).await });

            let joined = match timeout {
                Some(limit) => match tokio::time::timeout(limit, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        token.cancel();
                        warn!(
                            kind = kind.as_str(),
                            timeout_ms = limit.as_millis() as u64,
                            queued = core.queue.len(),
                            "flush timed out"
                        );
                        return Err(Error::FlushTimeout { timeout: limit });
                    }
                },
                None => task.await,
            };

            joined.map_err(|e| {
                Error::runtime_with_context(
                    format!("flush task failed: {}", e),
                    ErrorContext::new().with_source("flush_coordinator"),
                )
            })
        };

        FlushHandle::new(Box::pin(fut), cancel)
    }

    pub(crate) async fn close(self: &Arc<Self>) -> Result<()> {
        {
            let mut st = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            if *st != Lifecycle::Open {
                return Ok(());
            }
            *st = Lifecycle::Closing;
        }

        // Calls admitted before the switch to `Closing` land in the drain.
        self.wait_for_enqueues().await;
        info!(queued = self.queue.len(), "closing sender");
        let result = self
            .flush_task(FlushKind::Close, self.config.flush_timeout)
            .await;

        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = Lifecycle::Closed;
        match result {
            Ok(report) => {
                info!(
                    succeeded = report.succeeded,
                    failed = report.failed,
                    left_queued = self.queue.len(),
                    "sender closed"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Deferred result of a flush.
///
/// Resolves to the [`FlushReport`] of the flush. [`FlushHandle::cancel`], or dropping
/// the handle, stops the flush from sending further batches; a request already sent
/// still completes and its actions are resolved or requeued as usual.
#[must_use = "a flush handle does nothing unless awaited"]
pub struct FlushHandle {
    inner: BoxFuture<'static, Result<FlushReport>>,
    cancel: CancellationToken,
}

impl FlushHandle {
    fn new(inner: BoxFuture<'static, Result<FlushReport>>, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    pub(crate) fn ready(result: Result<FlushReport>) -> Self {
        Self::new(Box::pin(async move { result }), CancellationToken::new())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Future for FlushHandle {
    type Output = Result<FlushReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Asynchronous buffered sender.
///
/// Actions are queued by the `add_*` methods and transmitted in batches by
/// [`BatchSender::flush`], by the auto-flush threshold, by the periodic timer, or
/// by [`BatchSender::close`].
pub struct BatchSender<T> {
    pub(crate) core: Arc<SenderCore<T>>,
    runtime: Option<tokio::runtime::Handle>,
}

impl<T: Send + Sync + 'static> BatchSender<T> {
    pub(crate) fn new(core: Arc<SenderCore<T>>, runtime: Option<tokio::runtime::Handle>) -> Self {
        Self { core, runtime }
    }

    pub fn add_upload_actions<I: IntoIterator<Item = T>>(&self, documents: I) -> Result<()> {
        self.add_typed(ActionType::Upload, documents)
    }

    pub fn add_merge_actions<I: IntoIterator<Item = T>>(&self, documents: I) -> Result<()> {
        self.add_typed(ActionType::Merge, documents)
    }

    pub fn add_merge_or_upload_actions<I: IntoIterator<Item = T>>(&self, documents: I) -> Result<()> {
        self.add_typed(ActionType::MergeOrUpload, documents)
    }

    pub fn add_delete_actions<I: IntoIterator<Item = T>>(&self, documents: I) -> Result<()> {
        self.add_typed(ActionType::Delete, documents)
    }

    fn add_typed<I: IntoIterator<Item = T>>(&self, action_type: ActionType, documents: I) -> Result<()> {
        self.add_actions(
            documents
                .into_iter()
                .map(|d| IndexAction::new(action_type, d)),
        )
    }

    /// Queue actions. Reaching the auto-flush threshold schedules a flush in the
    /// background without blocking the caller.
    pub fn add_actions<I: IntoIterator<Item = IndexAction<T>>>(&self, actions: I) -> Result<()> {
        let should_flush = self.core.enqueue(actions.into_iter().collect())?;
        if should_flush && self.core.claim_auto_flush() {
            self.spawn_auto_flush();
        }
        Ok(())
    }

    fn spawn_auto_flush(&self) {
        let handle = match tokio::runtime::Handle::try_current()
            .ok()
            .or_else(|| self.runtime.clone())
        {
            Some(h) => h,
            None => {
                warn!("no tokio runtime available; auto-flush skipped");
                self.core.auto_flush_scheduled.store(false, Ordering::SeqCst);
                return;
            }
        };
        let flush = self
            .core
            .flush_task(FlushKind::Auto, self.core.config.flush_timeout);
        handle.spawn(async move {
            if let Err(e) = flush.await {
                warn!(error = %e, "auto-flush failed");
            }
        });
    }

    /// Flush with the configured default timeout.
    pub fn flush(&self) -> FlushHandle {
        self.flush_inner(self.core.config.flush_timeout)
    }

    pub fn flush_with_timeout(&self, timeout: Duration) -> FlushHandle {
        self.flush_inner(Some(timeout))
    }

    fn flush_inner(&self, timeout: Option<Duration>) -> FlushHandle {
        match self.core.ensure_open("flush") {
            Ok(()) => self.core.flush_task(FlushKind::Manual, timeout),
            Err(e) => FlushHandle::ready(Err(e)),
        }
    }

    /// Wait for any running flush, drain the queue, then reject further work.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.core.close().await
    }

    pub fn queued_action_count(&self) -> usize {
        self.core.queue.len()
    }

    pub fn snapshot(&self) -> SenderSnapshot {
        self.core.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexingEvent> {
        self.core.notifier.subscribe()
    }

    pub fn on_action_added(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        self.core.notifier.on_action_added(f);
    }

    pub fn on_action_sent(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        self.core.notifier.on_action_sent(f);
    }

    pub fn on_action_succeeded(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        self.core.notifier.on_action_succeeded(f);
    }

    pub fn on_action_error(
        &self,
        f: impl Fn(&PendingAction<T>, &ActionError) + Send + Sync + 'static,
    ) {
        self.core.notifier.on_action_error(f);
    }
}

/// Flush on a fixed interval until the sender closes or is dropped.
pub(crate) fn spawn_interval_flush<T: Send + Sync + 'static>(
    core: &Arc<SenderCore<T>>,
    interval: Duration,
    handle: &tokio::runtime::Handle,
) {
    let weak: Weak<SenderCore<T>> = Arc::downgrade(core);
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let core = match weak.upgrade() {
                Some(c) => c,
                None => break,
            };
            if core.ensure_open("flush").is_err() {
                break;
            }
            if core.queue.is_empty() {
                continue;
            }
            if let Err(e) = core
                .flush_task(FlushKind::Interval, core.config.flush_timeout)
                .await {
                warn!(error = %e, "interval flush failed");
            }
        }
        debug!("interval flush stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SenderBuilder;
    use crate::transport::ChannelOutcome;
    use crate::types::ActionResult;
    use async_trait::async_trait;

    struct AcceptAll;

    #[async_trait]
    impl IndexChannel<String> for AcceptAll {
        async fn send(&self, batch: &[PendingAction<String>]) -> ChannelOutcome {
            ChannelOutcome::Results(batch.iter().map(|a| ActionResult::new(a.key(), 200)).collect())
        }
    }

    fn sender() -> BatchSender<String> {
        SenderBuilder::new()
            .channel(AcceptAll)
            .key_extractor(|s: &String| Some(s.clone()))
            .config(
                SenderConfig::new()
                    .with_auto_flush(false)
                    .with_auto_flush_interval(None),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_only_threshold_flush_releases_auto_flush_claim() {
        let sender = sender();
        let core = &sender.core;
        assert!(core.claim_auto_flush());

        core.enqueue(vec![IndexAction::upload("a".to_string())]).unwrap();
        core.flush_task(FlushKind::Interval, None).await.unwrap();
        assert!(!core.claim_auto_flush());

        core.flush_task(FlushKind::Auto, None).await.unwrap();
        assert!(core.claim_auto_flush());
    }

    #[tokio::test]
    async fn test_admitted_enqueue_holds_close() {
        let sender = sender();
        let core = Arc::clone(&sender.core);
        let admitted = core.admit_enqueue().unwrap();

        let closer = tokio::spawn({
            let core = Arc::clone(&core);
            async move { core.close().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(core.snapshot().state, LifecycleState::Closing);
        assert!(core.admit_enqueue().is_err());
        assert!(!closer.is_finished());

        drop(admitted);
        closer.await.unwrap().unwrap();
        assert_eq!(core.snapshot().state, LifecycleState::Closed);
    }
}
