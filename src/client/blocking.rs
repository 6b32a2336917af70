use super::core::{BatchSender, FlushKind, SenderCore};
use super::flush::FlushReport;
use super::signals::SenderSnapshot;
use crate::error::ActionError;
use crate::events::IndexingEvent;
use crate::types::{ActionType, IndexAction, PendingAction};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

/// Blocking front-end over the same batching engine.
///
/// `flush` occupies the calling thread until the flush completes or times out.
/// Reaching the auto-flush threshold flushes inline before `add_*` returns.
pub struct BlockingBatchSender<T> {
    inner: BatchSender<T>,
    runtime: tokio::runtime::Runtime,
}

impl<T: Send + Sync + 'static> BlockingBatchSender<T> {
    pub(crate) fn new(core: Arc<SenderCore<T>>, runtime: tokio::runtime::Runtime) -> Self {
        let handle = runtime.handle().clone();
        Self {
            inner: BatchSender::new(core, Some(handle)),
            runtime,
        }
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

    pub fn add_actions<I: IntoIterator<Item = IndexAction<T>>>(&self, actions: I) -> Result<()> {
        let core = &self.inner.core;
        if core.enqueue(actions.into_iter().collect())? {
            let flush = core.flush_task(FlushKind::Auto, core.config.flush_timeout);
            // The actions are queued either way; a failed inline flush leaves them for the next one.
            if let Err(e) = self.runtime.block_on(flush) {
                warn!(error = %e, "inline auto-flush failed");
            }
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<FlushReport> {
        self.runtime.block_on(self.inner.flush())
    }

    pub fn flush_with_timeout(&self, timeout: Duration) -> Result<FlushReport> {
        self.runtime.block_on(self.inner.flush_with_timeout(timeout))
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }

    pub fn queued_action_count(&self) -> usize {
        self.inner.queued_action_count()
    }

    pub fn snapshot(&self) -> SenderSnapshot {
        self.inner.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexingEvent> {
        self.inner.subscribe()
    }

    pub fn on_action_added(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        self.inner.on_action_added(f);
    }

    pub fn on_action_sent(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        self.inner.on_action_sent(f);
    }

    pub fn on_action_succeeded(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        self.inner.on_action_succeeded(f);
    }

    pub fn on_action_error(
        &self,
        f: impl Fn(&PendingAction<T>, &ActionError) + Send + Sync + 'static,
    ) {
        self.inner.on_action_error(f);
    }
}
