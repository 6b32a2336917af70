use super::blocking::BlockingBatchSender;
use super::config::SenderConfig;
use super::core::{spawn_interval_flush, BatchSender, SenderCore};
use crate::batch::ActionQueue;
use crate::error::ActionError;
use crate::events::EventNotifier;
use crate::transport::IndexChannel;
use crate::types::{KeyExtractor, PendingAction};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tracing::warn;

/// Builder for senders.
///
/// A channel and a key extractor are required. Without an explicit config the
/// sender uses [`SenderConfig::from_env`].
pub struct SenderBuilder<T> {
    channel: Option<Arc<dyn IndexChannel<T>>>,
    key_extractor: Option<KeyExtractor<T>>,
    config: Option<SenderConfig>,
    notifier: EventNotifier<T>,
}

impl<T: Send + Sync + 'static> SenderBuilder<T> {
    pub fn new() -> Self {
        Self {
            channel: None,
            key_extractor: None,
            config: None,
            notifier: EventNotifier::new(),
        }
    }

    pub fn channel(self, channel: impl IndexChannel<T> + 'static) -> Self {
        self.shared_channel(Arc::new(channel))
    }

    pub fn shared_channel(mut self, channel: Arc<dyn IndexChannel<T>>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Function deriving each document's key. `None` or `""` rejects the document.
    pub fn key_extractor(mut self, f: impl Fn(&T) -> Option<String> + Send + Sync + 'static) -> Self {
        self.key_extractor = Some(Arc::new(f));
        self
    }

    pub fn config(mut self, config: SenderConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn on_action_added(self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) -> Self {
        self.notifier.on_action_added(f);
        self
    }

    pub fn on_action_sent(self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) -> Self {
        self.notifier.on_action_sent(f);
        self
    }

    pub fn on_action_succeeded(self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) -> Self {
        self.notifier.on_action_succeeded(f);
        self
    }

    pub fn on_action_error(
        self,
        f: impl Fn(&PendingAction<T>, &ActionError) + Send + Sync + 'static,
    ) -> Self {
        self.notifier.on_action_error(f);
        self
    }

    fn into_core(self) -> Result<Arc<SenderCore<T>>> {
        let config = self.config.unwrap_or_else(SenderConfig::from_env);
        config.validate()?;
        let channel = self.channel.ok_or_else(|| missing("channel"))?;
        let key_extractor = self.key_extractor.ok_or_else(|| missing("key_extractor"))?;
        Ok(Arc::new(SenderCore::new(
            config,
            ActionQueue::new(key_extractor),
            channel,
            self.notifier,
        )))
    }

    /// Build an asynchronous sender.
    ///
    /// Call from within a tokio runtime so the periodic flush timer can start;
    /// outside one the timer is skipped.
    pub fn build(self) -> Result<BatchSender<T>> {
        let core = self.into_core()?;
        let runtime = tokio::runtime::Handle::try_current().ok();
        if let (true, Some(interval)) = (core.config.auto_flush, core.config.auto_flush_interval) {
            match &runtime {
                Some(handle) => spawn_interval_flush(&core, interval, handle),
                None => warn!("no tokio runtime available; periodic auto-flush disabled"),
            }
        }
        Ok(BatchSender::new(core, runtime))
    }

    /// Build a blocking sender that owns its own runtime.
    ///
    /// Must not be called from inside an async context.
    pub fn build_blocking(self) -> Result<BlockingBatchSender<T>> {
        let core = self.into_core()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("doc-batch-sender")
            .enable_all()
            .build()?;
        if let (true, Some(interval)) = (core.config.auto_flush, core.config.auto_flush_interval) {
            spawn_interval_flush(&core, interval, runtime.handle());
        }
        Ok(BlockingBatchSender::new(core, runtime))
    }
}

impl<T: Send + Sync + 'static> Default for SenderBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(field: &str) -> Error {
    Error::configuration_with_context(
        format!("{} is required", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_source("sender_builder"),
    )
}
