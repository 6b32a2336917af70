use crate::resilience::BackoffConfig;
use crate::{Error, ErrorContext, Result};
use std::time::Duration;

/// Sender configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Maximum actions per batch; also the queue size that triggers an auto-flush.
    pub initial_batch_action_count: usize,
    /// Flush automatically when the queue reaches `initial_batch_action_count`.
    pub auto_flush: bool,
    /// Periodic flush while auto-flush is on. `None` disables the timer.
    pub auto_flush_interval: Option<Duration>,
    /// Retryable failures tolerated per action before it is dead-lettered.
    pub max_retries_per_action: u32,
    /// Default timeout for `flush` and for the drain performed by `close`.
    pub flush_timeout: Option<Duration>,
    /// First throttling delay.
    pub throttling_delay: Duration,
    /// Cap on the throttling delay.
    pub max_throttling_delay: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            initial_batch_action_count: 512,
            auto_flush: true,
            auto_flush_interval: Some(Duration::from_secs(60)),
            max_retries_per_action: 3,
            flush_timeout: None,
            throttling_delay: Duration::from_millis(800),
            max_throttling_delay: Duration::from_secs(60),
        }
    }
}

impl SenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `DOC_SENDER_*` environment variables when present.
    ///
    /// - `DOC_SENDER_BATCH_SIZE`
    /// - `DOC_SENDER_AUTO_FLUSH` (`0`/`false` disables)
    /// - `DOC_SENDER_MAX_RETRIES`
    /// - `DOC_SENDER_FLUSH_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_parse::<usize>("DOC_SENDER_BATCH_SIZE") {
            cfg.initial_batch_action_count = n;
        }
        if let Ok(v) = std::env::var("DOC_SENDER_AUTO_FLUSH") {
            cfg.auto_flush = !matches!(v.trim(), "0" | "false" | "off");
        }
        if let Some(n) = env_parse::<u32>("DOC_SENDER_MAX_RETRIES") {
            cfg.max_retries_per_action = n;
        }
        if let Some(ms) = env_parse::<u64>("DOC_SENDER_FLUSH_TIMEOUT_MS").filter(|ms| *ms > 0) {
            cfg.flush_timeout = Some(Duration::from_millis(ms));
        }
        cfg
    }

    pub fn with_initial_batch_action_count(mut self, n: usize) -> Self {
        self.initial_batch_action_count = n;
        self
    }

    pub fn with_auto_flush(mut self, enabled: bool) -> Self {
        self.auto_flush = enabled;
        self
    }

    pub fn with_auto_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.auto_flush_interval = interval;
        self
    }

    pub fn with_max_retries_per_action(mut self, n: u32) -> Self {
        self.max_retries_per_action = n;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_throttling_delay(mut self, delay: Duration) -> Self {
        self.throttling_delay = delay;
        self
    }

    pub fn with_max_throttling_delay(mut self, delay: Duration) -> Self {
        self.max_throttling_delay = delay;
        self
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::new()
            .with_initial_delay(self.throttling_delay)
            .with_max_delay(self.max_throttling_delay)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_batch_action_count == 0 {
            return Err(invalid(
                "initial_batch_action_count",
                "batch size must be at least 1",
            ));
        }
        if self.throttling_delay.is_zero() {
            return Err(invalid(
                "throttling_delay",
                "throttling delay must be greater than zero",
            ));
        }
        if self.max_throttling_delay < self.throttling_delay {
            return Err(invalid(
                "max_throttling_delay",
                "max throttling delay must not be smaller than the initial delay",
            ));
        }
        if matches!(self.auto_flush_interval, Some(d) if d.is_zero()) {
            return Err(invalid("auto_flush_interval", "interval must be greater than zero"));
        }
        if matches!(self.flush_timeout, Some(d) if d.is_zero()) {
            return Err(invalid("flush_timeout", "timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, msg: &str) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(format!("config.{}", field))
            .with_source("sender_config"),
    )
}

fn env_parse<V: std::str::FromStr>(name: &str) -> Option<V> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<V>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_config_defaults() {
        let config = SenderConfig::default();
        assert_eq!(config.initial_batch_action_count, 512);
        assert!(config.auto_flush);
        assert_eq!(config.auto_flush_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.max_retries_per_action, 3);
        assert_eq!(config.flush_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sender_config_builder() {
        let config = SenderConfig::new()
            .with_initial_batch_action_count(10)
            .with_auto_flush(false)
            .with_max_retries_per_action(7)
            .with_flush_timeout(Some(Duration::from_secs(2)))
            .with_throttling_delay(Duration::from_millis(5))
            .with_max_throttling_delay(Duration::from_millis(50));
        assert_eq!(config.initial_batch_action_count, 10);
        assert!(!config.auto_flush);
        assert_eq!(config.max_retries_per_action, 7);
        assert_eq!(config.backoff().initial_delay, Duration::from_millis(5));
        assert_eq!(config.backoff().max_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_batch = SenderConfig::new().with_initial_batch_action_count(0);
        let err = zero_batch.validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.clone()),
            Some("config.initial_batch_action_count".to_string())
        );

        let inverted = SenderConfig::new()
            .with_throttling_delay(Duration::from_secs(2))
            .with_max_throttling_delay(Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        let zero_delay = SenderConfig::new().with_throttling_delay(Duration::ZERO);
        assert!(zero_delay.validate().is_err());

        let zero_timeout = SenderConfig::new().with_flush_timeout(Some(Duration::ZERO));
        assert!(zero_timeout.validate().is_err());
    }
}
