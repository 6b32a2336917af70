//! Retry accounting and throttling backoff.
//!
//! # Resilience Module
//!
//! Two independent mechanisms keep the sender well-behaved against a busy service:
//!
//! - **Per-action retry budget**: every action counts its own failed attempts and is
//!   dead-lettered once the count exceeds `max_retries_per_action`.
//! - **Shared throttling delay**: a single delay owned by the sender grows each round
//!   that sees a throttling signal and drops back to zero after a clean round.
//!
//! ```rust
//! use doc_batch_sender::resilience::{BackoffConfig, RetryController};
//! use std::time::Duration;
//!
//! let controller = RetryController::new(
//!     3,
//!     BackoffConfig::new()
//!         .with_initial_delay(Duration::from_millis(100))
//!         .with_max_delay(Duration::from_secs(1)),
//! );
//! controller.on_throttled();
//! assert_eq!(controller.current_delay(), Duration::from_millis(100));
//! controller.on_throttled();
//! assert_eq!(controller.current_delay(), Duration::from_millis(200));
//! controller.reset();
//! assert!(controller.current_delay().is_zero());
//! ```

pub mod backoff;

pub use backoff::{next_delay, BackoffConfig, BackoffSnapshot, RetryController, RetryDecision};
