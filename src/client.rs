//! Buffered sender front-ends and the flush coordinator.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`SenderBuilder`] | Wires channel, key extractor, config and callbacks |
//! | [`BatchSender`] | Async mode: `flush` returns a [`FlushHandle`] |
//! | [`BlockingBatchSender`] | Blocking mode over an owned runtime |
//! | [`SenderConfig`] | Batch size, auto-flush, retry budget, timeouts, backoff |
//! | [`FlushReport`] | Counters for one flush |
//! | [`SenderSnapshot`] | Queue size, lifecycle state and backoff facts |

mod blocking;
mod builder;
pub mod classifier;
mod config;
mod core;
mod flush;
mod signals;

pub use blocking::BlockingBatchSender;
pub use builder::SenderBuilder;
pub use config::SenderConfig;
pub use self::core::{BatchSender, FlushHandle};
pub use flush::FlushReport;
pub use signals::{LifecycleState, SenderSnapshot};
