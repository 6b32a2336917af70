//! # doc-batch-sender
//!
//! Buffered write-batching engine for pushing document mutations (upload, merge,
//! merge-or-upload, delete) to a remote search index.
//!
//! ## Overview
//!
//! Callers queue actions; the sender groups them into batches and transmits them
//! through an [`IndexChannel`](transport::IndexChannel). Each response is
//! classified per action:
//!
//! - **Success** (200/201): the action is done
//! - **Retryable** (409/422/503, or a transport fault): the action goes back to the
//!   queue until its retry budget runs out
//! - **Terminal** (anything else): the action is dropped and reported
//! - **Oversize** (batch-level 413): the batch is halved and each half resent; a
//!   single oversize action is reported as failed
//!
//! Throttling (503) grows a shared delay that is waited out before the next
//! submission and resets after a clean round. Flushes are single-flight: concurrent
//! callers wait their turn and each performs its own round.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc_batch_sender::transport::HttpIndexChannel;
//! use doc_batch_sender::{SenderBuilder, SenderConfig};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> doc_batch_sender::Result<()> {
//!     let channel = HttpIndexChannel::<Value>::new("https://search.example.net", "hotels")?
//!         .with_api_key("secret");
//!
//!     let sender = SenderBuilder::new()
//!         .channel(channel)
//!         .key_extractor(|doc: &Value| doc["id"].as_str().map(str::to_owned))
//!         .config(SenderConfig::new().with_initial_batch_action_count(100))
//!         .on_action_error(|action, err| eprintln!("{} failed: {}", action.key(), err))
//!         .build()?;
//!
//!     sender.add_upload_actions(vec![json!({"id": "1", "name": "Seaside"})])?;
//!     let report = sender.flush().await?;
//!     println!("sent {} actions", report.actions_sent);
//!     sender.close().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Actions, action types, per-action results |
//! | [`batch`] | Action queue, batch builder, splitter |
//! | [`resilience`] | Per-action retry budget and throttling backoff |
//! | [`transport`] | Transmission channel trait and HTTP implementation |
//! | [`client`] | Async and blocking senders, flush coordination |
//! | [`events`] | Lifecycle callbacks and event stream |

pub mod batch;
pub mod client;
pub mod events;
pub mod resilience;
pub mod transport;
pub mod types;

pub use client::{
    BatchSender, BlockingBatchSender, FlushHandle, FlushReport, LifecycleState, SenderBuilder,
    SenderConfig, SenderSnapshot,
};
pub use events::{IndexingEvent, IndexingEventKind};
pub use types::{ActionResult, ActionType, IndexAction, PendingAction};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{ActionError, Error, ErrorContext};
