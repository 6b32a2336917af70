//! Action queueing and batch formation.
//!
//! # Batching Module
//!
//! Pending actions wait in an [`ActionQueue`] until a flush round asks the
//! [`BatchBuilder`] for the next [`Batch`]. A batch never holds two actions for the
//! same document key; later duplicates stay queued for a later round. Batches the
//! service rejects as too large are halved by [`split`] and driven through a
//! [`SplitStack`] so the halves resolve independently.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ActionQueue`] | Insertion-ordered, internally synchronized store of pending actions |
//! | [`BatchBuilder`] | Greedy key-unique selection bounded by a maximum action count |
//! | [`Batch`] | Ordered subset of the queue sent in one transmission attempt |
//! | [`split`] | Halves a batch, `ceil(N/2)` then `floor(N/2)`, preserving order |
//! | [`SplitStack`] | Explicit work stack of `(batch, depth)` pieces awaiting transmission |
//!
//! ## Example
//!
//! ```rust
//! use doc_batch_sender::batch::{ActionQueue, BatchBuilder};
//! use doc_batch_sender::types::IndexAction;
//! use std::sync::Arc;
//!
//! let queue: ActionQueue<(String, u32)> = ActionQueue::new(Arc::new(|d: &(String, u32)| Some(d.0.clone())));
//! queue.enqueue(vec![
//!     IndexAction::upload(("a".to_string(), 1)),
//!     IndexAction::upload(("b".to_string(), 2)),
//!     IndexAction::merge(("a".to_string(), 3)),
//! ]).unwrap();
//!
//! let batch = queue.take_batch(&BatchBuilder::new(10));
//! assert_eq!(batch.len(), 2);
//! assert_eq!(queue.len(), 1);
//! ```

mod builder;
mod queue;
mod splitter;

pub use builder::{build_batch, Batch, BatchBuilder, RoundFilter};
pub use queue::ActionQueue;
pub use splitter::{split, SplitStack};
