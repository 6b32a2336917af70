//! Transmission channel boundary.
//!
//! The sender never talks HTTP itself. It hands each batch to an [`IndexChannel`]
//! and gets back exactly one [`ChannelOutcome`]:
//!
//! - [`ChannelOutcome::Results`]: one [`ActionResult`](crate::types::ActionResult) per action
//! - [`ChannelOutcome::Oversize`]: the whole batch was rejected as too large
//! - [`ChannelOutcome::Fault`]: connectivity, timeout, or an unexpected batch-level status
//!
//! [`HttpIndexChannel`] is the `reqwest` implementation for a search service's
//! document indexing endpoint.

pub mod http;

pub use http::{HttpIndexChannel, TransportError};

use crate::types::{ActionResult, PendingAction};
use async_trait::async_trait;
use std::fmt;

/// Batch-level failure reported by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFault {
    /// Uniform HTTP status for the batch, when the service answered at all.
    pub status_code: Option<u16>,
    pub message: String,
}

impl ChannelFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl fmt::Display for ChannelFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(s) => write!(f, "HTTP {}: {}", s, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<TransportError> for ChannelFault {
    fn from(e: TransportError) -> Self {
        let status = e.status_code();
        let fault = ChannelFault::new(e.to_string());
        match status {
            Some(s) => fault.with_status(s),
            None => fault,
        }
    }
}

/// Raw result of sending one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Results(Vec<ActionResult>),
    Oversize,
    Fault(ChannelFault),
}

/// Sends one batch of actions to the remote index.
#[async_trait]
pub trait IndexChannel<T: Send + Sync>: Send + Sync {
    async fn send(&self, batch: &[PendingAction<T>]) -> ChannelOutcome;
}
