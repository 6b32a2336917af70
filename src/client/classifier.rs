//! Response classification.
//!
//! Status partition for per-action results:
//! - success: 200, 201
//! - retryable: 409 (conflict), 422 (unprocessable), 503 (throttled)
//! - terminal: everything else
//!
//! A 503, per action or for the whole batch, is also a throttling signal.
//!
//! A batch-level 4xx other than 408, 409, 413, 422 and 429 means the request
//! itself was rejected; every action in it fails terminally.

use crate::transport::{ChannelFault, ChannelOutcome};
use crate::types::{ActionResult, PendingAction};
use std::collections::HashMap;

pub const THROTTLED_STATUS: u16 = 503;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Terminal,
}

#[inline]
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200 | 201 => StatusClass::Success,
        409 | 422 | THROTTLED_STATUS => StatusClass::Retryable,
        _ => StatusClass::Terminal,
    }
}

#[inline]
pub fn is_throttling_status(status: u16) -> bool {
    status == THROTTLED_STATUS
}

/// Whole-batch status that no retry will fix.
#[inline]
pub fn is_terminal_batch_status(status: u16) -> bool {
    (400..500).contains(&status) && !matches!(status, 408 | 409 | 413 | 422 | 429)
}

/// Verdict for one action of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionVerdict {
    Success { status_code: u16 },
    Retryable { status_code: Option<u16>, message: String },
    Terminal { status_code: u16, message: String },
}

/// Classified outcome of one transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Whole batch rejected as too large before any action was processed.
    TransportOversize,
    /// Every action in the batch failed retryably.
    TransportFault { fault: ChannelFault, throttled: bool },
    /// One verdict per batch action, in batch order.
    PerAction { verdicts: Vec<ActionVerdict>, throttled: bool },
}

impl Classification {
    pub fn throttled(&self) -> bool {
        match self {
            Classification::TransportOversize => false,
            Classification::TransportFault { throttled, .. }
            | Classification::PerAction { throttled, .. } => *throttled,
        }
    }
}

pub fn classify<T>(batch: &[PendingAction<T>], outcome: ChannelOutcome) -> Classification {
    match outcome {
        ChannelOutcome::Oversize => Classification::TransportOversize,
        ChannelOutcome::Fault(ChannelFault {
            status_code: Some(status_code),
            message,
        }) if is_terminal_batch_status(status_code) => Classification::PerAction {
            verdicts: batch
                .iter()
                .map(|_| ActionVerdict::Terminal {
                    status_code,
                    message: message.clone(),
                })
                .collect(),
            throttled: false,
        },
        ChannelOutcome::Fault(fault) => {
            let throttled = fault.status_code.map(is_throttling_status).unwrap_or(false);
            Classification::TransportFault { fault, throttled }
        }
        ChannelOutcome::Results(results) => {
            let (verdicts, throttled) = classify_results(batch, &results);
            Classification::PerAction {
                verdicts,
                throttled,
            }
        }
    }
}

fn classify_results<T>(batch: &[PendingAction<T>], results: &[ActionResult]) -> (Vec<ActionVerdict>, bool) {
    let by_key: HashMap<&str, &ActionResult> =
        results.iter().map(|r| (r.key.as_str(), r)).collect();
    let positional = results.len() == batch.len();

    let mut throttled = false;
    let verdicts = batch
        .iter()
        .enumerate()
        .map(|(i, action)| {
            // Position only stands in for a result that carries no key.
            let result = by_key.get(action.key()).copied().or_else(|| {
                results
                    .get(i)
                    .filter(|r| positional && r.key.is_empty())
            });
            match result {
                Some(r) => {
                    throttled |= is_throttling_status(r.status_code);
                    verdict_for(r)
                }
                None => ActionVerdict::Retryable {
                    status_code: None,
                    message: "service returned no result for this key".to_string(),
                },
            }
        })
        .collect();
    (verdicts, throttled)
}

fn verdict_for(result: &ActionResult) -> ActionVerdict {
    let message = || {
        result
            .error_message
            .clone()
            .unwrap_or_else(|| format!("status {}", result.status_code))
    };
    match classify_status(result.status_code) {
        StatusClass::Success => ActionVerdict::Success {
            status_code: result.status_code,
        },
        StatusClass::Retryable => ActionVerdict::Retryable {
            status_code: Some(result.status_code),
            message: message(),
        },
        StatusClass::Terminal => ActionVerdict::Terminal {
            status_code: result.status_code,
            message: message(),
        },
    }
}
