//! One flush round: build, send, classify, resolve.

use super::classifier::{classify, ActionVerdict, Classification};
use super::core::SenderCore;
use crate::batch::{ActionQueue, Batch, RoundFilter, SplitStack};
use crate::error::ActionError;
use crate::resilience::RetryDecision;
use crate::types::PendingAction;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Summary of one `flush` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub rounds: u32,
    /// Transmissions performed, counting split halves.
    pub batches_sent: u32,
    /// Action transmissions; an action sent twice counts twice.
    pub actions_sent: usize,
    pub succeeded: usize,
    /// Actions abandoned (terminal, oversize or out of retries).
    pub failed: usize,
    /// Actions put back for a later round.
    pub requeued: usize,
    pub splits: u32,
    pub transport_faults: u32,
    /// Whether any round saw a throttling signal.
    pub throttled: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.actions_sent == 0
    }

    pub(crate) fn absorb(&mut self, round: FlushReport) {
        self.rounds += round.rounds;
        self.batches_sent += round.batches_sent;
        self.actions_sent += round.actions_sent;
        self.succeeded += round.succeeded;
        self.failed += round.failed;
        self.requeued += round.requeued;
        self.splits += round.splits;
        self.transport_faults += round.transport_faults;
        self.throttled |= round.throttled;
        self.cancelled |= round.cancelled;
    }
}

/// Unsent pieces of the batch being processed.
///
/// Dropping it mid-round, e.g. when the runtime shuts down during a send, puts the
/// unresolved actions back into the queue so nothing leaks.
struct InFlight<'a, T> {
    queue: &'a ActionQueue<T>,
    stack: SplitStack<T>,
}

impl<'a, T> InFlight<'a, T> {
    fn new(queue: &'a ActionQueue<T>, batch: Batch<T>) -> Self {
        Self {
            queue,
            stack: SplitStack::new(batch),
        }
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        let leftover = self.stack.drain_actions();
        if !leftover.is_empty() {
            debug!(actions = leftover.len(), "returning unsent actions to queue");
            self.queue.push(leftover);
        }
    }
}

pub(crate) async fn run_round<T: Send + Sync + 'static>(
    core: &SenderCore<T>,
    flush_id: &str,
    cancel: &CancellationToken,
) -> FlushReport {
    let start = Instant::now();
    let mut report = FlushReport {
        rounds: 1,
        ..FlushReport::default()
    };
    let mut filter = RoundFilter::new(core.queue.watermark());
    // Retried submissions wait out the delay left by a throttled round.
    let mut wait_before_send = !core.retry.current_delay().is_zero();

    'batches: loop {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let batch = core.queue.take_round_batch(&core.builder, &filter);
        if batch.is_empty() {
            break;
        }
        filter.mark_dispatched(&batch);
        debug!(flush_id, batch_size = batch.len(), "built batch");

        let mut in_flight = InFlight::new(&core.queue, batch);
        loop {
            let size = match in_flight.stack.peek() {
                Some(piece) => piece.len(),
                None => break,
            };

            if wait_before_send {
                let delay = core.retry.current_delay();
                if !delay.is_zero() {
                    debug!(flush_id, delay_ms = delay.as_millis() as u64, "throttling backoff");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            report.cancelled = true;
                            break 'batches;
                        }
                    }
                }
                wait_before_send = false;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break 'batches;
            }

            let outcome = {
                let piece = match in_flight.stack.peek() {
                    Some(p) => p,
                    None => break,
                };
                for action in piece.actions() {
                    core.notifier.action_sent(action);
                }
                core.channel.send(piece.actions()).await
            };
            report.batches_sent += 1;
            report.actions_sent += size;

            let (piece, depth) = match in_flight.stack.pop() {
                Some(p) => p,
                None => break,
            };
            let classification = classify(piece.actions(), outcome);
            if classification.throttled() {
                if !report.throttled {
                    let delay = core.retry.on_throttled();
                    warn!(flush_id, delay_ms = delay.as_millis() as u64, "service is throttling");
                }
                report.throttled = true;
                wait_before_send = true;
            }

            match classification {
                Classification::TransportOversize => {
                    match in_flight.stack.split_piece(piece, depth) {
                        Ok(()) => {
                            report.splits += 1;
                            debug!(flush_id, batch_size = size, depth, "oversize batch split");
                        }
                        Err(action) => {
                            warn!(flush_id, key = action.key(), "single action exceeds payload limit");
                            core.notifier.action_error(&action, &ActionError::OversizePayload);
                            report.failed += 1;
                        }
                    }
                }
                Classification::TransportFault { fault, .. } => {
                    report.transport_faults += 1;
                    warn!(flush_id, batch_size = size, error = %fault, "batch transmission failed");
                    let mut requeue = Vec::new();
                    for action in piece.into_actions() {
                        retry_or_dead_letter(
                            core,
                            action,
                            fault.status_code,
                            &fault.message,
                            &mut requeue,
                            &mut report,
                        );
                    }
                    core.queue.push(requeue);
                }
                Classification::PerAction { verdicts, .. } => {
                    let mut requeue = Vec::new();
                    for (action, verdict) in piece.into_actions().into_iter().zip(verdicts) {
                        match verdict {
                            ActionVerdict::Success { status_code } => {
                                core.notifier.action_succeeded(&action, status_code);
                                report.succeeded += 1;
                            }
                            ActionVerdict::Retryable {
                                status_code,
                                message,
                            } => retry_or_dead_letter(
                                core,
                                action,
                                status_code,
                                &message,
                                &mut requeue,
                                &mut report,
                            ),
                            ActionVerdict::Terminal {
                                status_code,
                                message,
                            } => {
                                debug!(flush_id, key = action.key(), status_code, "terminal failure");
                                core.notifier.action_error(
                                    &action,
                                    &ActionError::TerminalService {
                                        status_code,
                                        message,
                                    },
                                );
                                report.failed += 1;
                            }
                        }
                    }
                    core.queue.push(requeue);
                }
            }
        }
    }

    if !report.throttled && !report.cancelled {
        core.retry.reset();
    }
    report.elapsed = start.elapsed();
    info!(
        flush_id,
        actions_sent = report.actions_sent,
        succeeded = report.succeeded,
        failed = report.failed,
        requeued = report.requeued,
        splits = report.splits,
        throttled = report.throttled,
        duration_ms = report.elapsed.as_millis() as u64,
        "flush round finished"
    );
    report
}

fn retry_or_dead_letter<T>(
    core: &SenderCore<T>,
    mut action: PendingAction<T>,
    status_code: Option<u16>,
    message: &str,
    requeue: &mut Vec<PendingAction<T>>,
    report: &mut FlushReport,
) {
    match core.retry.record_failure(&mut action) {
        RetryDecision::Requeue => {
            report.requeued += 1;
            requeue.push(action);
        }
        RetryDecision::DeadLetter => {
            warn!(
                key = action.key(),
                attempts = action.attempts(),
                ?status_code,
                "retries exhausted, dropping action"
            );
            let error = ActionError::RetryableService {
                status_code,
                attempts: action.attempts(),
                message: message.to_string(),
            };
            core.notifier.action_error(&action, &error);
            report.failed += 1;
        }
    }
}
