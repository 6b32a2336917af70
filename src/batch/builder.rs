//! Batch builder.

use crate::types::PendingAction;
use std::collections::{HashSet, VecDeque};

/// Ordered subset of queued actions selected for one transmission attempt.
///
/// Holds at most one action per key.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    actions: Vec<PendingAction<T>>,
}

impl<T> Batch<T> {
    pub(crate) fn from_actions(actions: Vec<PendingAction<T>>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[PendingAction<T>] {
        &self.actions
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.key())
    }

    pub fn into_actions(self) -> Vec<PendingAction<T>> {
        self.actions
    }
}

/// Extra eligibility rules applied while building batches inside one flush round.
#[derive(Debug, Clone, Default)]
pub struct RoundFilter {
    /// Keys already dispatched earlier in the round.
    pub dispatched: HashSet<String>,
    /// Only entries enqueued before this sequence are considered.
    pub watermark: Option<u64>,
}

impl RoundFilter {
    pub fn new(watermark: u64) -> Self {
        Self {
            dispatched: HashSet::new(),
            watermark: Some(watermark),
        }
    }

    fn admits<T>(&self, action: &PendingAction<T>) -> bool {
        if let Some(w) = self.watermark {
            if action.sequence() >= w {
                return false;
            }
        }
        !self.dispatched.contains(action.key())
    }

    /// Record the keys of a batch about to be transmitted.
    pub fn mark_dispatched<T>(&mut self, batch: &Batch<T>) {
        self.dispatched.extend(batch.keys().map(str::to_owned));
    }
}

/// Selects key-unique batches from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBuilder {
    max_count: usize,
}

impl BatchBuilder {
    pub fn new(initial_batch_action_count: usize) -> Self {
        Self {
            max_count: initial_batch_action_count.max(1),
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Remove the next batch from `queue`.
    ///
    /// Scans in insertion order and takes entries until `max_count` are collected,
    /// skipping any entry whose key is already in the batch or rejected by `filter`.
    /// Skipped entries keep their relative position in the queue.
    pub fn build<T>(&self, queue: &mut VecDeque<PendingAction<T>>, filter: &RoundFilter) -> Batch<T> {
        let mut selected = Vec::with_capacity(self.max_count.min(queue.len()));
        let mut keys: HashSet<String> = HashSet::with_capacity(selected.capacity());
        let mut kept = VecDeque::with_capacity(queue.len());

        for action in queue.drain(..) {
            if selected.len() < self.max_count
                && filter.admits(&action)
                && !keys.contains(action.key())
            {
                keys.insert(action.key().to_owned());
                selected.push(action);
            } else {
                kept.push_back(action);
            }
        }

        *queue = kept;
        Batch::from_actions(selected)
    }
}

/// Build one batch of at most `max_count` key-unique actions from `queue`.
pub fn build_batch<T>(queue: &mut VecDeque<PendingAction<T>>, max_count: usize) -> Batch<T> {
    BatchBuilder::new(max_count).build(queue, &RoundFilter::default())
}
