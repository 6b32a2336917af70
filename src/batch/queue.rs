//! Action queue.

use super::builder::{Batch, BatchBuilder, RoundFilter};
use crate::types::{IndexAction, KeyExtractor, PendingAction};
use crate::{Error, ErrorContext, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Insertion-ordered store of pending actions.
///
/// Duplicate keys are kept side by side. Entries are ordered by their insertion
/// sequence, including entries put back after a retryable failure, so an older
/// write for a key is always considered before a newer one.
pub struct ActionQueue<T> {
    key_extractor: KeyExtractor<T>,
    items: Mutex<VecDeque<PendingAction<T>>>,
    next_sequence: AtomicU64,
}

impl<T> ActionQueue<T> {
    pub fn new(key_extractor: KeyExtractor<T>) -> Self {
        Self {
            key_extractor,
            items: Mutex::new(VecDeque::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<PendingAction<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Extract keys and assign sequences without touching the queue.
    ///
    /// Fails with [`Error::InvalidKey`] if any document yields no key; in that
    /// case none of the actions is accepted.
    pub fn prepare<I>(&self, actions: I) -> Result<Vec<PendingAction<T>>>
    where
        I: IntoIterator<Item = IndexAction<T>>,
    {
        let mut keyed = Vec::new();
        for (index, action) in actions.into_iter().enumerate() {
            match (self.key_extractor)(&action.document) {
                Some(key) if !key.is_empty() => keyed.push((key, action)),
                _ => {
                    return Err(Error::invalid_key_with_context(
                        "document key is missing or empty",
                        ErrorContext::new()
                            .with_field_path(format!("actions[{}]", index))
                            .with_details(format!("action type: {}", action.action_type))
                            .with_source("action_queue"),
                    ))
                }
            }
        }

        let first = self
            .next_sequence
            .fetch_add(keyed.len() as u64, Ordering::SeqCst);
        Ok(keyed
            .into_iter()
            .enumerate()
            .map(|(i, (key, action))| PendingAction::new(key, action, first + i as u64))
            .collect())
    }

    /// Insert prepared or returning actions in sequence order. Returns the new length.
    pub fn push(&self, actions: Vec<PendingAction<T>>) -> usize {
        let mut items = self.items();
        for action in actions {
            let at_back = items
                .back()
                .map(|last| last.sequence() < action.sequence())
                .unwrap_or(true);
            if at_back {
                items.push_back(action);
            } else {
                let pos = items.partition_point(|p| p.sequence() < action.sequence());
                items.insert(pos, action);
            }
        }
        items.len()
    }

    /// Prepare and push in one step. Returns the new length.
    pub fn enqueue<I>(&self, actions: I) -> Result<usize>
    where
        I: IntoIterator<Item = IndexAction<T>>,
    {
        let prepared = self.prepare(actions)?;
        Ok(self.push(prepared))
    }

    /// Sequence that the next enqueued action will receive.
    pub fn watermark(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    pub fn take_batch(&self, builder: &BatchBuilder) -> Batch<T> {
        self.take_round_batch(builder, &RoundFilter::default())
    }

    pub fn take_round_batch(&self, builder: &BatchBuilder, filter: &RoundFilter) -> Batch<T> {
        let mut items = self.items();
        builder.build(&mut items, filter)
    }

    /// Keys currently queued, in order.
    pub fn keys(&self) -> Vec<String> {
        self.items().iter().map(|a| a.key().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn queue() -> ActionQueue<String> {
        ActionQueue::new(Arc::new(|doc: &String| {
            doc.split(':').next().map(|k| k.to_string())
        }))
    }

    #[test]
    fn test_enqueue_preserves_order_and_duplicates() {
        let q = queue();
        let len = q
            .enqueue(vec![
                IndexAction::upload("a:1".to_string()),
                IndexAction::upload("b:1".to_string()),
                IndexAction::merge("a:2".to_string()),
            ])
            .unwrap();
        assert_eq!(len, 3);
        assert_eq!(q.keys(), vec!["a", "b", "a"]);
        assert_eq!(q.watermark(), 3);
    }

    #[test]
    fn test_empty_key_rejects_whole_call() {
        let q = queue();
        let err = q
            .enqueue(vec![
                IndexAction::upload("a:1".to_string()),
                IndexAction::upload(":orphan".to_string()),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.clone()),
            Some("actions[1]".to_string())
        );
        assert!(q.is_empty());
    }

    #[test]
    fn test_missing_key_is_invalid() {
        let q: ActionQueue<Option<String>> = ActionQueue::new(Arc::new(|d: &Option<String>| d.clone()));
        assert!(q.enqueue(vec![IndexAction::delete(None)]).is_err());
        assert!(q.enqueue(vec![IndexAction::delete(Some("k".into()))]).is_ok());
    }

    #[test]
    fn test_returned_actions_go_back_in_sequence_order() {
        let q = queue();
        q.enqueue((0..4).map(|i| IndexAction::upload(format!("k{}:x", i))))
            .unwrap();
        let batch = q.take_batch(&BatchBuilder::new(2));
        assert_eq!(q.keys(), vec!["k2", "k3"]);

        q.push(batch.into_actions());
        assert_eq!(q.keys(), vec!["k0", "k1", "k2", "k3"]);
    }

    #[test]
    fn test_concurrent_enqueue() {
        use std::thread;

        let q = Arc::new(queue());
        let mut handles = vec![];
        for t in 0..8 {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..25 {
                    q.enqueue(vec![IndexAction::upload(format!("t{}-{}:v", t, i))])
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.len(), 200);
        let batch = q.take_batch(&BatchBuilder::new(500));
        let seqs: Vec<u64> = batch.actions().iter().map(|a| a.sequence()).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }
}
