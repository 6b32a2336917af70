//! Action lifecycle notifications.
//!
//! Four callback hooks mirror the lifecycle of a queued action:
//!
//! | Hook | Fires |
//! |------|-------|
//! | `on_action_added` | once, when the action is accepted by the queue |
//! | `on_action_sent` | before every transmission attempt that includes the action |
//! | `on_action_succeeded` | once, at successful resolution |
//! | `on_action_error` | once, when the action is abandoned |
//!
//! Callbacks run synchronously inside the flush round. A panicking callback is
//! caught and logged; it never aborts the round for other actions. The same
//! transitions are published as [`IndexingEvent`]s on a broadcast channel for
//! consumers that prefer a stream.

use crate::error::ActionError;
use crate::types::PendingAction;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::warn;

pub type ActionCallback<T> = Arc<dyn Fn(&PendingAction<T>) + Send + Sync>;
pub type ActionErrorCallback<T> = Arc<dyn Fn(&PendingAction<T>, &ActionError) + Send + Sync>;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    ActionAdded,
    ActionSent,
    ActionSucceeded,
    ActionError,
}

impl HookType {
    fn name(&self) -> &'static str {
        match self {
            HookType::ActionAdded => "on_action_added",
            HookType::ActionSent => "on_action_sent",
            HookType::ActionSucceeded => "on_action_succeeded",
            HookType::ActionError => "on_action_error",
        }
    }
}

/// Payload-free view of a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingEvent {
    pub key: String,
    pub kind: IndexingEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingEventKind {
    Added,
    /// `attempt` is 1 for the first transmission.
    Sent { attempt: u32 },
    Succeeded { status_code: u16 },
    Failed(ActionError),
}

pub struct EventNotifier<T> {
    added: RwLock<Vec<ActionCallback<T>>>,
    sent: RwLock<Vec<ActionCallback<T>>>,
    succeeded: RwLock<Vec<ActionCallback<T>>>,
    error: RwLock<Vec<ActionErrorCallback<T>>>,
    events: broadcast::Sender<IndexingEvent>,
}

impl<T> EventNotifier<T> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            added: RwLock::new(Vec::new()),
            sent: RwLock::new(Vec::new()),
            succeeded: RwLock::new(Vec::new()),
            error: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn on_action_added(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        let cb: ActionCallback<T> = Arc::new(f);
        push(&self.added, cb);
    }

    pub fn on_action_sent(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        let cb: ActionCallback<T> = Arc::new(f);
        push(&self.sent, cb);
    }

    pub fn on_action_succeeded(&self, f: impl Fn(&PendingAction<T>) + Send + Sync + 'static) {
        let cb: ActionCallback<T> = Arc::new(f);
        push(&self.succeeded, cb);
    }

    pub fn on_action_error(
        &self,
        f: impl Fn(&PendingAction<T>, &ActionError) + Send + Sync + 'static,
    ) {
        let cb: ActionErrorCallback<T> = Arc::new(f);
        push(&self.error, cb);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexingEvent> {
        self.events.subscribe()
    }

    pub fn count(&self, hook: HookType) -> usize {
        match hook {
            HookType::ActionAdded => read_len(&self.added),
            HookType::ActionSent => read_len(&self.sent),
            HookType::ActionSucceeded => read_len(&self.succeeded),
            HookType::ActionError => read_len(&self.error),
        }
    }

    pub(crate) fn action_added(&self, action: &PendingAction<T>) {
        self.fire(HookType::ActionAdded, &self.added, action);
        self.publish(action.key(), IndexingEventKind::Added);
    }

    pub(crate) fn action_sent(&self, action: &PendingAction<T>) {
        self.fire(HookType::ActionSent, &self.sent, action);
        self.publish(
            action.key(),
            IndexingEventKind::Sent {
                attempt: action.attempts().saturating_add(1),
            },
        );
    }

    pub(crate) fn action_succeeded(&self, action: &PendingAction<T>, status_code: u16) {
        self.fire(HookType::ActionSucceeded, &self.succeeded, action);
        self.publish(action.key(), IndexingEventKind::Succeeded { status_code });
    }

    pub(crate) fn action_error(&self, action: &PendingAction<T>, error: &ActionError) {
        let callbacks = snapshot(&self.error);
        for cb in callbacks {
            if catch_unwind(AssertUnwindSafe(|| cb(action, error))).is_err() {
                warn!(hook = HookType::ActionError.name(), key = action.key(), "callback panicked");
            }
        }
        self.publish(action.key(), IndexingEventKind::Failed(error.clone()));
    }

    fn fire(&self, hook: HookType, list: &RwLock<Vec<ActionCallback<T>>>, action: &PendingAction<T>) {
        for cb in snapshot(list) {
            if catch_unwind(AssertUnwindSafe(|| cb(action))).is_err() {
                warn!(hook = hook.name(), key = action.key(), "callback panicked");
            }
        }
    }

    fn publish(&self, key: &str, kind: IndexingEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(IndexingEvent {
            key: key.to_owned(),
            kind,
        });
    }
}

impl<T> Default for EventNotifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn push<C>(list: &RwLock<Vec<C>>, cb: C) {
    list.write().unwrap_or_else(PoisonError::into_inner).push(cb);
}

fn read_len<C>(list: &RwLock<Vec<C>>) -> usize {
    list.read().unwrap_or_else(PoisonError::into_inner).len()
}

// Callbacks run outside the lock so they may register further hooks.
fn snapshot<C: Clone>(list: &RwLock<Vec<C>>) -> Vec<C> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexAction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn action(key: &str) -> PendingAction<u8> {
        PendingAction::new(key.to_string(), IndexAction::upload(0), 0)
    }

    #[test]
    fn test_callbacks_fire_per_hook() {
        let notifier: EventNotifier<u8> = EventNotifier::new();
        let added = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        {
            let added = Arc::clone(&added);
            notifier.on_action_added(move |_| {
                added.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let errors = Arc::clone(&errors);
            notifier.on_action_error(move |a, e| {
                assert_eq!(a.key(), "k");
                assert_eq!(*e, ActionError::OversizePayload);
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }

        let a = action("k");
        notifier.action_added(&a);
        notifier.action_sent(&a);
        notifier.action_error(&a, &ActionError::OversizePayload);

        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.count(HookType::ActionAdded), 1);
        assert_eq!(notifier.count(HookType::ActionSent), 0);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let notifier: EventNotifier<u8> = EventNotifier::new();
        let reached = Arc::new(AtomicUsize::new(0));
        notifier.on_action_succeeded(|_| panic!("listener bug"));
        {
            let reached = Arc::clone(&reached);
            notifier.on_action_succeeded(move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
            });
        }
        notifier.action_succeeded(&action("k"), 200);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_events_are_broadcast() {
        let notifier: EventNotifier<u8> = EventNotifier::new();
        let mut rx = notifier.subscribe();
        let a = action("doc");
        notifier.action_added(&a);
        notifier.action_sent(&a);
        notifier.action_succeeded(&a, 201);

        assert_eq!(rx.try_recv().unwrap().kind, IndexingEventKind::Added);
        assert_eq!(
            rx.try_recv().unwrap().kind,
            IndexingEventKind::Sent { attempt: 1 }
        );
        let done = rx.try_recv().unwrap();
        assert_eq!(done.key, "doc");
        assert_eq!(done.kind, IndexingEventKind::Succeeded { status_code: 201 });
    }
}
