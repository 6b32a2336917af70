use crate::resilience::BackoffSnapshot;

/// Lifecycle of a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting actions; no flush running.
    Idle,
    /// Accepting actions; a flush round holds the coordinator.
    Flushing,
    /// `close` is draining the queue; new work is rejected.
    Closing,
    Closed,
}

impl LifecycleState {
    pub fn accepts_work(&self) -> bool {
        matches!(self, LifecycleState::Idle | LifecycleState::Flushing)
    }
}

/// Point-in-time view of a sender, facts only.
#[derive(Debug, Clone)]
pub struct SenderSnapshot {
    pub state: LifecycleState,
    pub queued_actions: usize,
    pub backoff: BackoffSnapshot,
}
