//! Oversize batch splitting.

use super::builder::Batch;
use crate::types::PendingAction;

/// Split a batch of `N` actions into `ceil(N/2)` and `floor(N/2)`, keeping order.
pub fn split<T>(batch: Batch<T>) -> (Batch<T>, Batch<T>) {
    let mut left = batch.into_actions();
    let right = left.split_off((left.len() + 1) / 2);
    (Batch::from_actions(left), Batch::from_actions(right))
}

/// Pieces of one built batch that still await transmission.
///
/// Replaces recursion: an oversize piece is replaced by its two halves, left half
/// on top, so halves are sent in their original relative order. Depth is bounded
/// by `log2(N) + 1` because every split halves the piece and single actions are
/// never split.
#[derive(Debug)]
pub struct SplitStack<T> {
    pieces: Vec<(Batch<T>, u32)>,
}

impl<T> SplitStack<T> {
    pub fn new(root: Batch<T>) -> Self {
        let mut pieces = Vec::new();
        if !root.is_empty() {
            pieces.push((root, 0));
        }
        Self { pieces }
    }

    /// The next piece to transmit, left in place until [`SplitStack::pop`].
    pub fn peek(&self) -> Option<&Batch<T>> {
        self.pieces.last().map(|(b, _)| b)
    }

    pub fn pop(&mut self) -> Option<(Batch<T>, u32)> {
        self.pieces.pop()
    }

    /// Replace an oversize piece by its halves.
    ///
    /// Returns the single action back when the piece cannot be split further.
    pub fn split_piece(&mut self, batch: Batch<T>, depth: u32) -> Result<(), PendingAction<T>> {
        if batch.len() <= 1 {
            return match batch.into_actions().pop() {
                Some(action) => Err(action),
                None => Ok(()),
            };
        }
        let (left, right) = split(batch);
        self.pieces.push((right, depth + 1));
        self.pieces.push((left, depth + 1));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Remove every unsent action.
    pub fn drain_actions(&mut self) -> Vec<PendingAction<T>> {
        self.pieces
            .drain(..)
            .flat_map(|(b, _)| b.into_actions())
            .collect()
    }
}
