//! Core data types shared by the queue, the batcher and the transmission channel.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ActionType`] | Kind of mutation (upload, merge, merge-or-upload, delete) |
//! | [`IndexAction`] | One requested mutation carrying an opaque document |
//! | [`PendingAction`] | A queued action with its key, attempt count and insertion sequence |
//! | [`ActionResult`] | Per-action outcome reported by the service |
//! | [`KeyExtractor`] | Caller-supplied function deriving a document's key |

pub mod action;

pub use action::{ActionResult, ActionType, IndexAction, KeyExtractor, PendingAction};
