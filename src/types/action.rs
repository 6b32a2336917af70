//! Index actions and their per-action results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of mutation applied to a single document.
///
/// Serialized with the wire names used by the `@search.action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "upload")]
    Upload,
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "mergeOrUpload")]
    MergeOrUpload,
    #[serde(rename = "delete")]
    Delete,
}

impl ActionType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Merge => "merge",
            Self::MergeOrUpload => "mergeOrUpload",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested mutation against a keyed document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexAction<T> {
    pub action_type: ActionType,
    pub document: T,
}

impl<T> IndexAction<T> {
    pub fn new(action_type: ActionType, document: T) -> Self {
        Self {
            action_type,
            document,
        }
    }

    pub fn upload(document: T) -> Self {
        Self::new(ActionType::Upload, document)
    }

    pub fn merge(document: T) -> Self {
        Self::new(ActionType::Merge, document)
    }

    pub fn merge_or_upload(document: T) -> Self {
        Self::new(ActionType::MergeOrUpload, document)
    }

    pub fn delete(document: T) -> Self {
        Self::new(ActionType::Delete, document)
    }
}

/// Derives the unique key of a document. `None` or an empty string rejects the document.
pub type KeyExtractor<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// An action owned by the queue until it is terminally resolved.
#[derive(Debug, Clone)]
pub struct PendingAction<T> {
    pub(crate) key: String,
    pub(crate) action: IndexAction<T>,
    pub(crate) attempts: u32,
    pub(crate) sequence: u64,
}

impl<T> PendingAction<T> {
    pub(crate) fn new(key: String, action: IndexAction<T>, sequence: u64) -> Self {
        Self {
            key,
            action,
            attempts: 0,
            sequence,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn action(&self) -> &IndexAction<T> {
        &self.action
    }

    pub fn action_type(&self) -> ActionType {
        self.action.action_type
    }

    pub fn document(&self) -> &T {
        &self.action.document
    }

    /// Number of completed transmission attempts that ended in a retryable failure.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Monotonic position assigned at enqueue time.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Outcome of one action inside a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub key: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ActionResult {
    pub fn new(key: impl Into<String>, status_code: u16) -> Self {
        Self {
            key: key.into(),
            status_code,
            error_message: None,
        }
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
