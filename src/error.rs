use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.initial_batch_action_count")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "action_queue", "sender_builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the sender.
///
/// Only caller-facing failures live here. Failures of individual actions are
/// reported through [`ActionError`] and the `on_action_error` callback instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid document key: {message}{}", format_context(.context))]
    InvalidKey {
        message: String,
        context: ErrorContext,
    },

    #[error("Illegal state: {message}{}", format_context(.context))]
    IllegalState {
        message: String,
        context: ErrorContext,
    },

    #[error("Flush did not complete within {}ms", format_millis(.timeout))]
    FlushTimeout { timeout: Duration },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_millis(d: &Duration) -> u128 {
    d.as_millis()
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn invalid_key_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::InvalidKey {
            message: msg.into(),
            context,
        }
    }

    pub fn illegal_state_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::IllegalState {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::InvalidKey { context, .. }
            | Error::IllegalState { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Error::IllegalState { .. })
    }

    pub fn is_flush_timeout(&self) -> bool {
        matches!(self, Error::FlushTimeout { .. })
    }
}

/// Why a single action was abandoned.
///
/// Handed to `on_action_error`; never returned from `flush`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Transient failure (409/422/503 or a transport fault) that outlived the retry budget.
    #[error("retryable service error{} after {attempts} attempts: {message}", format_status(.status_code))]
    RetryableService {
        status_code: Option<u16>,
        attempts: u32,
        message: String,
    },

    /// The service rejected a batch holding only this action as too large.
    #[error("document payload too large to index")]
    OversizePayload,

    /// Permanent rejection such as 400 or 404.
    #[error("terminal service error (status {status_code}): {message}")]
    TerminalService { status_code: u16, message: String },
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" (status {})", s),
        None => String::new(),
    }
}

impl ActionError {
    /// Status code reported by the service, if there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ActionError::RetryableService { status_code, .. } => *status_code,
            ActionError::OversizePayload => Some(413),
            ActionError::TerminalService { status_code, .. } => Some(*status_code),
        }
    }
}
