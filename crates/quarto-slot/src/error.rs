/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Slot error types.
 */

//! Error types for slot composition.
//!
//! [`SlotError`] is `Clone` so that a failed parse of a stage's input can be
//! memoized and handed back on every later read.

/// Error that occurs while composing a chain of stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// The serialized slot state handed between stages could not be decoded
    #[error("Malformed slot state: {0}")]
    Decode(String),

    /// The slot state could not be serialized
    #[error("Failed to encode slot state: {0}")]
    Encode(String),

    /// A handoff pipe was written to or closed after it was already closed
    #[error("Handoff pipe is already closed")]
    PipeClosed,

    /// A stage reported a failure
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// Name of the stage that failed
        stage: String,
        /// What went wrong
        message: String,
    },

    /// A stage task panicked or was aborted before it could report
    #[error("Stage '{stage}' did not complete: {message}")]
    Join {
        /// Name of the stage whose task died
        stage: String,
        /// Message from the runtime
        message: String,
    },

    /// Execution was cancelled
    #[error("Chain execution was cancelled")]
    Cancelled,

    /// Chain configuration could not be parsed
    #[error("Invalid chain config: {0}")]
    Config(String),
}

impl SlotError {
    /// Create a Stage error.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Check if this is a cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for SlotError {
    fn from(e: serde_json::Error) -> Self {
        SlotError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SlotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = SlotError::stage("layout", "template missing");
        let msg = err.to_string();
        assert!(msg.contains("layout"));
        assert!(msg.contains("template missing"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SlotError = json_err.into();
        assert!(matches!(err, SlotError::Decode(_)));
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_cancelled() {
        assert!(SlotError::Cancelled.is_cancelled());
        assert!(!SlotError::PipeClosed.is_cancelled());
    }
}
