//! Error types for tagscope.
//!
//! Every failure class in the pipeline is recoverable: serialization and
//! resolution failures are substituted locally, malformed rule data is
//! treated as non-matching, and missing host capabilities are reported as a
//! degraded-data state rather than an error. The variants here exist so
//! recoveries can be logged precisely and so stream consumers can pattern
//! match on timeout/disconnect.

use thiserror::Error;

/// Errors surfaced by the tagscope engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// An entry or event record could not be safely serialized.
    #[error("serialization failed: {message}")]
    Serialization {
        /// What could not be serialized.
        message: String,
    },

    /// A variable lookup failed mid-resolution.
    #[error("resolution of '{variable}' failed: {message}")]
    Resolution {
        /// The variable name or kind being resolved.
        variable: String,
        /// Underlying cause.
        message: String,
    },

    /// Trigger or condition data is missing expected fields.
    #[error("malformed rule data: {reason}")]
    MalformedRule {
        /// Which field or shape was wrong.
        reason: String,
    },

    /// A channel endpoint has gone away.
    #[error("channel disconnected: {path}")]
    Disconnected {
        /// Which channel path disconnected.
        path: String,
    },

    /// A blocking receive timed out.
    #[error("timed out after {duration_ms}ms")]
    Timeout {
        /// How long we waited.
        duration_ms: u64,
    },
}

impl ScopeError {
    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a resolution error.
    #[must_use]
    pub fn resolution(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-rule error.
    #[must_use]
    pub fn malformed_rule(reason: impl Into<String>) -> Self {
        Self::MalformedRule {
            reason: reason.into(),
        }
    }

    /// Returns true if the error is recoverable inside the pipeline.
    ///
    /// Disconnects and timeouts are consumer-facing stream conditions; the
    /// other variants are always absorbed locally.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Serialization { .. } | Self::Resolution { .. } | Self::MalformedRule { .. }
        )
    }
}

/// Result type alias for tagscope operations.
pub type ScopeResult<T> = Result<T, ScopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_error_formats_message() {
        let err = ScopeError::serialization("live host object");
        let msg = format!("{err}");
        assert!(msg.contains("serialization failed"));
        assert!(msg.contains("live host object"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn resolution_error_names_variable() {
        let err = ScopeError::resolution("timer.time", "backlog scan aborted");
        let msg = format!("{err}");
        assert!(msg.contains("timer.time"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn stream_conditions_are_not_recoverable() {
        let err = ScopeError::Disconnected {
            path: "event_stream".to_string(),
        };
        assert!(!err.is_recoverable());

        let err = ScopeError::Timeout { duration_ms: 50 };
        assert!(!err.is_recoverable());
        assert!(format!("{err}").contains("50ms"));
    }
}
