//! Error types for view generation
//!
//! - `MalformedInputError` - per record, per generator; recovered locally
//! - `PublishError` - per record, per view type; retried when transient
//! - `ConfigurationError` - process level; fatal at startup

use std::time::Duration;

use thiserror::Error;

use super::view::ViewType;

/// A field required by a generator's contract is absent or invalid.
///
/// Distinct from "not applicable": the record claims to be something the
/// view covers but cannot be projected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed input for {view_type} view: field '{field}' {reason}")]
pub struct MalformedInputError {
    pub view_type: ViewType,
    pub field: &'static str,
    pub reason: String,
}

impl MalformedInputError {
    pub fn missing(view_type: ViewType, field: &'static str) -> Self {
        Self {
            view_type,
            field,
            reason: "is missing".to_string(),
        }
    }

    pub fn invalid(view_type: ViewType, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            view_type,
            field,
            reason: reason.into(),
        }
    }
}

/// Failure publishing a view record to its output channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Channel temporarily unavailable
    #[error("channel '{channel}' unavailable: {message}")]
    Transient { channel: String, message: String },

    /// No acknowledgement within the publish timeout
    #[error("publish to '{channel}' timed out after {}ms", timeout.as_millis())]
    Timeout { channel: String, timeout: Duration },

    /// Record could not be encoded
    #[error("failed to serialize view record: {0}")]
    Serialization(String),

    /// Local write failure (file sink)
    #[error("io error on channel '{channel}': {message}")]
    Io { channel: String, message: String },

    /// The registry has no channel for the record's view type
    #[error("no output channel bound for view type '{0}'")]
    Unbound(ViewType),
}

impl PublishError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Startup-time configuration problem; the pipeline refuses to start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("view type '{0}' has no resolvable output channel")]
    UnresolvedChannel(ViewType),

    #[error("view types '{first}' and '{second}' are bound to the same channel '{channel}'")]
    DuplicateChannel {
        first: ViewType,
        second: ViewType,
        channel: String,
    },

    #[error("view type '{0}' has more than one registered generator")]
    DuplicateGenerator(ViewType),

    #[error("view type '{0}' has no registered generator")]
    MissingGenerator(ViewType),

    #[error("view type '{0}' has a generator but no registered schema")]
    MissingSchema(ViewType),

    #[error("no view types are enabled")]
    NoViewsEnabled,

    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = PublishError::Transient {
            channel: "api-call-view".into(),
            message: "broker down".into(),
        };
        let timeout = PublishError::Timeout {
            channel: "api-call-view".into(),
            timeout: Duration::from_millis(50),
        };
        assert!(transient.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!PublishError::Serialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_configuration_error_names_view() {
        let err = ConfigurationError::UnresolvedChannel(ViewType::BackendCall);
        assert_eq!(
            err.to_string(),
            "view type 'backend_call' has no resolvable output channel"
        );
    }

    #[test]
    fn test_malformed_display() {
        let err = MalformedInputError::missing(ViewType::ApiCall, "operation_name");
        assert_eq!(
            err.to_string(),
            "malformed input for api_call view: field 'operation_name' is missing"
        );
    }
}
