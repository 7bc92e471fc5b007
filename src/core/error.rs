//! Error types for the core module.

use std::time::Duration;

/// Failure of a single script execution against the automation bridge.
///
/// A `Timeout` is indeterminate: the application may still have completed
/// the action after the wait expired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The bridge could not be reached or the application is not available.
    #[error("application unavailable: {0}")]
    ApplicationUnavailable(String),

    /// The bridge rejected or failed to run the script.
    #[error("script error: {0}")]
    ScriptError(String),

    /// The script did not finish within the configured wait.
    #[error("timed out after {0:?}; the action may still complete")]
    Timeout(Duration),

    /// Non-zero exit with no recognizable diagnostic.
    #[error("execution failed with no diagnostic (exit status {0})")]
    UnknownExecutionFailure(i32),
}

impl ExecutionError {
    /// Stable identifier reported to callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ApplicationUnavailable(_) => "application_unavailable",
            Self::ScriptError(_) => "script_error",
            Self::Timeout(_) => "timeout",
            Self::UnknownExecutionFailure(_) => "unknown_execution_failure",
        }
    }
}

/// Failure of one dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No command with this name exists.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required parameter was absent.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// A parameter failed its type or value constraint.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The script could not be executed to completion.
    #[error(transparent)]
    AutomationFailure(#[from] ExecutionError),

    /// The script ran but the application refused the command.
    #[error("command rejected by application: {0}")]
    CommandRejected(String),

    /// The script ran but its output could not be read.
    #[error("malformed output: {0}")]
    MalformedOutput(String),
}

impl DispatchError {
    /// Stable identifier reported to callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::AutomationFailure(e) => e.kind(),
            Self::CommandRejected(_) => "command_rejected",
            Self::MalformedOutput(_) => "malformed_output",
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automation_failure_reports_inner_kind() {
        let err = DispatchError::from(ExecutionError::Timeout(Duration::from_secs(10)));
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("may still complete"));
    }

    #[test]
    fn invalid_parameter_message_names_parameter() {
        let err = DispatchError::invalid("limit", "must be at least 1");
        assert_eq!(err.to_string(), "invalid parameter limit: must be at least 1");
        assert_eq!(err.kind(), "invalid_parameter");
    }
}
