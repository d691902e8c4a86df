//! Error types for `camsync`
//!
//! This module defines the error taxonomy shared by the parameter store, the
//! command runner, the scheduler and the apply handler.
//!
//! Validation errors (`OutOfRange`) are local and immediate. Failures of the
//! external control tool are absorbed into per-parameter state by the callers and
//! only surface here when a caller explicitly asks for them.

use crate::device::CommandError;
use crate::params::ControlledParameter;
use thiserror::Error;

/// Simple error type for wrapping string messages while implementing `std::error::Error`
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StringError(pub String);

impl StringError {
    /// Create a new `StringError` from a string message
    pub fn new(msg: impl Into<String>) -> Box<Self> {
        Box::new(Self(msg.into()))
    }
}

/// Main error type for `camsync`
#[derive(Debug, Error)]
pub enum CamSyncError {
    /// Requested value lies outside the parameter's declared bound
    #[error("{param} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Parameter the request was made for
        param: ControlledParameter,
        /// Rejected value
        value: i64,
        /// Inclusive lower bound
        min: i64,
        /// Inclusive upper bound
        max: i64,
    },

    /// The video device node for the configured index does not exist
    #[error("Video device /dev/video{index} is not available")]
    DeviceUnavailable {
        /// Device index that was requested
        index: u32,
    },

    /// The external control invocation failed
    #[error("Device control command failed: {0}")]
    Command(#[source] CommandError),

    /// Configuration error
    /// Preserves the underlying error source for full error chain transparency
    #[error("Configuration error: {0}")]
    ConfigError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<CommandError> for CamSyncError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::DeviceUnavailable { index } => Self::DeviceUnavailable { index },
            other => Self::Command(other),
        }
    }
}

/// Result type alias for `camsync` operations
pub type Result<T> = std::result::Result<T, CamSyncError>;

/// Convert an error to a user-friendly message
///
/// The messages are printed on the console front end, so they carry a hint
/// about what the user can do next.
pub fn get_user_friendly_error(error: &CamSyncError) -> String {
    match error {
        CamSyncError::OutOfRange {
            param,
            value,
            min,
            max,
        } => format!(
            "{} must be between {min} and {max} {unit} (got {value}).\n\
             The current target was left unchanged.",
            param.label(),
            unit = param.unit(),
        ),
        CamSyncError::DeviceUnavailable { index } => format!(
            "Camera /dev/video{index} is not available.\n\n\
             Please check the device index and permissions, then type `resume`\n\
             to restart background synchronization."
        ),
        CamSyncError::Command(CommandError::ToolNotFound { tool }) => format!(
            "`{tool}` was not found.\n\n\
             Please install v4l-utils (e.g. `sudo apt install v4l-utils`)."
        ),
        CamSyncError::Command(e) => format!(
            "The camera rejected the setting:\n\n{e}\n\n\
             It will be retried automatically."
        ),
        CamSyncError::ConfigError(e) => format!(
            "Invalid configuration:\n\n{e}\n\n\
             Defaults will be used where possible."
        ),
        CamSyncError::IoError(e) => format!(
            "A file system error occurred:\n\n{e}\n\n\
             Please check file permissions and disk space."
        ),
        CamSyncError::JsonError(e) => format!(
            "Configuration file is corrupted:\n\n{e}\n\n\
             The application will use default settings."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_out_of_range_message_mentions_bounds() {
        let error = CamSyncError::OutOfRange {
            param: ControlledParameter::Exposure,
            value: 70000,
            min: 1,
            max: 65523,
        };
        assert_eq!(error.to_string(), "exposure value 70000 is out of range [1, 65523]");

        let message = get_user_friendly_error(&error);
        assert!(message.contains("between 1 and 65523 us"));
        assert!(message.contains("left unchanged"));
    }

    #[test]
    fn test_device_unavailable_is_lifted_out_of_command_error() {
        let error: CamSyncError = CommandError::DeviceUnavailable { index: 3 }.into();
        assert!(matches!(error, CamSyncError::DeviceUnavailable { index: 3 }));
    }

    #[test]
    fn test_other_command_errors_keep_their_source() {
        use std::error::Error as _;

        let error: CamSyncError = CommandError::TimedOut {
            after: Duration::from_secs(2),
        }
        .into();
        assert!(matches!(error, CamSyncError::Command(_)));
        assert!(error.source().is_some());
        assert!(get_user_friendly_error(&error).contains("retried automatically"));
    }

    #[test]
    fn test_missing_tool_message_has_install_hint() {
        let error = CamSyncError::Command(CommandError::ToolNotFound {
            tool: "v4l2-ctl".to_string(),
        });
        let message = get_user_friendly_error(&error);
        assert!(message.contains("v4l2-ctl"));
        assert!(message.contains("v4l-utils"));
    }
}
