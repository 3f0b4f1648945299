use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OtsuError>;

/// Error taxonomy for the processing and metrics engines.
///
/// Validation errors are raised before any heavy computation; image-data
/// errors describe degenerate or uniform pixel content discovered along the
/// way; timeout/cancellation come from the asynchronous entry point.
#[derive(Debug, Error)]
pub enum OtsuError {
    /// A parameter or image shape failed a range/shape/type check.
    #[error("{context}: invalid {field} = {value}: {reason}")]
    Validation {
        /// Operation that performed the check.
        context: String,
        /// Offending field name.
        field: String,
        /// Stringified offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Pixel data is degenerate (empty, uniform, wrong channel count).
    #[error("{context}: {issue} ({info})")]
    ImageData {
        context: String,
        issue: String,
        info: String,
    },

    /// The processing deadline elapsed before the strategy finished.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The caller's cancellation token fired.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// A mid-pipeline fault with no applicable fallback.
    #[error("{context}: {message}")]
    Computation { context: String, message: String },
}

impl OtsuError {
    pub fn validation(
        context: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            context: context.into(),
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn image_data(
        context: impl Into<String>,
        issue: impl Into<String>,
        info: impl Into<String>,
    ) -> Self {
        Self::ImageData {
            context: context.into(),
            issue: issue.into(),
            info: info.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn computation(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Computation {
            context: context.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_message_names_field_and_reason() {
        let err = OtsuError::validation("process_image", "window_size", 4, "must be odd");
        let msg = err.to_string();
        assert!(msg.contains("window_size"));
        assert!(msg.contains("must be odd"));
    }

    #[test]
    fn timeout_error_reports_operation() {
        let err = OtsuError::timeout("single-scale", Duration::from_secs(30));
        assert!(err.to_string().contains("single-scale"));
    }
}
