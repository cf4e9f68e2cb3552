//! Error types for switch driver operations.
//!
//! This module defines the error taxonomy shared by every switch driver and
//! by the reconciliation engine. All errors implement `std::error::Error` via
//! `thiserror`.

use thiserror::Error;

use crate::types::SwitchModel;

/// Result type alias for switch operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Errors that can occur while talking to a switch.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Login was rejected or the post-login marker was missing.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Diagnostic text from the device, if any.
        message: String,
    },

    /// The device answered with something that does not match the expected
    /// page or form shape.
    #[error("Unexpected device response during {operation}: {message}")]
    Protocol {
        /// The primitive that received the response (e.g., "delete_vlans").
        operation: String,
        /// Device error message or raw response text.
        message: String,
    },

    /// Caller supplied malformed input.
    #[error("Invalid input for {field}: {message}")]
    Validation {
        /// The argument that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A primitive was called without an authenticated session.
    #[error("Operation '{operation}' requires an authenticated session")]
    NotLoggedIn {
        /// The primitive that was refused.
        operation: String,
    },

    /// The switch model does not offer this primitive.
    #[error("Operation '{operation}' is not supported on {model}")]
    Unsupported {
        /// The primitive that was refused.
        operation: String,
        /// The model of the switch.
        model: SwitchModel,
    },

    /// The HTTP exchange itself failed (connection refused, timeout, bad status).
    #[error("Transport failure during {operation}: {message}")]
    Transport {
        /// The primitive that was being executed.
        operation: String,
        /// Error message.
        message: String,
    },
}

impl SwitchError {
    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a session state error.
    pub fn not_logged_in(operation: impl Into<String>) -> Self {
        Self::NotLoggedIn {
            operation: operation.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>, model: SwitchModel) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            model,
        }
    }

    /// Creates a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    ///
    /// Nothing at the driver layer is retried: a half-applied plan is
    /// recovered by restoring a backup, not by replaying single calls.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
