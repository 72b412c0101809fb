//! Error types for the presence subscription client
//!
//! Errors are grouped so the subscription layer can decide between
//! retrying and giving up:
//!
//! - **Resolution errors** - route lookup failed, always retried after a short jitter
//! - **Authentication errors** - 401/403/407 on the dialog, never retried
//! - **Dialog errors** - the engine could not create or drive the SUBSCRIBE dialog
//! - **Configuration errors** - unknown or disabled account, abort startup
//!
//! ```rust
//! use sipim_presence_core::PresenceError;
//!
//! let err = PresenceError::AuthenticationFailed { code: 407, reason: "Proxy Authentication Required".to_string() };
//! assert!(!err.is_recoverable());
//! assert_eq!(err.category(), "authentication");
//! ```

use thiserror::Error;

/// Result type for presence operations
pub type PresenceResult<T> = Result<T, PresenceError>;

/// Failure reported by a [`Resolver`](crate::engine::Resolver)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The name could not be resolved at all
    #[error("lookup of {target} failed: {reason}")]
    LookupFailed { target: String, reason: String },

    /// The lookup succeeded but produced no usable route
    #[error("no routes found for {target}")]
    NoRoutes { target: String },

    /// The lookup did not complete in time
    #[error("lookup of {target} timed out")]
    Timeout { target: String },
}

/// Errors that can occur in the presence client
#[derive(Error, Debug, Clone)]
pub enum PresenceError {
    #[error("Route resolution failed: {0}")]
    ResolutionFailed(#[from] ResolutionError),

    #[error("Authentication failed: {code} {reason}")]
    AuthenticationFailed { code: u16, reason: String },

    #[error("Illegal SIP URI: {uri}")]
    MalformedUri { uri: String },

    #[error("Dialog error: {reason}")]
    Dialog { reason: String },

    #[error("Invalid subscription state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Invalid configuration: {field} - {reason}")]
    Configuration { field: String, reason: String },

    #[error("unknown account {name}. Available accounts: {available}")]
    UnknownAccount { name: String, available: String },

    #[error("account {name} is not enabled")]
    AccountDisabled { name: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PresenceError {
    pub fn malformed_uri(uri: impl Into<String>) -> Self {
        Self::MalformedUri { uri: uri.into() }
    }

    pub fn dialog(reason: impl Into<String>) -> Self {
        Self::Dialog { reason: reason.into() }
    }

    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the subscription layer should keep trying after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            PresenceError::ResolutionFailed(_) | PresenceError::Dialog { .. } => true,

            PresenceError::AuthenticationFailed { .. }
            | PresenceError::MalformedUri { .. }
            | PresenceError::Configuration { .. }
            | PresenceError::UnknownAccount { .. }
            | PresenceError::AccountDisabled { .. } => false,

            _ => false,
        }
    }

    /// Whether this error must abort startup entirely
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(
            self,
            PresenceError::UnknownAccount { .. }
                | PresenceError::AccountDisabled { .. }
                | PresenceError::Configuration { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            PresenceError::ResolutionFailed(_) => "resolution",
            PresenceError::AuthenticationFailed { .. } => "authentication",
            PresenceError::MalformedUri { .. } => "protocol",
            PresenceError::Dialog { .. } => "dialog",
            PresenceError::InvalidState { .. } => "state",
            PresenceError::Configuration { .. }
            | PresenceError::UnknownAccount { .. }
            | PresenceError::AccountDisabled { .. } => "configuration",
            PresenceError::Internal { .. } => "internal",
        }
    }
}

/// Status codes that end a subscription without any retry
pub const AUTHENTICATION_FAILURE_CODES: [u16; 3] = [401, 403, 407];

/// Whether a terminal dialog status is an authentication failure
pub fn is_authentication_failure(code: u16) -> bool {
    AUTHENTICATION_FAILURE_CODES.contains(&code)
}
