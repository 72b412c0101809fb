//! Error types for MSRP media streams
//!
//! Errors fall into a few groups:
//!
//! - **Negotiation errors** - the remote media description lacks or mangles a
//!   required attribute; fatal for that stream only
//! - **Protocol violations** - the caller asked for something the stream
//!   cannot do (sending on a `recvonly` stream, private messages without CPIM);
//!   raised synchronously at the call site
//! - **Transport errors** - reported by the MSRP transport collaborator; a
//!   clean disconnect is not a failure

use thiserror::Error;

/// Result type for MSRP stream operations
pub type MsrpResult<T> = Result<T, MsrpError>;

/// Failure reported by the MSRP transport collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection cleanly
    #[error("Connection was closed cleanly")]
    ConnectionDone,

    #[error("I/O error: {message}")]
    Io { message: String },

    /// The session or connector was already released
    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    /// A clean disconnect ends the stream normally instead of failing it
    pub fn is_clean_disconnect(&self) -> bool {
        matches!(self, TransportError::ConnectionDone)
    }
}

/// Errors that can occur on an MSRP media stream
#[derive(Error, Debug, Clone)]
pub enum MsrpError {
    #[error("SDP negotiation failed: {reason}")]
    Negotiation { reason: String },

    #[error("{reason}")]
    ProtocolViolation { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid MSRP URI: {uri}")]
    InvalidUri { uri: String },

    #[error("Malformed CPIM message: {reason}")]
    Envelope { reason: String },

    #[error("Malformed file-selector: {reason}")]
    FileSelector { reason: String },

    #[error("Invalid stream state: {message}")]
    InvalidState { message: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl MsrpError {
    pub fn negotiation(reason: impl Into<String>) -> Self {
        Self::Negotiation { reason: reason.into() }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation { reason: reason.into() }
    }

    pub fn envelope(reason: impl Into<String>) -> Self {
        Self::Envelope { reason: reason.into() }
    }

    pub fn file_selector(reason: impl Into<String>) -> Self {
        Self::FileSelector { reason: reason.into() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }

    pub fn category(&self) -> &'static str {
        match self {
            MsrpError::Negotiation { .. } | MsrpError::FileSelector { .. } => "negotiation",
            MsrpError::ProtocolViolation { .. } => "protocol",
            MsrpError::Transport(_) => "transport",
            MsrpError::InvalidUri { .. } | MsrpError::Envelope { .. } => "format",
            MsrpError::InvalidState { .. } => "state",
            MsrpError::Configuration { .. } => "configuration",
        }
    }

    /// Status used when a queued message fails at dispatch time
    pub(crate) fn delivery_status(&self) -> u16 {
        match self {
            MsrpError::ProtocolViolation { .. } => 403,
            MsrpError::Transport(_) => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_disconnect() {
        assert!(TransportError::ConnectionDone.is_clean_disconnect());
        assert!(!TransportError::io("reset by peer").is_clean_disconnect());
        assert!(!TransportError::Closed.is_clean_disconnect());
    }

    #[test]
    fn test_categories() {
        assert_eq!(MsrpError::negotiation("no path").category(), "negotiation");
        assert_eq!(MsrpError::protocol("recvonly").category(), "protocol");
        let err: MsrpError = TransportError::Closed.into();
        assert_eq!(err.category(), "transport");
        assert_eq!(err.delivery_status(), 503);
    }
}
