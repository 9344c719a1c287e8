//! Error types for the bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Transport could not be established
    #[error("failed to connect to world server: {0}")]
    ConnectFailed(String),

    /// No welcome arrived before the handshake deadline
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Connection dropped or protocol violated during the handshake
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Command issued against a connection that is not Ready
    #[error("not connected to world server")]
    NotConnected,

    /// Verb not in the command table
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Direction not in the compass table
    #[error("unknown direction: {0}")]
    UnknownDirection(String),

    /// No live session bound to the presented token
    #[error("unknown session token")]
    UnknownToken,

    /// Token exists but is bound to a different player
    #[error("token does not belong to that player")]
    IdentityMismatch,

    /// Outbound frame could not be encoded
    #[error("wire format error: {0}")]
    Wire(String),
}

/// Coarse failure category, used by callers to decide whether to
/// re-join, retry with corrected input, or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Backend unreachable or connection lost
    Connectivity,
    /// Handshake or wire-format failure
    Protocol,
    /// Bad token or identity
    Auth,
    /// Bad verb or argument; session unaffected
    Command,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connectivity => "connectivity",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Command => "command",
        }
    }
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::ConnectFailed(_) | BridgeError::NotConnected => {
                ErrorCategory::Connectivity
            }
            BridgeError::HandshakeTimeout
            | BridgeError::HandshakeFailed(_)
            | BridgeError::Wire(_) => ErrorCategory::Protocol,
            BridgeError::UnknownToken | BridgeError::IdentityMismatch => ErrorCategory::Auth,
            BridgeError::UnknownCommand(_) | BridgeError::UnknownDirection(_) => {
                ErrorCategory::Command
            }
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Wire(err.to_string())
    }
}
