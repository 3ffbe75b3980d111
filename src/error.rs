use crate::ssh::session::SessionState;
use thiserror::Error;

/// Errors surfaced by a transport session.
///
/// Connection and authentication failures are kept apart so the caller can
/// decide between retrying and asking for different credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid connection profile: {0}")]
    InvalidProfile(String),

    #[error("invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },

    #[error("operation not valid in state {0:?}")]
    InvalidState(SessionState),

    /// Network unreachable, DNS failure, handshake failure or timeout.
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    /// Credentials or key material rejected.
    #[error("authentication failed for {username}: {reason}")]
    Authentication { username: String, reason: String },

    /// The shell channel could not be opened or written to.
    #[error("shell channel error: {0}")]
    Channel(String),

    #[error("session disposed")]
    Disposed,
}

impl SessionError {
    pub fn is_connection(&self) -> bool {
        matches!(self, SessionError::Connection { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, SessionError::Authentication { .. })
    }
}
