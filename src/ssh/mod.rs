pub mod client;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::ssh::session::SessionState;

/// SSH connection target, as stored by the profile store.
///
/// Serializes to a flat object: `{"id", "host", "port", "auth", "tmuxAttach",
/// "description"}` with the auth variant in `auth.type`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub auth: AuthMethod,
    /// Command written to the shell right after it opens, e.g.
    /// `tmux attach || tmux new`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_attach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// SSH authentication method.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthMethod {
    Password {
        username: String,
        password: String,
    },
    /// Private key material (OpenSSH or PEM text), not a path.
    Key {
        username: String,
        #[serde(rename = "privateKey")]
        private_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    pub fn username(&self) -> &str {
        match self {
            AuthMethod::Password { username, .. } | AuthMethod::Key { username, .. } => username,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthMethod::Key {
                username,
                passphrase,
                ..
            } => f
                .debug_struct("Key")
                .field("username", username)
                .field("private_key", &"<redacted>")
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth", &self.auth)
            .field("tmux_attach", &self.tmux_attach)
            .field("description", &self.description)
            .finish()
    }
}

impl ConnectionProfile {
    pub fn new(host: impl Into<String>, port: u16, auth: AuthMethod) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            host: host.into(),
            port,
            auth,
            tmux_attach: None,
            description: None,
        }
    }

    pub fn with_tmux_attach(mut self, command: impl Into<String>) -> Self {
        self.tmux_attach = Some(command.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check that the profile is complete enough to attempt a connection.
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |reason: &str| Err(SessionError::InvalidProfile(reason.to_string()));
        if self.host.trim().is_empty() {
            return invalid("host is empty");
        }
        if self.port == 0 {
            return invalid("port must be between 1 and 65535");
        }
        if self.auth.username().is_empty() {
            return invalid("username is empty");
        }
        match &self.auth {
            AuthMethod::Password { password, .. } if password.is_empty() => {
                invalid("password is empty")
            }
            AuthMethod::Key { private_key, .. } if private_key.trim().is_empty() => {
                invalid("private key is empty")
            }
            _ => Ok(()),
        }
    }

    /// `user@host:port`, for logs.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.auth.username(), self.host, self.port)
    }
}

/// Opaque unique session token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live shell session: created once the channel is up, gone after close.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub profile: ConnectionProfile,
    pub status: SessionState,
    /// Milliseconds since the Unix epoch.
    pub connected_at: u64,
}

impl Session {
    pub fn new(profile: ConnectionProfile) -> Self {
        Self {
            id: SessionId::new(),
            profile,
            status: SessionState::Connected,
            connected_at: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
