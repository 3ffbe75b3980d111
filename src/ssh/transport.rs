//! The network seam of a transport session.
//!
//! [`TransportSession`](super::session::TransportSession) drives a
//! [`Transport`] through connect, authenticate and shell setup, then talks
//! to the returned [`ShellChannel`]. The russh implementation lives in
//! [`client`](super::client).

use async_trait::async_trait;

use super::AuthMethod;
use crate::config::SessionSettings;
use crate::error::SessionError;
use crate::terminal::TerminalSize;

/// Something received on the shell channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Shell output.
    Data(Vec<u8>),
    /// Extended data (stderr).
    Stderr(Vec<u8>),
    /// The remote closed the channel or the connection went away.
    Closed,
}

/// Terminal dimensions as sent on the wire: cells plus a pixel size
/// derived from a nominal cell size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u32,
    pub rows: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl WindowSize {
    pub fn new(size: TerminalSize, settings: &SessionSettings) -> Self {
        let cols = size.cols as u32;
        let rows = size.rows as u32;
        Self {
            cols,
            rows,
            pixel_width: cols * settings.cell_pixel_width,
            pixel_height: rows * settings.cell_pixel_height,
        }
    }
}

/// PTY + shell request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellRequest {
    pub term: String,
    pub window: WindowSize,
}

/// One remote connection. Methods are called in order: `connect`,
/// `authenticate`, `open_shell`, and finally `disconnect` exactly once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// TCP connect and protocol handshake. Errors are
    /// [`SessionError::Connection`].
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError>;

    /// Errors are [`SessionError::Authentication`] for rejected credentials.
    async fn authenticate(&mut self, auth: &AuthMethod) -> Result<(), SessionError>;

    /// Errors are [`SessionError::Channel`].
    async fn open_shell(
        &mut self,
        request: &ShellRequest,
    ) -> Result<Box<dyn ShellChannel>, SessionError>;

    async fn disconnect(&mut self);
}

/// Duplex byte stream to the remote shell.
#[async_trait]
pub trait ShellChannel: Send {
    /// Next channel event. Must be cancel safe: the session polls it
    /// alongside its command queue.
    async fn recv(&mut self) -> ChannelEvent;

    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError>;

    async fn window_change(&mut self, window: WindowSize) -> Result<(), SessionError>;

    async fn close(&mut self);
}
