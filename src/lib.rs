//! tmuxVoice Core — SSH shell sessions for a mobile tmux client
//!
//! Connects to a host over SSH, opens a PTY shell (optionally running a tmux
//! attach command), feeds the output through a VT parser into a scrollback
//! screen buffer and exposes it all through a C FFI interface.

pub mod config;
pub mod error;
pub mod events;
pub mod ffi;
pub mod profiles;
pub mod registry;
pub mod ssh;
pub mod terminal;

pub use config::SessionSettings;
pub use error::SessionError;
pub use events::{EventBridge, SubscriptionId, TerminalEvent, TERMINAL_TOPIC};
pub use profiles::{JsonFilePersistence, MemoryPersistence, NewProfile, ProfilePersistence, ProfileStore};
pub use registry::SessionRegistry;
pub use ssh::session::{SessionState, TransportSession};
pub use ssh::{AuthMethod, ConnectionProfile, Session, SessionId};
pub use terminal::{TerminalBuffer, TerminalSize};

/// Initialize the logger from `RUST_LOG`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
