//! C FFI interface for the mobile shell.
//!
//! Naming convention: tmuxvoice_<module>_<action>. Strings returned to the
//! caller are owned by Rust and must be released with
//! [`tmuxvoice_string_free`].

use std::collections::VecDeque;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::config::SessionSettings;
use crate::error::SessionError;
use crate::events::TerminalEvent;
use crate::ssh::session::{SessionState, TransportSession};
use crate::ssh::ConnectionProfile;
use crate::terminal::TerminalSize;

/// Global tokio runtime driving every session.
fn runtime() -> Option<&'static tokio::runtime::Runtime> {
    static RUNTIME: OnceLock<Option<tokio::runtime::Runtime>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| log::error!("Failed to create tokio runtime: {}", e))
                .ok()
        })
        .as_ref()
}

fn to_c_string(s: String) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

// ═══════════════════════════════════════════════════════════
// Session FFI
// ═══════════════════════════════════════════════════════════

/// A transport session plus the events not yet polled by the caller.
pub struct SessionHandle {
    session: TransportSession,
    size: TerminalSize,
    queue: Arc<Mutex<VecDeque<TerminalEvent>>>,
}

impl SessionHandle {
    fn new(settings: SessionSettings, size: TerminalSize) -> Self {
        Self::from_session(TransportSession::new(settings), size)
    }

    fn from_session(session: TransportSession, size: TerminalSize) -> Self {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&queue);
        session.on_event(move |event: &TerminalEvent| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(event.clone());
        });
        Self {
            session,
            size,
            queue,
        }
    }

    fn drain_events(&self) -> Vec<TerminalEvent> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

/// Opaque pointer to a SessionHandle.
pub type TmuxVoiceSessionHandle = *mut SessionHandle;

/// Return codes of `tmuxvoice_session_connect` and `tmuxvoice_session_resize`.
pub const TMUXVOICE_OK: i32 = 0;
pub const TMUXVOICE_ERR_CONNECTION: i32 = 1;
pub const TMUXVOICE_ERR_AUTH: i32 = 2;
pub const TMUXVOICE_ERR_CHANNEL: i32 = 3;
pub const TMUXVOICE_ERR_OTHER: i32 = 4;
pub const TMUXVOICE_ERR_INVALID_ARGS: i32 = -1;

fn error_code(error: &SessionError) -> i32 {
    match error {
        SessionError::Connection { .. } => TMUXVOICE_ERR_CONNECTION,
        SessionError::Authentication { .. } => TMUXVOICE_ERR_AUTH,
        SessionError::Channel(_) => TMUXVOICE_ERR_CHANNEL,
        SessionError::InvalidProfile(_) | SessionError::InvalidSize { .. } => {
            TMUXVOICE_ERR_INVALID_ARGS
        }
        SessionError::InvalidState(_) | SessionError::Disposed => TMUXVOICE_ERR_OTHER,
    }
}

fn state_code(state: SessionState) -> i32 {
    match state {
        SessionState::Idle => 0,
        SessionState::Connecting => 1,
        SessionState::Authenticating => 2,
        SessionState::ShellStarting => 3,
        SessionState::Connected => 4,
        SessionState::Closing => 5,
        SessionState::Closed => 6,
        SessionState::Failed => 7,
    }
}

/// Create an idle session with the given initial size and default settings.
/// Returns null when either dimension is zero.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_create(cols: u16, rows: u16) -> TmuxVoiceSessionHandle {
    tmuxvoice_session_create_with_settings(cols, rows, std::ptr::null())
}

/// Like `tmuxvoice_session_create`, with a JSON `SessionSettings` object
/// (e.g. `{"connect_timeout_ms": 5000}`). Missing fields keep their
/// defaults; a null pointer means all defaults.
/// Returns null for a zero dimension or unparsable settings.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_create_with_settings(
    cols: u16,
    rows: u16,
    settings_json: *const c_char,
) -> TmuxVoiceSessionHandle {
    let size = TerminalSize::new(cols, rows);
    if let Err(e) = size.validate() {
        log::error!("Failed to create session: {}", e);
        return std::ptr::null_mut();
    }

    let settings = if settings_json.is_null() {
        SessionSettings::default()
    } else {
        let raw = unsafe { CStr::from_ptr(settings_json).to_str().unwrap_or("") };
        match SessionSettings::from_json_str(raw) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("Invalid session settings JSON: {}", e);
                return std::ptr::null_mut();
            }
        }
    };
    Box::into_raw(Box::new(SessionHandle::new(settings, size)))
}

/// Connect using a JSON-encoded `ConnectionProfile`. Blocks until the shell
/// is up or the attempt failed.
/// Returns 0 on success, 1 connection error, 2 authentication error,
/// 3 channel error, 4 other, -1 invalid arguments.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_connect(
    handle: TmuxVoiceSessionHandle,
    profile_json: *const c_char,
) -> i32 {
    if handle.is_null() || profile_json.is_null() {
        return TMUXVOICE_ERR_INVALID_ARGS;
    }

    let handle = unsafe { &*handle };
    let raw = unsafe { CStr::from_ptr(profile_json).to_str().unwrap_or("") };
    let profile: ConnectionProfile = match serde_json::from_str(raw) {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("Invalid profile JSON: {}", e);
            return TMUXVOICE_ERR_INVALID_ARGS;
        }
    };
    let Some(runtime) = runtime() else {
        return TMUXVOICE_ERR_OTHER;
    };

    match runtime.block_on(handle.session.connect(&profile, handle.size)) {
        Ok(()) => TMUXVOICE_OK,
        Err(e) => {
            log::error!("Connect to {} failed: {}", profile.target(), e);
            error_code(&e)
        }
    }
}

/// Write raw input bytes. Ignored unless the session is connected.
/// Returns 0, or -1 on invalid arguments.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_send(
    handle: TmuxVoiceSessionHandle,
    data: *const u8,
    len: usize,
) -> i32 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return TMUXVOICE_ERR_INVALID_ARGS;
    }
    if len == 0 {
        return TMUXVOICE_OK;
    }

    let handle = unsafe { &*handle };
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    handle.session.send(bytes);
    TMUXVOICE_OK
}

/// Resize the remote window and the screen.
/// Returns 0 on success, -1 for a zero dimension, 4 when not connected.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_resize(
    handle: TmuxVoiceSessionHandle,
    cols: u16,
    rows: u16,
) -> i32 {
    if handle.is_null() {
        return TMUXVOICE_ERR_INVALID_ARGS;
    }

    let handle = unsafe { &*handle };
    match handle.session.resize(TerminalSize::new(cols, rows)) {
        Ok(()) => TMUXVOICE_OK,
        Err(e) => {
            log::warn!("Resize to {}x{} rejected: {}", cols, rows, e);
            error_code(&e)
        }
    }
}

/// Scrollback plus live screen lines as a JSON array of strings.
/// Caller must free with tmuxvoice_string_free.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_lines(handle: TmuxVoiceSessionHandle) -> *mut c_char {
    if handle.is_null() {
        return std::ptr::null_mut();
    }

    let handle = unsafe { &*handle };
    match serde_json::to_string(&handle.session.screen().lines()) {
        Ok(json) => to_c_string(json),
        Err(e) => {
            log::error!("Failed to serialize lines: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Events emitted since the last poll, oldest first, as a JSON array of
/// `{"type": ...}` objects. Caller must free with tmuxvoice_string_free.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_poll_events(handle: TmuxVoiceSessionHandle) -> *mut c_char {
    if handle.is_null() {
        return std::ptr::null_mut();
    }

    let handle = unsafe { &*handle };
    let events: Vec<serde_json::Value> =
        handle.drain_events().iter().map(TerminalEvent::to_json).collect();
    to_c_string(serde_json::Value::Array(events).to_string())
}

/// Current state: 0 idle, 1 connecting, 2 authenticating, 3 shell starting,
/// 4 connected, 5 closing, 6 closed, 7 failed. -1 for a null handle.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_state(handle: TmuxVoiceSessionHandle) -> i32 {
    if handle.is_null() {
        return TMUXVOICE_ERR_INVALID_ARGS;
    }

    let handle = unsafe { &*handle };
    state_code(handle.session.state())
}

/// Close the session without freeing it. Safe to call from another thread
/// while `tmuxvoice_session_connect` is blocked: that call then returns 4.
/// Later calls are no-ops. Returns 0, or -1 for a null handle.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_dispose(handle: TmuxVoiceSessionHandle) -> i32 {
    if handle.is_null() {
        return TMUXVOICE_ERR_INVALID_ARGS;
    }

    let handle = unsafe { &*handle };
    handle.session.dispose();
    TMUXVOICE_OK
}

/// Dispose and free the session.
///
/// Must not be called while any other call on this handle is in progress,
/// in particular a blocked `tmuxvoice_session_connect`: cancel that with
/// `tmuxvoice_session_dispose` and destroy once it has returned.
#[no_mangle]
pub extern "C" fn tmuxvoice_session_destroy(handle: TmuxVoiceSessionHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Utility FFI
// ═══════════════════════════════════════════════════════════

/// Free a string allocated by Rust.
#[no_mangle]
pub extern "C" fn tmuxvoice_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}

/// Initialize logging and the runtime.
#[no_mangle]
pub extern "C" fn tmuxvoice_init() {
    crate::init_logging();
    if runtime().is_none() {
        log::error!("tmuxvoice core started without a runtime");
        return;
    }
    log::info!("tmuxvoice core initialized");
}
