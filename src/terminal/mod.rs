pub mod emulator;
pub mod screen;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::terminal::emulator::VtEmulator;
use crate::terminal::screen::ScreenBuffer;

/// Terminal grid dimensions in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(SessionError::InvalidSize {
                cols: self.cols,
                rows: self.rows,
            });
        }
        Ok(())
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// Shared handle to a session's emulator and screen.
///
/// The receive path feeds whole chunks under one lock and readers copy out
/// under the same lock, so a reader sees the screen either before or after
/// a chunk, never halfway through one. Clones share the same screen.
#[derive(Clone)]
pub struct TerminalBuffer {
    inner: Arc<Mutex<VtEmulator>>,
}

impl TerminalBuffer {
    pub fn new(size: TerminalSize, scrollback_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VtEmulator::new(size, scrollback_limit))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VtEmulator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed raw bytes from the remote shell.
    pub fn feed(&self, bytes: &[u8]) {
        self.lock().process(bytes);
    }

    pub fn resize(&self, size: TerminalSize) {
        self.lock().resize(size);
    }

    pub fn size(&self) -> TerminalSize {
        self.lock().screen().size()
    }

    /// Scrollback plus the written part of the viewport, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().screen().lines()
    }

    /// Exactly `rows` lines.
    pub fn viewport(&self) -> Vec<String> {
        self.lock().screen().viewport()
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.lock().screen().cursor()
    }

    /// Run `f` against a consistent view of the screen, e.g. to read cell
    /// attributes for rendering.
    pub fn with_screen<R>(&self, f: impl FnOnce(&ScreenBuffer) -> R) -> R {
        f(self.lock().screen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_size_validation() {
        assert!(TerminalSize::new(80, 24).validate().is_ok());
        assert_eq!(
            TerminalSize::new(0, 24).validate(),
            Err(SessionError::InvalidSize { cols: 0, rows: 24 })
        );
        assert!(TerminalSize::new(80, 0).validate().is_err());
    }

    #[test]
    fn test_size_json_shape() {
        let json = serde_json::to_string(&TerminalSize::new(120, 32)).unwrap();
        assert_eq!(json, r#"{"cols":120,"rows":32}"#);
    }

    #[test]
    fn test_clones_share_screen() {
        let buffer = TerminalBuffer::new(TerminalSize::new(80, 24), 100);
        let reader = buffer.clone();
        buffer.feed(b"abc\r\ndef");
        assert_eq!(reader.lines(), vec!["abc", "def"]);
        reader.resize(TerminalSize::new(40, 10));
        assert_eq!(buffer.viewport().len(), 10);
        assert_eq!(buffer.size(), TerminalSize::new(40, 10));
    }

    #[test]
    fn test_reader_never_sees_partial_chunk() {
        let buffer = TerminalBuffer::new(TerminalSize::new(40, 5), 10_000);
        let writer = buffer.clone();
        let chunk = format!("{}\r\n", "x".repeat(30));
        let handle = thread::spawn(move || {
            for _ in 0..500 {
                writer.feed(chunk.as_bytes());
            }
        });
        for _ in 0..500 {
            for line in buffer.lines() {
                assert!(line.is_empty() || line.len() == 30, "torn line: {:?}", line);
            }
        }
        handle.join().unwrap();
        assert_eq!(buffer.with_screen(|s| s.scrollback_len()), 496);
    }
}
