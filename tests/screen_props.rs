//! Property-based tests for the screen buffer
//!
//! Feed generated shell output through the parser and check the invariants
//! the UI relies on: chunk boundaries never matter, and resizing never
//! loses or overflows content.

use proptest::prelude::*;
use tmuxvoice_core::terminal::{TerminalBuffer, TerminalSize};

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{1,12}",
        Just("\r\n".to_string()),
        Just("\x1b[31m".to_string()),
        Just("\x1b[38;5;208m".to_string()),
        Just("\x1b[0m".to_string()),
        Just("\x1b[1;1H".to_string()),
        Just("\x1b[K".to_string()),
        Just("\x1b[2J".to_string()),
        Just("\x1b[?1049h".to_string()),
        Just("\x1b[?1049l".to_string()),
        Just("\x1b]0;title\x07".to_string()),
        Just("héllo ✓".to_string()),
        Just("\t".to_string()),
        Just("\x08".to_string()),
    ]
}

fn shell_output() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(token(), 0..40).prop_map(|tokens| tokens.concat().into_bytes())
}

/// Plain lines separated by CRLF, the way a shell prints command output.
fn plain_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{0,30}", 1..20)
}

proptest! {
    #[test]
    fn test_chunking_does_not_change_screen(
        bytes in shell_output(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let size = TerminalSize::new(20, 6);
        let whole = TerminalBuffer::new(size, 1000);
        whole.feed(&bytes);

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
        points.sort_unstable();
        let chunked = TerminalBuffer::new(size, 1000);
        let mut start = 0;
        for point in points {
            chunked.feed(&bytes[start..point]);
            start = point;
        }
        chunked.feed(&bytes[start..]);

        prop_assert_eq!(whole.lines(), chunked.lines());
        prop_assert_eq!(whole.viewport(), chunked.viewport());
        prop_assert_eq!(whole.cursor(), chunked.cursor());
    }

    #[test]
    fn test_resize_bounds_rows_and_width(
        bytes in shell_output(),
        cols in 1u16..120,
        rows in 1u16..40,
    ) {
        let buffer = TerminalBuffer::new(TerminalSize::new(80, 24), 1000);
        buffer.feed(&bytes);
        buffer.resize(TerminalSize::new(cols, rows));

        prop_assert_eq!(buffer.size(), TerminalSize::new(cols, rows));
        prop_assert_eq!(buffer.viewport().len(), rows as usize);
        for line in buffer.lines() {
            prop_assert!(line.chars().count() <= cols as usize, "{:?} wider than {}", line, cols);
        }
        let (row, col) = buffer.cursor();
        prop_assert!(row < rows as usize);
        prop_assert!(col < cols as usize);
    }

    #[test]
    fn test_width_round_trip_restores_lines(
        lines in plain_lines(),
        narrow in 1u16..40,
        rows in 3u16..12,
    ) {
        let wide = TerminalSize::new(40, rows);
        let buffer = TerminalBuffer::new(wide, 10_000);
        buffer.feed(lines.join("\r\n").as_bytes());
        let before = buffer.lines();

        buffer.resize(TerminalSize::new(narrow, rows));
        buffer.resize(wide);

        prop_assert_eq!(buffer.lines(), before);
    }

    #[test]
    fn test_narrowing_keeps_text(lines in plain_lines(), narrow in 1u16..40) {
        let buffer = TerminalBuffer::new(TerminalSize::new(40, 8), 10_000);
        buffer.feed(lines.join("\r\n").as_bytes());
        buffer.resize(TerminalSize::new(narrow, 8));

        let joined: String = buffer.lines().concat();
        prop_assert_eq!(joined, lines.concat());
    }
}
