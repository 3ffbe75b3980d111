use vte::{Params, Parser, Perform};

use super::screen::{Color, Pen, ScreenBuffer};
use super::TerminalSize;

/// VT100/ANSI escape sequence parser wrapping `vte` crate.
///
/// Bytes may arrive in arbitrary chunks: `vte` keeps partial escape
/// sequences and partial UTF-8 characters between calls, so feeding a
/// stream in pieces yields the same screen as feeding it at once.
/// Sequences that are not understood are dropped.
pub struct VtEmulator {
    parser: Parser,
    screen: ScreenBuffer,
}

impl VtEmulator {
    pub fn new(size: TerminalSize, scrollback_limit: usize) -> Self {
        Self {
            parser: Parser::new(),
            screen: ScreenBuffer::new(size, scrollback_limit),
        }
    }

    /// Feed raw bytes from the remote shell into the VT parser.
    pub fn process(&mut self, bytes: &[u8]) {
        let mut performer = EmulatorPerformer {
            screen: &mut self.screen,
        };
        self.parser.advance(&mut performer, bytes);
    }

    /// Resize the emulator grid.
    pub fn resize(&mut self, size: TerminalSize) {
        self.screen.resize(size);
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }
}

/// Internal performer that implements vte::Perform.
struct EmulatorPerformer<'a> {
    screen: &'a mut ScreenBuffer,
}

/// First value of each parameter, sub-parameters ignored.
fn param_values(params: &Params) -> Vec<u16> {
    params
        .iter()
        .map(|p| p.first().copied().unwrap_or(0))
        .collect()
}

/// Parameter `index`, with 0 or absent meaning `default`.
fn arg(values: &[u16], index: usize, default: u16) -> usize {
    match values.get(index).copied() {
        Some(0) | None => default as usize,
        Some(v) => v as usize,
    }
}

impl<'a> EmulatorPerformer<'a> {
    fn set_private_mode(&mut self, values: &[u16], enable: bool) {
        for mode in values {
            match mode {
                47 | 1047 | 1049 => {
                    if enable {
                        self.screen.enter_alternate_screen();
                        self.screen.erase_in_display(2);
                    } else {
                        self.screen.leave_alternate_screen();
                    }
                }
                // Cursor visibility, bracketed paste, mouse reporting and
                // friends do not change the text grid.
                _ => log::trace!("ignoring private mode {} ({})", mode, enable),
            }
        }
    }

    fn select_graphic_rendition(&mut self, params: &Params) {
        let mut groups = params.iter();
        if params.is_empty() {
            *self.screen.pen_mut() = Pen::default();
            return;
        }
        while let Some(group) = groups.next() {
            let code = group.first().copied().unwrap_or(0);
            let pen = self.screen.pen_mut();
            match code {
                0 => *pen = Pen::default(),
                1 => pen.bold = true,
                4 => pen.underline = true,
                22 => pen.bold = false,
                24 => pen.underline = false,
                30..=37 => pen.fg = Color::Indexed((code - 30) as u8),
                39 => pen.fg = Color::Default,
                40..=47 => pen.bg = Color::Indexed((code - 40) as u8),
                49 => pen.bg = Color::Default,
                90..=97 => pen.fg = Color::Indexed((code - 90 + 8) as u8),
                100..=107 => pen.bg = Color::Indexed((code - 100 + 8) as u8),
                38 | 48 => {
                    // Either colon form (38:5:n in one group) or the
                    // semicolon form spread over the following groups.
                    let color = if group.len() > 1 {
                        extended_color(&mut group[1..].iter().copied())
                    } else {
                        extended_color(&mut groups.by_ref().map(|g| g.first().copied().unwrap_or(0)))
                    };
                    if let Some(color) = color {
                        let pen = self.screen.pen_mut();
                        if code == 38 {
                            pen.fg = color;
                        } else {
                            pen.bg = color;
                        }
                    }
                }
                _ => log::trace!("ignoring SGR {}", code),
            }
        }
    }
}

/// Decode `5;n` or `2;r;g;b` after an extended color introducer.
fn extended_color(values: &mut dyn Iterator<Item = u16>) -> Option<Color> {
    match values.next()? {
        5 => values.next().map(|n| Color::Indexed(n as u8)),
        2 => {
            let r = values.next()? as u8;
            let g = values.next()? as u8;
            let b = values.next()? as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

impl<'a> Perform for EmulatorPerformer<'a> {
    fn print(&mut self, ch: char) {
        self.screen.print(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            // Newline (LF)
            b'\n' | 0x0b | 0x0c => self.screen.index(),
            // Carriage return
            b'\r' => self.screen.carriage_return(),
            // Backspace
            0x08 => self.screen.backspace(),
            // Tab
            b'\t' => self.screen.tab(),
            // Bell
            0x07 => {}
            _ => log::trace!("ignoring C0 control {:#04x}", byte),
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        // Window title, clipboard, shell integration: nothing on the grid.
        if let Some(kind) = params.first() {
            log::trace!("ignoring OSC {}", String::from_utf8_lossy(kind));
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            log::trace!("dropping oversized CSI sequence ending in {:?}", action);
            return;
        }
        let values = param_values(params);

        if intermediates.first() == Some(&b'?') {
            match action {
                'h' => self.set_private_mode(&values, true),
                'l' => self.set_private_mode(&values, false),
                _ => log::trace!("ignoring private CSI {:?}", action),
            }
            return;
        }
        if !intermediates.is_empty() {
            log::trace!("ignoring CSI {:?} with intermediates {:?}", action, intermediates);
            return;
        }

        match action {
            // Cursor Up / Down / Forward / Back
            'A' => self.screen.move_up(arg(&values, 0, 1)),
            'B' => self.screen.move_down(arg(&values, 0, 1)),
            'C' => self.screen.move_forward(arg(&values, 0, 1)),
            'D' => self.screen.move_back(arg(&values, 0, 1)),
            // Next / Previous Line
            'E' => {
                self.screen.move_down(arg(&values, 0, 1));
                self.screen.carriage_return();
            }
            'F' => {
                self.screen.move_up(arg(&values, 0, 1));
                self.screen.carriage_return();
            }
            // Cursor Horizontal Absolute
            'G' | '`' => self.screen.move_to_col(arg(&values, 0, 1) - 1),
            // Line Position Absolute
            'd' => self.screen.move_to_row(arg(&values, 0, 1) - 1),
            // Cursor Position (H or f)
            'H' | 'f' => self
                .screen
                .move_to(arg(&values, 0, 1) - 1, arg(&values, 1, 1) - 1),
            // Erase in Display / Line
            'J' => self.screen.erase_in_display(values.first().copied().unwrap_or(0)),
            'K' => self.screen.erase_in_line(values.first().copied().unwrap_or(0)),
            'X' => self.screen.erase_chars(arg(&values, 0, 1)),
            '@' => self.screen.insert_chars(arg(&values, 0, 1)),
            'P' => self.screen.delete_chars(arg(&values, 0, 1)),
            'L' => self.screen.insert_lines(arg(&values, 0, 1)),
            'M' => self.screen.delete_lines(arg(&values, 0, 1)),
            'S' => self.screen.scroll_up(arg(&values, 0, 1)),
            'T' => self.screen.scroll_down(arg(&values, 0, 1)),
            // Set Top and Bottom Margins
            'r' => {
                let rows = self.screen.size().rows;
                self.screen
                    .set_scroll_region(arg(&values, 0, 1) - 1, arg(&values, 1, rows) - 1);
            }
            's' => self.screen.save_cursor(),
            'u' => self.screen.restore_cursor(),
            'm' => self.select_graphic_rendition(params),
            _ => log::trace!("ignoring CSI {:?} {:?}", action, values),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        if !intermediates.is_empty() {
            // Charset designation and the like.
            return;
        }
        match byte {
            b'7' => self.screen.save_cursor(),
            b'8' => self.screen.restore_cursor(),
            b'D' => self.screen.index(),
            b'E' => {
                self.screen.carriage_return();
                self.screen.index();
            }
            b'M' => self.screen.reverse_index(),
            b'c' => self.screen.reset(),
            _ => log::trace!("ignoring ESC {:?}", byte as char),
        }
    }
}
