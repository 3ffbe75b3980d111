use std::collections::VecDeque;

use super::TerminalSize;

/// Terminal color representation.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Attributes applied to the next printed characters (SGR state).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pen {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub underline: bool,
}

/// A single cell in the terminal grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub underline: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::Default,
            bg: Color::Default,
            bold: false,
            underline: false,
        }
    }
}

impl Cell {
    fn styled(ch: char, pen: &Pen) -> Self {
        Self {
            ch,
            fg: pen.fg,
            bg: pen.bg,
            bold: pen.bold,
            underline: pen.underline,
        }
    }

    fn is_default(&self) -> bool {
        *self == Cell::default()
    }
}

/// One row of cells. `wrapped` marks a row whose content continues on the
/// next row because the writer ran past the last column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    cells: Vec<Cell>,
    wrapped: bool,
}

impl Line {
    fn blank(cols: usize) -> Self {
        Self {
            cells: vec![Cell::default(); cols],
            wrapped: false,
        }
    }

    fn from_cells(mut cells: Vec<Cell>, cols: usize) -> Self {
        cells.resize(cols, Cell::default());
        Self {
            cells,
            wrapped: false,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Rendered text with trailing spaces removed.
    pub fn text(&self) -> String {
        let text: String = self.cells.iter().map(|c| c.ch).collect();
        text.trim_end_matches(' ').to_string()
    }

    fn content_len(&self) -> usize {
        content_len(&self.cells)
    }

    fn is_blank(&self) -> bool {
        !self.wrapped && self.content_len() == 0
    }
}

fn content_len(cells: &[Cell]) -> usize {
    cells
        .iter()
        .rposition(|c| !c.is_default())
        .map_or(0, |i| i + 1)
}

/// A screenful of lines plus its cursor. The primary and alternate
/// screens are each one grid.
#[derive(Clone, Debug)]
struct Grid {
    lines: Vec<Line>,
    cursor_row: usize,
    /// May equal the column count: the deferred-wrap position after the
    /// last column was written.
    cursor_col: usize,
}

impl Grid {
    fn new(cols: usize, rows: usize) -> Self {
        Self {
            lines: vec![Line::blank(cols); rows],
            cursor_row: 0,
            cursor_col: 0,
        }
    }

    /// Rows that hold content or the cursor; the rest of the viewport has
    /// never been written.
    fn live_rows(&self) -> usize {
        let content = self
            .lines
            .iter()
            .rposition(|l| !l.is_blank())
            .map_or(0, |i| i + 1);
        content.max(self.cursor_row + 1).min(self.lines.len())
    }

    fn truncate_to(&mut self, cols: usize, rows: usize) {
        self.lines.resize_with(rows, || Line::blank(cols));
        for line in self.lines.iter_mut() {
            line.cells.resize(cols, Cell::default());
        }
        self.cursor_row = self.cursor_row.min(rows - 1);
        self.cursor_col = self.cursor_col.min(cols - 1);
    }
}

#[derive(Clone, Copy, Debug)]
struct SavedCursor {
    row: usize,
    col: usize,
    pen: Pen,
}

/// Scrollback plus a `rows` x `cols` viewport.
///
/// The viewport always holds exactly `rows` lines of `cols` cells. Lines
/// pushed off the top of the primary screen go to the scrollback, which is
/// capped at `scrollback_limit` lines (oldest dropped first).
#[derive(Clone, Debug)]
pub struct ScreenBuffer {
    cols: usize,
    rows: usize,
    scrollback: VecDeque<Line>,
    scrollback_limit: usize,
    grid: Grid,
    /// Stashed primary screen, cursor included, while the alternate
    /// screen is active.
    primary: Option<Grid>,
    primary_pen: Pen,
    pen: Pen,
    scroll_top: usize,
    scroll_bottom: usize,
    saved: Option<SavedCursor>,
}

impl ScreenBuffer {
    pub fn new(size: TerminalSize, scrollback_limit: usize) -> Self {
        let cols = size.cols.max(1) as usize;
        let rows = size.rows.max(1) as usize;
        Self {
            cols,
            rows,
            scrollback: VecDeque::new(),
            scrollback_limit,
            grid: Grid::new(cols, rows),
            primary: None,
            primary_pen: Pen::default(),
            pen: Pen::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            saved: None,
        }
    }

    // ── Queries ────────────────────────────────────────────

    pub fn size(&self) -> TerminalSize {
        TerminalSize::new(self.cols as u16, self.rows as u16)
    }

    /// Cursor as (row, column) within the viewport.
    pub fn cursor(&self) -> (usize, usize) {
        (self.grid.cursor_row, self.grid.cursor_col.min(self.cols - 1))
    }

    pub fn is_alternate_screen(&self) -> bool {
        self.primary.is_some()
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    /// Every materialized line of the active screen, oldest first:
    /// scrollback followed by the written part of the viewport. The
    /// alternate screen has no scrollback.
    pub fn lines(&self) -> Vec<String> {
        let live = &self.grid.lines[..self.grid.live_rows()];
        if self.primary.is_some() {
            live.iter().map(Line::text).collect()
        } else {
            self.scrollback.iter().chain(live).map(Line::text).collect()
        }
    }

    /// Line `index` of [`lines`](Self::lines).
    pub fn line(&self, index: usize) -> Option<String> {
        let offset = if self.primary.is_some() {
            0
        } else {
            self.scrollback.len()
        };
        if index < offset {
            return self.scrollback.get(index).map(Line::text);
        }
        let row = index - offset;
        if row < self.grid.live_rows() {
            Some(self.grid.lines[row].text())
        } else {
            None
        }
    }

    /// The visible rows as text, always exactly `rows` entries.
    pub fn viewport(&self) -> Vec<String> {
        self.grid.lines.iter().map(Line::text).collect()
    }

    /// The visible rows with their attributes.
    pub fn viewport_lines(&self) -> &[Line] {
        &self.grid.lines
    }

    // ── Printing and cursor motion ─────────────────────────

    pub fn pen_mut(&mut self) -> &mut Pen {
        &mut self.pen
    }

    pub fn print(&mut self, ch: char) {
        if self.grid.cursor_col >= self.cols {
            self.grid.lines[self.grid.cursor_row].wrapped = true;
            self.grid.cursor_col = 0;
            self.index();
        }
        let (row, col) = (self.grid.cursor_row, self.grid.cursor_col);
        self.grid.lines[row].cells[col] = Cell::styled(ch, &self.pen);
        self.grid.cursor_col += 1;
    }

    /// Move down one line, scrolling when at the bottom of the scroll region.
    pub fn index(&mut self) {
        if self.grid.cursor_row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.grid.cursor_row + 1 < self.rows {
            self.grid.cursor_row += 1;
        }
    }

    /// Move up one line, scrolling down when at the top of the scroll region.
    pub fn reverse_index(&mut self) {
        if self.grid.cursor_row == self.scroll_top {
            self.scroll_down(1);
        } else if self.grid.cursor_row > 0 {
            self.grid.cursor_row -= 1;
        }
    }

    pub fn carriage_return(&mut self) {
        self.grid.cursor_col = 0;
    }

    pub fn backspace(&mut self) {
        self.grid.cursor_col = self.last_col_clamped().saturating_sub(1);
    }

    pub fn tab(&mut self) {
        let next_tab = (self.last_col_clamped() / 8 + 1) * 8;
        self.grid.cursor_col = next_tab.min(self.cols - 1);
    }

    /// Absolute cursor position, zero-based, clamped to the viewport.
    pub fn move_to(&mut self, row: usize, col: usize) {
        self.grid.cursor_row = row.min(self.rows - 1);
        self.grid.cursor_col = col.min(self.cols - 1);
    }

    pub fn move_to_col(&mut self, col: usize) {
        self.grid.cursor_col = col.min(self.cols - 1);
    }

    pub fn move_to_row(&mut self, row: usize) {
        self.grid.cursor_row = row.min(self.rows - 1);
    }

    pub fn move_up(&mut self, n: usize) {
        self.grid.cursor_row = self.grid.cursor_row.saturating_sub(n);
        self.grid.cursor_col = self.last_col_clamped();
    }

    pub fn move_down(&mut self, n: usize) {
        self.grid.cursor_row = (self.grid.cursor_row + n).min(self.rows - 1);
        self.grid.cursor_col = self.last_col_clamped();
    }

    pub fn move_forward(&mut self, n: usize) {
        self.grid.cursor_col = (self.last_col_clamped() + n).min(self.cols - 1);
    }

    pub fn move_back(&mut self, n: usize) {
        self.grid.cursor_col = self.last_col_clamped().saturating_sub(n);
    }

    fn last_col_clamped(&self) -> usize {
        self.grid.cursor_col.min(self.cols - 1)
    }

    pub fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            row: self.grid.cursor_row,
            col: self.grid.cursor_col,
            pen: self.pen,
        });
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved {
            self.grid.cursor_row = saved.row.min(self.rows - 1);
            self.grid.cursor_col = saved.col.min(self.cols);
            self.pen = saved.pen;
        }
    }

    // ── Scrolling ──────────────────────────────────────────

    /// Zero-based inclusive scroll region. An empty or inverted region
    /// resets to the full screen. Homes the cursor.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows - 1);
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        } else {
            self.scroll_top = 0;
            self.scroll_bottom = self.rows - 1;
        }
        self.move_to(0, 0);
    }

    pub fn scroll_up(&mut self, n: usize) {
        let n = n.min(self.scroll_bottom - self.scroll_top + 1);
        for _ in 0..n {
            let line = self.grid.lines.remove(self.scroll_top);
            self.grid
                .lines
                .insert(self.scroll_bottom, Line::blank(self.cols));
            if self.scroll_top == 0 && self.primary.is_none() {
                self.push_scrollback(line);
            }
        }
    }

    pub fn scroll_down(&mut self, n: usize) {
        let n = n.min(self.scroll_bottom - self.scroll_top + 1);
        for _ in 0..n {
            self.grid.lines.remove(self.scroll_bottom);
            self.grid
                .lines
                .insert(self.scroll_top, Line::blank(self.cols));
        }
    }

    fn push_scrollback(&mut self, line: Line) {
        push_scrollback(&mut self.scrollback, self.scrollback_limit, line);
    }

    // ── Erasing and editing ────────────────────────────────

    pub fn erase_in_line(&mut self, mode: u16) {
        let col = self.last_col_clamped();
        let cols = self.cols;
        let line = &mut self.grid.lines[self.grid.cursor_row];
        let range = match mode {
            0 => col..cols,
            1 => 0..col + 1,
            2 => 0..cols,
            _ => return,
        };
        line.cells[range].fill(Cell::default());
    }

    pub fn erase_in_display(&mut self, mode: u16) {
        let row = self.grid.cursor_row;
        match mode {
            0 => {
                self.erase_in_line(0);
                for line in self.grid.lines[row + 1..].iter_mut() {
                    *line = Line::blank(self.cols);
                }
            }
            1 => {
                for line in self.grid.lines[..row].iter_mut() {
                    *line = Line::blank(self.cols);
                }
                self.erase_in_line(1);
            }
            2 => {
                for line in self.grid.lines.iter_mut() {
                    *line = Line::blank(self.cols);
                }
            }
            3 => self.scrollback.clear(),
            _ => {}
        }
    }

    pub fn erase_chars(&mut self, n: usize) {
        let col = self.last_col_clamped();
        let end = (col + n).min(self.cols);
        self.grid.lines[self.grid.cursor_row].cells[col..end].fill(Cell::default());
    }

    pub fn insert_chars(&mut self, n: usize) {
        let col = self.last_col_clamped();
        let cols = self.cols;
        let cells = &mut self.grid.lines[self.grid.cursor_row].cells;
        for _ in 0..n.min(cols - col) {
            cells.insert(col, Cell::default());
        }
        cells.truncate(cols);
    }

    pub fn delete_chars(&mut self, n: usize) {
        let col = self.last_col_clamped();
        let cols = self.cols;
        let cells = &mut self.grid.lines[self.grid.cursor_row].cells;
        let n = n.min(cols - col);
        cells.drain(col..col + n);
        cells.resize(cols, Cell::default());
    }

    pub fn insert_lines(&mut self, n: usize) {
        let row = self.grid.cursor_row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        for _ in 0..n.min(self.scroll_bottom - row + 1) {
            self.grid.lines.remove(self.scroll_bottom);
            self.grid.lines.insert(row, Line::blank(self.cols));
        }
        self.grid.cursor_col = 0;
    }

    pub fn delete_lines(&mut self, n: usize) {
        let row = self.grid.cursor_row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        for _ in 0..n.min(self.scroll_bottom - row + 1) {
            self.grid.lines.remove(row);
            self.grid
                .lines
                .insert(self.scroll_bottom, Line::blank(self.cols));
        }
        self.grid.cursor_col = 0;
    }

    // ── Screen switching ───────────────────────────────────

    pub fn enter_alternate_screen(&mut self) {
        if self.primary.is_some() {
            return;
        }
        self.primary_pen = self.pen;
        let mut alternate = Grid::new(self.cols, self.rows);
        alternate.cursor_row = self.grid.cursor_row;
        alternate.cursor_col = self.last_col_clamped();
        self.primary = Some(std::mem::replace(&mut self.grid, alternate));
    }

    pub fn leave_alternate_screen(&mut self) {
        if let Some(primary) = self.primary.take() {
            // The stashed grid's cursor already follows any reflow.
            self.grid = primary;
            self.pen = self.primary_pen;
        }
    }

    /// Full reset (RIS). Scrollback is kept.
    pub fn reset(&mut self) {
        self.primary = None;
        self.primary_pen = Pen::default();
        self.grid = Grid::new(self.cols, self.rows);
        self.pen = Pen::default();
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
        self.saved = None;
    }

    // ── Resize ─────────────────────────────────────────────

    /// Change the viewport dimensions.
    ///
    /// The primary screen is reflowed: soft-wrapped rows are joined back
    /// into logical lines and rewrapped at the new width, so no content is
    /// lost. The alternate screen is cut or padded, its owner redraws it.
    pub fn resize(&mut self, size: TerminalSize) {
        let cols = size.cols.max(1) as usize;
        let rows = size.rows.max(1) as usize;
        if cols == self.cols && rows == self.rows {
            return;
        }

        match self.primary.take() {
            Some(mut primary) => {
                reflow(
                    &mut primary,
                    &mut self.scrollback,
                    self.scrollback_limit,
                    cols,
                    rows,
                );
                self.primary = Some(primary);
                self.grid.truncate_to(cols, rows);
            }
            None => reflow(
                &mut self.grid,
                &mut self.scrollback,
                self.scrollback_limit,
                cols,
                rows,
            ),
        }

        self.cols = cols;
        self.rows = rows;
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        if let Some(saved) = self.saved.as_mut() {
            saved.row = saved.row.min(rows - 1);
            saved.col = saved.col.min(cols - 1);
        }
    }
}

fn push_scrollback(scrollback: &mut VecDeque<Line>, limit: usize, line: Line) {
    if limit == 0 {
        return;
    }
    scrollback.push_back(line);
    while scrollback.len() > limit {
        scrollback.pop_front();
    }
}

/// Rewrap scrollback + the live part of `grid` at `cols` and lay the result
/// out so the last `rows` physical lines form the viewport.
fn reflow(
    grid: &mut Grid,
    scrollback: &mut VecDeque<Line>,
    limit: usize,
    cols: usize,
    rows: usize,
) {
    let live = grid.live_rows();
    let cursor_index = scrollback.len() + grid.cursor_row;
    let physical: Vec<Line> = scrollback
        .drain(..)
        .chain(grid.lines.drain(..live))
        .collect();

    // Join soft-wrapped rows into logical lines, remembering where the
    // cursor sits as (logical line, offset).
    let mut logical: Vec<Vec<Cell>> = Vec::new();
    let mut current: Vec<Cell> = Vec::new();
    let mut cursor = (0, 0);
    for (index, line) in physical.into_iter().enumerate() {
        if index == cursor_index {
            cursor = (logical.len(), current.len() + grid.cursor_col);
        }
        let Line { mut cells, wrapped } = line;
        if !wrapped {
            let len = content_len(&cells);
            cells.truncate(len);
        }
        current.extend(cells);
        if !wrapped {
            logical.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        logical.push(current);
    }

    let mut lines: Vec<Line> = Vec::new();
    let (mut cursor_row, mut cursor_col) = (0, 0);
    for (index, cells) in logical.into_iter().enumerate() {
        let start = lines.len();
        if cells.is_empty() {
            lines.push(Line::blank(cols));
        } else {
            for chunk in cells.chunks(cols) {
                let mut line = Line::from_cells(chunk.to_vec(), cols);
                line.wrapped = true;
                lines.push(line);
            }
            if let Some(last) = lines.last_mut() {
                last.wrapped = false;
            }
        }

        if index == cursor.0 {
            let offset = cursor.1;
            let chunks = lines.len() - start;
            let row = (offset / cols).min(chunks - 1);
            let col = offset - row * cols;
            cursor_row = start + row;
            cursor_col = if col < cols {
                col
            } else if offset == cells.len() {
                // Right after the last written cell: keep the deferred wrap.
                cols
            } else {
                cols - 1
            };
        }
    }

    let start = lines.len().saturating_sub(rows);
    let mut viewport = lines.split_off(start);
    for line in lines {
        push_scrollback(scrollback, limit, line);
    }
    viewport.resize_with(rows, || Line::blank(cols));

    grid.lines = viewport;
    if cursor_row >= start {
        grid.cursor_row = cursor_row - start;
        grid.cursor_col = cursor_col;
    } else {
        grid.cursor_row = 0;
        grid.cursor_col = cursor_col.min(cols - 1);
    }
}
