//! The hand-rolled VT100/ANSI terminal emulator.
//!
//! A single [`Vt::interpret`] entry point dispatches on a tagged [`ParserMode`] --
//! no function-pointer table, no `vte`-crate `Perform` trait. CSI/OSC command
//! bodies live in [`ops`], split by concern the way the teacher splits its CSI
//! handling into `operations/*.rs` files.

pub mod cell;
pub mod cursor;
pub mod line;
pub mod ops;

use tracing::warn;

use cell::Cell;
use cursor::CursorState;
use line::LineArena;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VtFlags: u32 {
        /// Wrap to the next line instead of clamping at the last column.
        const AUTOWRAP   = 1 << 0;
        /// Scroll the viewport up when a line-feed happens on the bottom row.
        const AUTOSCROLL = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    Normal,
    Escape,
    Csi,
    Osc,
}

/// Fixed-capacity parameter accumulator, matching the `chars[32]` + `len` layout
/// described for CSI/OSC bodies.
#[derive(Debug, Clone)]
pub struct Params {
    buf: [u8; 32],
    len: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self { buf: [0; 32], len: 0 }
    }
}

impl Params {
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends a byte, silently truncating once the buffer is full rather than
    /// growing -- malformed oversized sequences degrade gracefully instead of
    /// erroring.
    pub fn push(&mut self, byte: u8) {
        if self.len < self.buf.len() {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    /// Splits on `;` and parses each field; an empty or unparsable field becomes `None`.
    pub fn numbers(&self) -> Vec<Option<i64>> {
        if self.len == 0 {
            return Vec::new();
        }
        self.as_str().split(';').map(|s| s.parse::<i64>().ok()).collect()
    }

    pub fn number(&self, idx: usize) -> Option<i64> {
        self.numbers().get(idx).copied().flatten()
    }

    /// Per-field parse outcome, distinguishing "nothing here" from "garbage here".
    /// `number`/`numbers` collapse both to `None`, which most CSI handlers treat the
    /// same way, but `f` (`position_cursor`) must tell them apart.
    pub fn field(&self, idx: usize) -> Field {
        if self.len == 0 {
            return Field::Absent;
        }
        match self.as_str().split(';').nth(idx) {
            None | Some("") => Field::Absent,
            Some(s) => s.parse::<i64>().map(Field::Value).unwrap_or(Field::Malformed),
        }
    }
}

/// Outcome of parsing one `;`-separated CSI/OSC parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// No digits at all here: the params body was empty, or this position fell
    /// past the end of a bare `;`.
    Absent,
    /// A field was present but didn't parse as a number.
    Malformed,
    Value(i64),
}

pub struct Vt {
    pub rows: u16,
    pub cols: u16,
    pub mode: ParserMode,
    pub current: CursorState,
    pub saved: CursorState,
    pub flags: VtFlags,
    pub params: Params,
    pub arena: LineArena,
    pub viewport: Vec<line::LineId>,
    pub window_title: String,
    pub icon_name: String,
    /// Set by [`ops::scroll_ops::scroll_up`] when a promoted line carried
    /// scroll-back content the owning buffer must redraw.
    pub needs_redraw: bool,
}

impl Vt {
    pub fn new(rows: u16, cols: u16) -> Self {
        let mut arena = LineArena::new();
        let viewport = arena.seed(rows as usize, cols as usize);
        Self {
            rows,
            cols,
            mode: ParserMode::Normal,
            current: CursorState::default(),
            saved: CursorState::default(),
            flags: VtFlags::AUTOSCROLL,
            params: Params::default(),
            arena,
            viewport,
            window_title: String::new(),
            icon_name: String::new(),
            needs_redraw: false,
        }
    }

    /// Full reset to initial state (ESC `c`). Re-seeds the viewport to blank lines
    /// and frees the existing scroll-back chain.
    pub fn reset_to_initial(&mut self) {
        self.arena.free_all();
        self.viewport = self.arena.seed(self.rows as usize, self.cols as usize);
        self.mode = ParserMode::Normal;
        self.current = CursorState::default();
        self.saved = CursorState::default();
        self.flags = VtFlags::AUTOSCROLL;
        self.params.clear();
        self.window_title.clear();
        self.icon_name.clear();
    }

    pub fn get_cell(&self, row: u16, col: u16) -> &Cell {
        let line_id = self.viewport[row as usize];
        &self.arena.get(line_id).cells[col as usize]
    }

    fn current_line_mut(&mut self) -> &mut line::Line {
        let line_id = self.viewport[self.current.row as usize];
        self.arena.get_mut(line_id)
    }

    /// The single entry point: feeds one byte through the parser and applies the
    /// post-interpret fix-up (wrap/clamp, then autoscroll).
    pub fn interpret(&mut self, byte: u8) {
        match self.mode {
            ParserMode::Normal => self.interpret_normal(byte),
            ParserMode::Escape => self.interpret_escape(byte),
            ParserMode::Csi => self.interpret_csi(byte),
            ParserMode::Osc => self.interpret_osc(byte),
        }
        self.fixup_cursor();
    }

    fn write_cell(&mut self, byte: u8) {
        let pen = self.current.pen;
        let col = self.current.col as usize;
        self.current_line_mut().cells[col].write(byte, pen);
        self.current.col += 1;
    }

    fn interpret_normal(&mut self, byte: u8) {
        match byte {
            0x00..=0x06 | 0x07 | 0x0B | 0x0C | 0x0E..=0x1F | 0x7F => {}
            0x08 => {
                if self.current.col > 0 {
                    self.current.col -= 1;
                }
            }
            0x09 => ops::tabstop_ops::horizontal_tab(self),
            0x0A => self.current.row += 1,
            0x0D => self.current.col = 0,
            0x1B => self.mode = ParserMode::Escape,
            other => self.write_cell(other),
        }
    }

    fn interpret_escape(&mut self, byte: u8) {
        self.mode = ParserMode::Normal;
        match byte {
            b'7' => ops::cursor_ops::save_cursor(self),
            b'8' => ops::cursor_ops::restore_cursor(self),
            b'D' => ops::cursor_ops::index_down(self),
            b'E' => ops::cursor_ops::next_line(self),
            b'H' => ops::tabstop_ops::set_tabstop(self),
            b'M' => ops::cursor_ops::reverse_index(self),
            b'[' => {
                self.params.clear();
                self.mode = ParserMode::Csi;
            }
            b']' => {
                self.params.clear();
                self.mode = ParserMode::Osc;
            }
            b'c' => self.reset_to_initial(),
            _ => {}
        }
    }

    fn interpret_csi(&mut self, byte: u8) {
        if byte.is_ascii_alphabetic() {
            self.dispatch_csi(byte);
            self.mode = ParserMode::Normal;
        } else {
            self.params.push(byte);
        }
    }

    fn dispatch_csi(&mut self, command: u8) {
        // Params are read into locals before dispatch: several arms pass `self`
        // mutably while also needing a field read off the same `self`, which two
        // interleaved borrows in one call expression can't satisfy.
        let n = self.params.number(0).filter(|v| *v > 0).unwrap_or(1).max(0) as u16;
        let p0 = self.params.number(0);
        let f0 = self.params.field(0);
        let f1 = self.params.field(1);
        match command {
            b'A' => ops::cursor_ops::cursor_up(self, n),
            b'B' => ops::cursor_ops::cursor_down(self, n),
            b'C' => ops::cursor_ops::cursor_right(self, n),
            b'D' => ops::cursor_ops::cursor_left(self, n),
            b'J' => ops::erase_ops::erase_in_display(self, p0),
            b'K' => ops::erase_ops::erase_in_line(self, p0),
            b'f' => ops::cursor_ops::position_cursor(self, f0, f1),
            b'g' => ops::tabstop_ops::clear_tabstop(self, p0),
            b'h' | b'l' => self.dispatch_mode(),
            b'm' => self.dispatch_sgr(),
            _ => warn!(event = "vt.csi_unknown", command = command as char, "ignoring unsupported CSI final byte"),
        }
    }

    fn dispatch_mode(&mut self) {
        for field in self.params.as_str().split(';') {
            if !field.is_empty() {
                warn!(event = "vt.mode_unsupported", mode = field, "ignoring unsupported mode");
            }
        }
    }

    fn dispatch_sgr(&mut self) {
        let numbers = self.params.numbers();
        if numbers.is_empty() {
            ops::sgr_ops::apply_sgr_param(&mut self.current.pen, None);
        } else {
            for param in numbers {
                ops::sgr_ops::apply_sgr_param(&mut self.current.pen, param);
            }
        }
    }

    fn interpret_osc(&mut self, byte: u8) {
        match byte {
            0x07 => {
                let raw = self.params.as_str().to_string();
                ops::osc_ops::dispatch_osc(self, &raw);
                self.mode = ParserMode::Normal;
            }
            b'\\' if self.params.as_str().ends_with('\x1b') => {
                let body = self.params.as_str();
                let trimmed = &body[..body.len() - 1];
                let raw = trimmed.to_string();
                ops::osc_ops::dispatch_osc(self, &raw);
                self.mode = ParserMode::Normal;
            }
            other => self.params.push(other),
        }
    }

    /// Post-interpret fix-up: wrap or clamp the column, then autoscroll the row.
    fn fixup_cursor(&mut self) {
        if self.current.col == self.cols {
            if self.flags.contains(VtFlags::AUTOWRAP) {
                self.current.col = 0;
                self.current.row += 1;
            } else {
                self.current.col = self.cols - 1;
            }
        }
        if self.current.row == self.rows {
            self.current.row -= 1;
            if self.flags.contains(VtFlags::AUTOSCROLL) {
                ops::scroll_ops::scroll_up(self);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(vt: &mut Vt, s: &str) {
        for b in s.bytes() {
            vt.interpret(b);
        }
    }

    #[test]
    fn scenario_plain_text_and_newline() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "abc\r\ndef");
        assert_eq!(vt.get_cell(0, 0).byte, b'a');
        assert_eq!(vt.get_cell(0, 1).byte, b'b');
        assert_eq!(vt.get_cell(0, 2).byte, b'c');
        assert!(vt.get_cell(0, 0).set);
        assert_eq!(vt.current.row, 1);
        assert_eq!(vt.current.col, 3);
        assert!(!vt.get_cell(0, 3).set);
    }

    #[test]
    fn scenario_tab_fills_spaces() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "\tX");
        assert_eq!(vt.get_cell(0, 8).byte, b'X');
        for col in 0..8 {
            assert_eq!(vt.get_cell(0, col).display_byte(), b' ');
        }
        assert_eq!(vt.current.col, 9);
        assert_eq!(vt.current.row, 0);
    }

    #[test]
    fn scenario_erase_display_then_write() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "xyz");
        feed(&mut vt, "\x1b[2JA");
        assert!(!vt.get_cell(0, 0).set || vt.get_cell(0, 0).byte == b'A');
        assert_eq!(vt.get_cell(0, 0).byte, b'A');
        assert_eq!(vt.current.row, 0);
        assert_eq!(vt.current.col, 1);
        assert_eq!(vt.current.pen, Default::default());
        for col in 1..10 {
            assert!(!vt.get_cell(0, col).set);
        }
    }

    #[test]
    fn scenario_absolute_position() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "\x1b[1;5f@");
        assert_eq!(vt.get_cell(0, 4).byte, b'@');
        assert_eq!(vt.current.row, 0);
        assert_eq!(vt.current.col, 5);
    }

    #[test]
    fn absolute_position_empty_params_go_home() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "\x1b[3;7f");
        feed(&mut vt, "\x1b[f");
        assert_eq!(vt.current.row, 0);
        assert_eq!(vt.current.col, 0);
    }

    #[test]
    fn absolute_position_malformed_params_are_a_no_op() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "\x1b[3;7f");
        feed(&mut vt, "\x1b[x;yf");
        assert_eq!(vt.current.row, 2);
        assert_eq!(vt.current.col, 6);
    }

    #[test]
    fn autowrap_off_clamps_final_column() {
        let mut vt = Vt::new(24, 4);
        feed(&mut vt, "abcd");
        assert_eq!(vt.current.col, 3);
        assert_eq!(vt.get_cell(0, 3).byte, b'd');
        feed(&mut vt, "e");
        assert_eq!(vt.get_cell(0, 3).byte, b'e');
        assert_eq!(vt.current.col, 3);
    }

    #[test]
    fn autowrap_on_advances_to_next_row() {
        let mut vt = Vt::new(24, 4);
        vt.flags.insert(VtFlags::AUTOWRAP);
        feed(&mut vt, "abcd");
        assert_eq!(vt.current.row, 1);
        assert_eq!(vt.current.col, 0);
    }

    #[test]
    fn linefeed_on_last_row_autoscrolls() {
        let mut vt = Vt::new(2, 10);
        feed(&mut vt, "a\nb\nc");
        assert_eq!(vt.current.row, 1);
        assert_eq!(vt.get_cell(0, 0).byte, b'b');
        assert_eq!(vt.get_cell(1, 0).byte, b'c');
    }

    #[test]
    fn save_and_restore_cursor_is_identity() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "abc");
        let before = vt.current.clone();
        feed(&mut vt, "\x1b7");
        feed(&mut vt, "xyz");
        feed(&mut vt, "\x1b8");
        assert_eq!(vt.current, before);
    }

    #[test]
    fn reset_to_initial_restores_cursor_and_tabstops() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "hello\x1b[10C");
        feed(&mut vt, "\x1bc");
        assert_eq!(vt.current, CursorState::default());
        assert!(vt.current.tabstops.is_set(8));
        assert!(!vt.current.tabstops.is_set(1));
    }

    #[test]
    fn save_and_restore_cursor_carries_tabstops_too() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "\x1b7");
        vt.current.tabstops.clear(8);
        feed(&mut vt, "\x1b8");
        assert!(vt.current.tabstops.is_set(8));
    }

    #[test]
    fn sgr_reset_clears_style() {
        let mut vt = Vt::new(24, 80);
        feed(&mut vt, "\x1b[1;4mA\x1b[0mB");
        assert!(vt.get_cell(0, 0).pen.style.contains(cell::StyleFlags::BOLD));
        assert!(vt.get_cell(0, 1).pen.style.is_empty());
    }

    #[test]
    fn out_of_bounds_cursor_never_escapes_grid() {
        let mut vt = Vt::new(5, 5);
        for _ in 0..200 {
            feed(&mut vt, "z");
        }
        assert!(vt.current.row < vt.rows);
        assert!(vt.current.col < vt.cols);
    }
}
