//! Cursor movement: CSI `A/B/C/D`, ESC `D/E/M`, and the ESC `7`/`8` save/restore pair.

use crate::vt::{Field, Vt};

pub fn cursor_up(vt: &mut Vt, n: u16) {
    vt.current.row = vt.current.row.saturating_sub(n);
}

pub fn cursor_down(vt: &mut Vt, n: u16) {
    vt.current.row = (vt.current.row + n).min(vt.rows - 1);
}

pub fn cursor_right(vt: &mut Vt, n: u16) {
    vt.current.col = (vt.current.col + n).min(vt.cols - 1);
}

pub fn cursor_left(vt: &mut Vt, n: u16) {
    vt.current.col = vt.current.col.saturating_sub(n);
}

pub fn save_cursor(vt: &mut Vt) {
    vt.saved = vt.current.clone();
}

pub fn restore_cursor(vt: &mut Vt) {
    vt.current = vt.saved.clone();
}

/// ESC `D`: cursor down, one row, never scrolling on its own.
pub fn index_down(vt: &mut Vt) {
    vt.current.row += 1;
}

/// ESC `E`: next line.
pub fn next_line(vt: &mut Vt) {
    vt.current.row += 1;
    vt.current.col = 0;
}

/// ESC `M`: reverse index. Scrolls the viewport down when already at the top row.
pub fn reverse_index(vt: &mut Vt) {
    if vt.current.row == 0 {
        super::scroll_ops::scroll_down(vt);
    } else {
        vt.current.row -= 1;
    }
}

/// CSI `f`: absolute cursor position, 1-indexed with `0` aliased to `1`. Both
/// fields absent (empty params, or a bare `;`) means home `(0, 0)`; anything else
/// requires both fields to parse as numbers or the whole command is a no-op.
pub fn position_cursor(vt: &mut Vt, row_field: Field, col_field: Field) {
    let (row, col) = match (row_field, col_field) {
        (Field::Absent, Field::Absent) => (0, 0),
        (Field::Value(row), Field::Value(col)) => (row.max(0) as u16, col.max(0) as u16),
        _ => return,
    };
    let row = row.saturating_sub(1).min(vt.rows - 1);
    let col = col.saturating_sub(1).min(vt.cols - 1);
    vt.current.row = row;
    vt.current.col = col;
}
