//! `0x09` (HT), ESC `H` (set tabstop), and CSI `g` (clear tabstop(s)).

use crate::vt::Vt;

/// Advances to the next set tabstop strictly after the cursor, filling intervening
/// cells with space along the way (the cells are overwritten, not flagged unset).
pub fn horizontal_tab(vt: &mut Vt) {
    let row = vt.current.row;
    let from = vt.current.col;
    let target = vt.current.tabstops.next_after(from as usize, (vt.cols - 1) as usize) as u16;

    let line_id = vt.viewport[row as usize];
    let line = vt.arena.get_mut(line_id);
    for col in from..target {
        line.cells[col as usize].write(b' ', vt.current.pen);
    }
    vt.current.col = target;
}

pub fn set_tabstop(vt: &mut Vt) {
    let col = vt.current.col as usize;
    vt.current.tabstops.set(col);
}

/// CSI `g`: `0`/empty clears the tabstop at the cursor, `3` clears all.
pub fn clear_tabstop(vt: &mut Vt, mode: Option<i64>) {
    match mode.unwrap_or(0) {
        3 => vt.current.tabstops.clear_all(),
        _ => {
            let col = vt.current.col as usize;
            vt.current.tabstops.clear(col);
        }
    }
}
