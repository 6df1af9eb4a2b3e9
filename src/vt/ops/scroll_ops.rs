//! Scrolling the viewport across the line chain.

use crate::vt::line::Line;
use crate::vt::Vt;

/// Promotes the line below `bottommost` into view, or allocates a fresh blank one
/// if reverse scrolling never left a line behind. Shifts the viewport left by one.
/// Flags a redraw if the promoted line already held scroll-back content the user
/// must now see.
pub fn scroll_up(vt: &mut Vt) {
    let cols = vt.cols as usize;
    let old_bottom = vt.arena.bottommost.expect("viewport always has a bottommost line");

    let promoted = match vt.arena.next_of(old_bottom) {
        Some(existing) => {
            vt.arena.bottommost = Some(existing);
            let had_content = vt.arena.get(existing).cells.iter().any(|c| c.set);
            if had_content {
                vt.needs_redraw = true;
            }
            existing
        }
        None => vt.arena.push_bottom(Line::blank(cols)),
    };

    let rows = vt.rows as usize;
    for i in 0..rows - 1 {
        vt.viewport[i] = vt.viewport[i + 1];
    }
    vt.viewport[rows - 1] = promoted;
}

/// Symmetric counterpart: inserts or promotes a line above `topmost` and shifts the
/// viewport right by one.
pub fn scroll_down(vt: &mut Vt) {
    let cols = vt.cols as usize;
    let old_top = vt.arena.topmost.expect("viewport always has a topmost line");

    let promoted = match vt.arena.prev_of(old_top) {
        Some(existing) => {
            vt.arena.topmost = Some(existing);
            existing
        }
        None => vt.arena.push_top(Line::blank(cols)),
    };

    let rows = vt.rows as usize;
    for i in (1..rows).rev() {
        vt.viewport[i] = vt.viewport[i - 1];
    }
    vt.viewport[0] = promoted;
}
