//! `m` (Select Graphic Rendition) handling.

use tracing::warn;

use crate::vt::cell::{Color, Pen, StyleFlags};

/// Applies one SGR parameter to `pen`. `0`/missing resets every style bit; unknown
/// numbers are logged and otherwise ignored, matching the teacher's treatment of
/// unrecognised attribute codes.
pub fn apply_sgr_param(pen: &mut Pen, param: Option<i64>) {
    match param.unwrap_or(0) {
        0 => *pen = Pen::default(),
        1 => pen.style.insert(StyleFlags::BOLD),
        4 => pen.style.insert(StyleFlags::UNDERLINE),
        5 => pen.style.insert(StyleFlags::BLINK),
        7 => pen.style.insert(StyleFlags::REVERSE),
        n @ 30..=37 => pen.fg = Color::from_index((n - 30) as u8),
        n @ 40..=47 => pen.bg = Color::from_index((n - 40) as u8),
        n => warn!(event = "vt.sgr_unknown", param = n, "ignoring unrecognised SGR parameter"),
    }
}
