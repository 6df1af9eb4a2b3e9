//! Screen cell and pen (current-style) state.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StyleFlags: u8 {
        const BOLD      = 1 << 0;
        const UNDERLINE = 1 << 1;
        const BLINK     = 1 << 2;
        const REVERSE   = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    pub fn from_index(idx: u8) -> Option<Color> {
        Some(match idx {
            0 => Color::Black,
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Yellow,
            4 => Color::Blue,
            5 => Color::Magenta,
            6 => Color::Cyan,
            7 => Color::White,
            _ => return None,
        })
    }

    /// The SGR parameter number (30-series for foreground; callers add 10 for bg).
    pub fn sgr_offset(self) -> u8 {
        match self {
            Color::Black => 0,
            Color::Red => 1,
            Color::Green => 2,
            Color::Yellow => 3,
            Color::Blue => 4,
            Color::Magenta => 5,
            Color::Cyan => 6,
            Color::White => 7,
        }
    }
}

/// The "current pen": style bits accumulated by `m` (SGR) and stamped onto every
/// cell written thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pen {
    pub style: StyleFlags,
    pub fg: Option<Color>,
    pub bg: Option<Color>,
}

/// One on-screen cell. `set` mirrors the original `CELL_SET` flag: false means the
/// cell has never been written (or was erased) and renders as a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub byte: u8,
    pub set: bool,
    pub pen: Pen,
}

impl Cell {
    pub const BLANK: Cell = Cell { byte: 0, set: false, pen: Pen {
        style: StyleFlags::empty(), fg: None, bg: None,
    } };

    pub fn write(&mut self, byte: u8, pen: Pen) {
        self.byte = byte;
        self.pen = pen;
        self.set = true;
    }

    pub fn erase(&mut self) {
        *self = Cell::BLANK;
    }

    pub fn display_byte(&self) -> u8 {
        if self.set { self.byte } else { b' ' }
    }
}
