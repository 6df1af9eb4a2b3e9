//! CSI/OSC command implementations, one file per concern, mirroring the teacher's
//! split of `operations/*.rs` files by terminal-command family. Each function is a
//! plain, directly-called operation over `&mut Vt` -- no trait objects, no
//! indirect dispatch table.

pub mod cursor_ops;
pub mod erase_ops;
pub mod osc_ops;
pub mod scroll_ops;
pub mod sgr_ops;
pub mod tabstop_ops;
