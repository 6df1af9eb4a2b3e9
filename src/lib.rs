//! A terminal multiplexer: a level-triggered, self-pipe-based event loop driving a
//! hand-rolled VT100/ANSI screen emulator and a controller that juggles several
//! PTY-backed child shells in one process.

pub mod buffer;
pub mod cli;
pub mod controller;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod pal;
pub mod predictor;
pub mod pty;
pub mod stage;
pub mod vt;

pub use controller::Controller;
pub use error::{MuxError, Result};
