//! PTY host: opening master/slave pairs, forking shells, and owning the
//! controller TTY's saved attributes for the process lifetime.

pub mod host;

pub use host::{
    reap_if_exited, tty_configure_control_tty, tty_get_winsize, tty_new, tty_restore_termstate,
    tty_save_termstate, tty_set_winsize, SavedTermState, SpawnedPty,
};
