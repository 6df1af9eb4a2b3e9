//! Raw PTY plumbing: opening the master/slave pair, forking the child shell, and
//! the controller-TTY save/restore/configure dance.

use std::ffi::CString;
use std::os::fd::IntoRawFd;
use std::os::unix::io::{AsRawFd, RawFd};

use nix::fcntl::{open, OFlag};
use nix::pty::{grantpt, posix_openpt, unlockpt};
use nix::sys::stat::Mode;
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use nix::unistd::{self, ForkResult};
use tracing::{debug, warn};

use crate::error::{MuxError, Result, SetupFailure};

nix::ioctl_read_bad!(ioctl_tiocgwinsz, libc::TIOCGWINSZ, libc::winsize);
nix::ioctl_write_ptr_bad!(ioctl_tiocswinsz, libc::TIOCSWINSZ, libc::winsize);
nix::ioctl_write_int_bad!(ioctl_tiocsctty, libc::TIOCSCTTY);

/// Result of [`tty_new`]: the parent keeps only the master fd, close-on-exec, wired
/// straight to the event loop.
pub struct SpawnedPty {
    pub master_fd: RawFd,
    pub child_pid: unistd::Pid,
}

/// Opens a PTY pair, forks, and execs `command_line` in the child with the slave as
/// its controlling TTY. Returns the master fd to the parent; never returns in a
/// child that successfully exec'd.
///
/// The slave is opened here, in the parent, before the fork -- so a slave-open
/// failure is reported through the same `Result` as `openpt`/`grantpt`/`unlockpt`
/// instead of surfacing only as a silent nonzero exit in the child.
pub fn tty_new(command_line: &str, slot_id: usize, session_name: &str) -> Result<SpawnedPty> {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY)
        .map_err(SetupFailure::OpenPt)?;
    grantpt(&master).map_err(SetupFailure::GrantPt)?;
    unlockpt(&master).map_err(SetupFailure::UnlockPt)?;

    let slave_name = unsafe { nix::pty::ptsname(&master) }.map_err(SetupFailure::PtsName)?;
    let slave_fd = open(slave_name.as_str(), OFlag::O_RDWR, Mode::empty()).map_err(SetupFailure::SlaveOpen)?;

    set_close_on_exec(master.as_raw_fd())?;

    match unsafe { unistd::fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!(event = "pty.spawn_started", slot = slot_id, pid = child.as_raw(), "forked child");
            let _ = unistd::close(slave_fd);
            Ok(SpawnedPty { master_fd: master.into_raw_fd(), child_pid: child })
        }
        Ok(ForkResult::Child) => {
            exec_child(slave_fd, command_line, slot_id, session_name);
            unreachable!("exec_child never returns on success and exits on failure")
        }
        Err(e) => {
            let _ = unistd::close(slave_fd);
            Err(SetupFailure::Fork(e).into())
        }
    }
}

fn set_close_on_exec(fd: RawFd) -> Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    let flags = fcntl(fd, FcntlArg::F_GETFD)?;
    let mut flags = FdFlag::from_bits_truncate(flags);
    flags.insert(FdFlag::FD_CLOEXEC);
    fcntl(fd, FcntlArg::F_SETFD(flags))?;
    Ok(())
}

/// Runs entirely in the forked child, given the slave fd the parent already opened.
/// Sets up the session and controlling TTY, and execs. Never returns to the caller
/// on success; exits nonzero if anything in the setup or the exec itself fails.
fn exec_child(slave_fd: RawFd, command_line: &str, slot_id: usize, session_name: &str) -> ! {
    if unistd::setsid().is_err() {
        std::process::exit(1);
    }

    if unsafe { ioctl_tiocsctty(slave_fd, 0) }.is_err() {
        std::process::exit(1);
    }

    for dst in 0..3 {
        if unistd::dup2(slave_fd, dst).is_err() {
            std::process::exit(1);
        }
    }
    if slave_fd > 2 {
        let _ = unistd::close(slave_fd);
    }

    let (program, argv) = tokenize_command_line(command_line);

    // SAFETY: single-threaded child between fork and exec; only async-signal-safe
    // libc calls follow.
    unsafe {
        std::env::set_var("TACHYON_BUFNUM", slot_id.to_string());
        std::env::set_var("TACHYON_SESSION", session_name);
    }

    let c_program = CString::new(program.clone()).unwrap();
    let c_argv: Vec<CString> = argv.iter().map(|a| CString::new(a.as_str()).unwrap()).collect();

    let _ = unistd::execvp(&c_program, &c_argv);
    std::process::exit(127);
}

/// Splits `command_line` on whitespace into argv, with `argv[0]` rewritten to the
/// basename after the last `/` (or the literal string `"unknown"` if empty).
fn tokenize_command_line(command_line: &str) -> (String, Vec<CString>) {
    let parts: Vec<&str> = command_line.split_whitespace().collect();
    let full_path = parts.first().copied().unwrap_or("/bin/sh").to_string();
    let basename = full_path.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("unknown");

    let mut argv = vec![CString::new(basename).unwrap()];
    argv.extend(parts.iter().skip(1).map(|a| CString::new(*a).unwrap()));
    (full_path, argv)
}

/// Snapshot of the controller TTY's attributes, restored on clean exit.
pub struct SavedTermState {
    fd: RawFd,
    termios: Termios,
}

pub fn tty_save_termstate(fd: RawFd) -> Result<SavedTermState> {
    let termios = termios::tcgetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) })?;
    Ok(SavedTermState { fd, termios })
}

pub fn tty_restore_termstate(saved: &SavedTermState) -> Result<()> {
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(saved.fd) };
    termios::tcsetattr(borrowed, SetArg::TCSANOW, &saved.termios)?;
    Ok(())
}

/// Switches the controller TTY to non-canonical mode (`ICANON|ECHO|ECHONL`
/// cleared, `VMIN=1`) and makes stdout unbuffered.
pub fn tty_configure_control_tty(fd: RawFd) -> Result<()> {
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    let mut attrs = termios::tcgetattr(borrowed)?;
    attrs.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ECHONL);
    attrs.control_chars[libc::VMIN as usize] = 1;
    attrs.control_chars[libc::VTIME as usize] = 0;
    termios::tcsetattr(borrowed, SetArg::TCSANOW, &attrs)?;
    Ok(())
}

pub fn tty_set_winsize(fd: RawFd, rows: u16, cols: u16) -> Result<()> {
    let ws = libc::winsize { ws_row: rows, ws_col: cols, ws_xpixel: 0, ws_ypixel: 0 };
    unsafe { ioctl_tiocswinsz(fd, &ws) }?;
    Ok(())
}

pub fn tty_get_winsize(fd: RawFd) -> Result<(u16, u16)> {
    let mut ws = libc::winsize { ws_row: 0, ws_col: 0, ws_xpixel: 0, ws_ypixel: 0 };
    unsafe { ioctl_tiocgwinsz(fd, &mut ws) }?;
    Ok((ws.ws_row, ws.ws_col))
}

/// Waits for the child to exit without blocking indefinitely; used when a buffer
/// reports `ChildExited` so the zombie doesn't linger.
pub fn reap_if_exited(pid: unistd::Pid) {
    use nix::sys::wait::{waitpid, WaitPidFlag};
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => debug!(event = "pty.reaped", pid = pid.as_raw(), ?status, "reaped child"),
        Err(e) => warn!(event = "pty.reap_failed", pid = pid.as_raw(), error = %e, "waitpid failed"),
    }
}
