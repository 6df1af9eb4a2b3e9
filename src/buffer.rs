//! One multiplexed buffer: a child shell's PTY master, its embedded VT screen, and
//! the staging region for bytes headed to that shell.

use std::os::unix::io::RawFd;

use nix::unistd::Pid;
use tracing::debug;

use crate::error::Result;
use crate::pal::PollFlags;
use crate::predictor::Predictor;
use crate::pty;
use crate::stage::Stage;
use crate::vt::Vt;

/// Staging region bound for a buffer's PTY master.
pub const BUFFER_BUF_SIZE: usize = 1024;
/// Bytes read from the master per readiness tick.
const READ_CHUNK: usize = 1024;

pub enum ReadOutcome {
    /// Bytes read from the child, already fed to the VT; the caller forwards them
    /// to the controller's output stage if this buffer is focused.
    Data(Vec<u8>),
    /// `POLLHUP`/`POLLERR` observed: the child is gone.
    Exited,
}

pub struct Buffer {
    pub slot_id: usize,
    pub master_fd: RawFd,
    pub child_pid: Pid,
    pub vt: Vt,
    stage: Stage,
    #[allow(dead_code)]
    predictor: Predictor,
}

impl Buffer {
    /// `buffer_init`: spins up a predictor, opens a PTY running `command_line`, and
    /// seeds the embedded VT. The caller registers `master_fd` with the event loop.
    pub fn spawn(
        slot_id: usize,
        command_line: &str,
        session_name: &str,
        rows: u16,
        cols: u16,
    ) -> Result<Self> {
        let spawned = pty::tty_new(command_line, slot_id, session_name)?;
        debug!(event = "buffer.spawn_completed", slot = slot_id, "buffer ready");
        Ok(Self {
            slot_id,
            master_fd: spawned.master_fd,
            child_pid: spawned.child_pid,
            vt: Vt::new(rows, cols),
            stage: Stage::new(BUFFER_BUF_SIZE),
            predictor: Predictor::new(),
        })
    }

    /// Read-ready callback. On `HUP`/`ERR` reports `Exited` without touching the fd
    /// further -- the controller tears the buffer down. Otherwise reads up to
    /// [`READ_CHUNK`] bytes, feeding each one to the VT and returning the raw bytes
    /// for the controller's focus-filtered output stage.
    pub fn handle_readable(&mut self, revents: PollFlags) -> Result<ReadOutcome> {
        if revents.intersects(PollFlags::HUP | PollFlags::ERR) {
            return Ok(ReadOutcome::Exited);
        }

        let mut buf = [0u8; READ_CHUNK];
        let n = match nix::unistd::read(self.master_fd, &mut buf) {
            Ok(0) => return Ok(ReadOutcome::Exited),
            Ok(n) => n,
            Err(nix::errno::Errno::EAGAIN) => return Ok(ReadOutcome::Data(Vec::new())),
            Err(nix::errno::Errno::EIO) => return Ok(ReadOutcome::Exited),
            Err(e) => return Err(e.into()),
        };

        for &byte in &buf[..n] {
            self.vt.interpret(byte);
        }
        Ok(ReadOutcome::Data(buf[..n].to_vec()))
    }

    /// Flushes as many staged bytes as the kernel accepts. Returns `true` once the
    /// stage is empty, telling the caller to clear the writable interest bit.
    pub fn flush_writable(&mut self) -> Result<bool> {
        self.stage.flush_to(self.master_fd)?;
        Ok(self.stage.is_empty())
    }

    /// `buffer_output`: queues bytes bound for the child. Fails with
    /// `TemporaryFull` (and appends nothing) if the stage would overflow.
    pub fn buffer_output(&mut self, bytes: &[u8]) -> Result<()> {
        self.stage.append(bytes)
    }

    /// `buffer_input`: the predictor's local-echo path. Feeds `bytes` through the
    /// VT for screen-state purposes and hands them back so the caller can forward
    /// them to the controller's output stage.
    pub fn buffer_input(&mut self, bytes: &[u8]) -> Vec<u8> {
        for &b in bytes {
            self.vt.interpret(b);
        }
        bytes.to_vec()
    }

    /// Renders the full on-screen grid as a byte stream: cursor-home, one byte per
    /// cell (space where unset) with ANSI style enter/leave wrapping, rows
    /// separated by `\r\n`, ending with a cursor-position sequence for the VT's
    /// current position.
    pub fn buffer_redraw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"\x1b[H");

        for row in 0..self.vt.rows {
            if row > 0 {
                out.extend_from_slice(b"\r\n");
            }
            let mut active_style: Option<crate::vt::cell::StyleFlags> = None;
            for col in 0..self.vt.cols {
                let cell = self.vt.get_cell(row, col);
                let has_style = !cell.pen.style.is_empty();
                if has_style {
                    if active_style != Some(cell.pen.style) {
                        emit_style_enter(&mut out, &cell.pen);
                        active_style = Some(cell.pen.style);
                    }
                } else if active_style.is_some() {
                    out.extend_from_slice(b"\x1b[0m");
                    active_style = None;
                }
                out.push(cell.display_byte());
            }
            if active_style.is_some() {
                out.extend_from_slice(b"\x1b[0m");
            }
        }

        out.extend(format!("\x1b[{};{}f", self.vt.current.row + 1, self.vt.current.col + 1).bytes());
        out
    }

    /// `buffer_set_winsize`: pushes the new size to the PTY. Does not resize the VT
    /// grid -- the grid is fixed for the buffer's lifetime.
    pub fn buffer_set_winsize(&self, rows: u16, cols: u16) -> Result<()> {
        pty::tty_set_winsize(self.master_fd, rows, cols)
    }
}

fn emit_style_enter(out: &mut Vec<u8>, pen: &crate::vt::cell::Pen) {
    use crate::vt::cell::StyleFlags;
    out.extend_from_slice(b"\x1b[");
    let mut codes = Vec::new();
    if pen.style.contains(StyleFlags::BOLD) {
        codes.push("1".to_string());
    }
    if pen.style.contains(StyleFlags::UNDERLINE) {
        codes.push("4".to_string());
    }
    if pen.style.contains(StyleFlags::BLINK) {
        codes.push("5".to_string());
    }
    if pen.style.contains(StyleFlags::REVERSE) {
        codes.push("7".to_string());
    }
    out.extend(codes.join(";").bytes());
    out.push(b'm');
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.master_fd);
        pty::reap_if_exited(self.child_pid);
    }
}
