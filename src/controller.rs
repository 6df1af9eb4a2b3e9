//! The multiplexer's controller: buffer slots, focus, the last-used stack, the
//! metakey parser, and SIGWINCH propagation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::buffer::{Buffer, ReadOutcome};
use crate::error::Result;
use crate::event_loop::registry::Owner;
use crate::event_loop::EventLoop;
use crate::pal::PollFlags;
use crate::pty;
use crate::stage::Stage;

pub const CONTROLLER_MAX_BUFS: usize = 10;
pub const CONTROLLER_BUF_SIZE: usize = 102_400;
const LAST_USED_STACK_LEN: usize = CONTROLLER_MAX_BUFS - 1;

const STDIN_FD: std::os::unix::io::RawFd = libc::STDIN_FILENO;
const STDOUT_FD: std::os::unix::io::RawFd = libc::STDOUT_FILENO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    /// Literal character whose Ctrl-form escapes into command mode.
    pub meta: u8,
    pub buffer_create: u8,
    pub buffer_next: u8,
    pub buffer_prev: u8,
    pub buffer_last: u8,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self { meta: b'T', buffer_create: b'c', buffer_next: b'n', buffer_prev: b'p', buffer_last: b'l' }
    }
}

fn control_code(c: u8) -> u8 {
    c & 0x1f
}

#[derive(Debug, Clone)]
pub struct Options {
    pub predict: bool,
    pub verbosity: i8,
    pub new_buf_command: String,
    pub session_name: String,
    pub keys: KeyBindings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaState {
    Idle,
    AwaitingCommand,
}

pub struct Controller {
    event_loop: EventLoop,
    buffers: Vec<Option<Buffer>>,
    current_index: usize,
    last_used_stack: [i32; LAST_USED_STACK_LEN],
    terminal_rows: u16,
    terminal_cols: u16,
    stdout_stage: Stage,
    options: Options,
    meta_state: MetaState,
    running: bool,
    termstate: pty::SavedTermState,
    winch_pending: Arc<AtomicBool>,
}

impl Controller {
    /// Caches the controller TTY's size, saves and reconfigures its termios state,
    /// installs SIGWINCH, spawns buffer 0, and forces an initial window-size push.
    pub fn init(options: Options) -> Result<Self> {
        let (terminal_rows, terminal_cols) = pty::tty_get_winsize(STDIN_FD)?;
        let termstate = pty::tty_save_termstate(STDIN_FD)?;
        pty::tty_configure_control_tty(STDIN_FD)?;

        let mut event_loop = EventLoop::new()?;
        event_loop.register(STDIN_FD, Owner::Stdin, PollFlags::IN)?;
        event_loop.register(STDOUT_FD, Owner::Stdout, PollFlags::empty())?;

        let winch_pending = Arc::new(AtomicBool::new(false));
        let flag = winch_pending.clone();
        event_loop.register_signal(
            Signal::SIGWINCH,
            Some(Box::new(move |_count, _siginfo| {
                flag.store(true, Ordering::SeqCst);
            })),
        )?;

        let mut buffers: Vec<Option<Buffer>> = (0..CONTROLLER_MAX_BUFS).map(|_| None).collect();
        let buffer0 = Buffer::spawn(0, &options.new_buf_command, &options.session_name, terminal_rows, terminal_cols)?;
        event_loop.register(buffer0.master_fd, Owner::Buffer(0), PollFlags::IN)?;
        buffers[0] = Some(buffer0);

        let mut controller = Self {
            event_loop,
            buffers,
            current_index: 0,
            last_used_stack: [-1; LAST_USED_STACK_LEN],
            terminal_rows,
            terminal_cols,
            stdout_stage: Stage::new(CONTROLLER_BUF_SIZE),
            options,
            meta_state: MetaState::Idle,
            running: true,
            termstate,
            winch_pending,
        };

        controller.handle_sigwinch()?;
        Ok(controller)
    }

    /// Runs `run_once` in a tight loop until `running` flips, restoring the
    /// controller TTY's attributes on the way out regardless of how the loop ends.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_inner();
        if let Err(e) = pty::tty_restore_termstate(&self.termstate) {
            warn!(event = "controller.termstate_restore_failed", error = %e, "failed to restore tty state");
        }
        result
    }

    fn run_inner(&mut self) -> Result<()> {
        while self.running {
            let ready = self.event_loop.run_once()?;

            if self.winch_pending.swap(false, Ordering::SeqCst) {
                self.handle_sigwinch()?;
            }

            for r in ready {
                self.dispatch(r.owner, r.revents)?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, owner: Owner, revents: PollFlags) -> Result<()> {
        match owner {
            Owner::Stdin => self.handle_stdin_readable()?,
            Owner::Stdout => self.handle_stdout_writable()?,
            Owner::Buffer(slot) => self.handle_buffer_event(slot, revents)?,
            Owner::SelfPipeRead => {}
        }
        Ok(())
    }

    fn handle_stdin_readable(&mut self) -> Result<()> {
        let mut buf = [0u8; 1024];
        let n = match nix::unistd::read(STDIN_FD, &mut buf) {
            Ok(0) => {
                self.running = false;
                return Ok(());
            }
            Ok(n) => n,
            Err(nix::errno::Errno::EAGAIN) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let forward = self.filter_metakeys(&buf[..n]);
        if !forward.is_empty() {
            let current = self.current_index;
            if let Some(buf) = self.buffers[current].as_mut() {
                match buf.buffer_output(&forward) {
                    Ok(()) => self.event_loop.set_interest(
                        buf.master_fd,
                        PollFlags::IN | PollFlags::OUT,
                    ),
                    Err(_) => warn!(event = "controller.input_dropped", slot = current, "pty stage full, dropping keystrokes"),
                }
            }
        }
        Ok(())
    }

    /// Runs stdin bytes through the metakey state machine, executing any command
    /// bytes as side effects and returning the bytes that should reach the
    /// focused buffer unchanged.
    fn filter_metakeys(&mut self, bytes: &[u8]) -> Vec<u8> {
        let meta = self.options.keys.meta;
        let keys = self.options.keys;
        let mut forward = Vec::with_capacity(bytes.len());

        for &b in bytes {
            match self.meta_state {
                MetaState::Idle => {
                    if b == control_code(meta) {
                        self.meta_state = MetaState::AwaitingCommand;
                    } else {
                        forward.push(b);
                    }
                }
                MetaState::AwaitingCommand => {
                    self.meta_state = MetaState::Idle;
                    if b == meta {
                        forward.push(control_code(meta));
                    } else if b == keys.buffer_create {
                        self.cmd_create_buffer();
                    } else if b == keys.buffer_next {
                        self.cmd_switch_relative(1);
                    } else if b == keys.buffer_prev {
                        self.cmd_switch_relative(-1);
                    } else if b == keys.buffer_last {
                        self.cmd_switch_last();
                    } else if b.is_ascii_digit() {
                        self.cmd_jump((b - b'0') as usize);
                    } else {
                        warn!(event = "controller.metakey_unknown", byte = b, "ignoring unrecognised metakey command");
                    }
                }
            }
        }
        forward
    }

    fn cmd_create_buffer(&mut self) {
        let Some(slot) = (0..CONTROLLER_MAX_BUFS).find(|&i| self.buffers[i].is_none()) else {
            self.notify("all buffer slots are in use");
            return;
        };
        match Buffer::spawn(slot, &self.options.new_buf_command, &self.options.session_name, self.terminal_rows, self.terminal_cols) {
            Ok(buffer) => {
                if let Err(e) = self.event_loop.register(buffer.master_fd, Owner::Buffer(slot), PollFlags::IN) {
                    warn!(event = "controller.register_failed", slot, error = %e, "failed to register new buffer");
                    return;
                }
                self.buffers[slot] = Some(buffer);
                info!(event = "controller.buffer_created", slot, "spawned new buffer");
                self.set_current_buffer(slot);
            }
            Err(e) => {
                warn!(event = "controller.spawn_failed", error = %e, "failed to spawn new buffer");
                self.notify("failed to create buffer");
            }
        }
    }

    fn cmd_switch_relative(&mut self, direction: i32) {
        let occupied: Vec<usize> = (0..CONTROLLER_MAX_BUFS).filter(|&i| self.buffers[i].is_some()).collect();
        if occupied.len() < 2 {
            self.notify("no other buffer");
            return;
        }
        let pos = occupied.iter().position(|&i| i == self.current_index).unwrap_or(0) as i32;
        let len = occupied.len() as i32;
        let next = occupied[((pos + direction).rem_euclid(len)) as usize];
        self.set_current_buffer(next);
    }

    fn cmd_switch_last(&mut self) {
        let top = self.last_used_stack[0];
        if top >= 0 && self.buffers[top as usize].is_some() {
            self.set_current_buffer(top as usize);
        } else {
            self.notify("no other buffer");
        }
    }

    fn cmd_jump(&mut self, n: usize) {
        if n < CONTROLLER_MAX_BUFS && self.buffers[n].is_some() {
            self.set_current_buffer(n);
        } else {
            self.notify("no such buffer");
        }
    }

    /// `set_current_buffer`: pushes the old focus onto the last-used stack, clears
    /// the controller TTY, and requests a full redraw of the newly focused buffer.
    fn set_current_buffer(&mut self, n: usize) {
        let old = self.current_index;
        if old != n {
            stack_swap(&mut self.last_used_stack, old as i32, n as i32);
        }
        self.current_index = n;
        debug!(event = "controller.focus_changed", from = old, to = n, "switched focus");

        let _ = self.stdout_stage.append(b"\x1b[2J");
        if let Some(buf) = &self.buffers[n] {
            let redraw = buf.buffer_redraw();
            if self.stdout_stage.append(&redraw).is_err() {
                warn!(event = "controller.redraw_dropped", slot = n, "stdout stage full, dropping redraw");
            }
        }
        self.event_loop.set_interest(STDOUT_FD, PollFlags::OUT);
    }

    fn handle_stdout_writable(&mut self) -> Result<()> {
        self.stdout_stage.flush_to(STDOUT_FD)?;
        if self.stdout_stage.is_empty() {
            self.event_loop.set_interest(STDOUT_FD, PollFlags::empty());
        }
        Ok(())
    }

    fn handle_buffer_event(&mut self, slot: usize, revents: PollFlags) -> Result<()> {
        if revents.contains(PollFlags::OUT) {
            if let Some(buf) = self.buffers[slot].as_mut() {
                let master_fd = buf.master_fd;
                let drained = buf.flush_writable()?;
                if drained {
                    self.event_loop.set_interest(master_fd, PollFlags::IN);
                }
            }
        }

        if revents.intersects(PollFlags::IN | PollFlags::HUP | PollFlags::ERR) {
            let outcome = match self.buffers[slot].as_mut() {
                Some(buf) => buf.handle_readable(revents)?,
                None => return Ok(()),
            };
            match outcome {
                ReadOutcome::Data(bytes) => {
                    if !bytes.is_empty() {
                        self.controller_output(slot, &bytes)?;
                    }
                }
                ReadOutcome::Exited => {
                    self.controller_buffer_exiting(slot)?;
                }
            }
        }
        Ok(())
    }

    /// `controller_output`: bytes from a buffer reach stdout only while that
    /// buffer is focused; otherwise they are dropped (the buffer's own VT already
    /// recorded the screen state).
    fn controller_output(&mut self, bufid: usize, bytes: &[u8]) -> Result<()> {
        if bufid != self.current_index {
            return Ok(());
        }
        self.stdout_stage.append(bytes)?;
        self.event_loop.set_interest(STDOUT_FD, PollFlags::OUT);
        Ok(())
    }

    /// `controller_buffer_exiting`: frees the buffer, picks a successor (stack top
    /// else next occupied slot), and ends the loop if none remain.
    fn controller_buffer_exiting(&mut self, bufid: usize) -> Result<()> {
        if let Some(buf) = self.buffers[bufid].take() {
            self.event_loop.deregister(buf.master_fd);
            info!(event = "controller.buffer_exited", slot = bufid, "child exited, freeing buffer");
        }

        let successor = if self.last_used_stack[0] >= 0 {
            Some(self.last_used_stack[0] as usize)
        } else {
            (1..=CONTROLLER_MAX_BUFS)
                .map(|off| (bufid + off) % CONTROLLER_MAX_BUFS)
                .find(|&i| self.buffers[i].is_some())
        };

        match successor {
            None => {
                info!(event = "controller.no_buffers_remaining", "last buffer exited, shutting down");
                self.running = false;
            }
            Some(next) => {
                stack_remove(&mut self.last_used_stack, bufid as i32);
                self.set_current_buffer(next);
            }
        }
        Ok(())
    }

    /// SIGWINCH handling: re-reads the controller TTY's size and pushes it to the
    /// focused buffer's PTY; propagation stops there (the child observes SIGWINCH
    /// via the kernel once the PTY's winsize changes).
    fn handle_sigwinch(&mut self) -> Result<()> {
        let (rows, cols) = pty::tty_get_winsize(STDIN_FD)?;
        self.terminal_rows = rows;
        self.terminal_cols = cols;
        debug!(event = "controller.winch", rows, cols, "window size changed");

        let current = self.current_index;
        if let Some(buf) = &self.buffers[current] {
            buf.buffer_set_winsize(rows, cols)?;
        }
        Ok(())
    }

    fn notify(&mut self, message: &str) {
        let _ = self.stdout_stage.append(format!("\r\n*** {message} ***\r\n").as_bytes());
        self.event_loop.set_interest(STDOUT_FD, PollFlags::OUT);
    }
}

/// `swap(leaving, entering)`: if `entering` is already on top, overwrite it with
/// `leaving`; otherwise find `entering` (or the first free slot), shift the prefix
/// right by one, and place `leaving` on top.
fn stack_swap(stack: &mut [i32], leaving: i32, entering: i32) {
    if stack[0] == entering {
        stack[0] = leaving;
        return;
    }
    let idx = stack.iter().position(|&x| x == entering || x == -1).unwrap_or(stack.len() - 1);
    for i in (1..=idx).rev() {
        stack[i] = stack[i - 1];
    }
    stack[0] = leaving;
}

/// `remove(n)`: drop `n` from the stack, shifting the tail left and clearing the
/// vacated slot.
fn stack_remove(stack: &mut [i32], n: i32) {
    if let Some(idx) = stack.iter().position(|&x| x == n) {
        for i in idx..stack.len() - 1 {
            stack[i] = stack[i + 1];
        }
        *stack.last_mut().unwrap() = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_swap_pushes_old_focus_to_top() {
        let mut stack = [-1; 9];
        stack_swap(&mut stack, 0, 1);
        assert_eq!(stack[0], 0);
        stack_swap(&mut stack, 1, 2);
        assert_eq!(stack[0], 1);
        assert_eq!(stack[1], 0);
    }

    #[test]
    fn switching_back_and_forth_restores_prior_top() {
        // Starting focused on some other slot (2), set_current_buffer(a=0);
        // set_current_buffer(b=1); set_current_buffer(a=0) should leave top = b.
        let mut stack = [-1; 9];
        stack_swap(&mut stack, 2, 0); // focus 2 -> a
        stack_swap(&mut stack, 0, 1); // focus a -> b
        stack_swap(&mut stack, 1, 0); // focus b -> a
        assert_eq!(stack[0], 1);
    }

    #[test]
    fn stack_remove_shifts_tail_and_clears_vacated_slot() {
        let mut stack = [-1; 9];
        stack[0] = 3;
        stack[1] = 1;
        stack[2] = 2;
        stack_remove(&mut stack, 1);
        assert_eq!(stack[0], 3);
        assert_eq!(stack[1], 2);
        assert_eq!(stack[2], -1);
    }

    #[test]
    fn control_code_masks_to_ctrl_range() {
        assert_eq!(control_code(b'T'), 0x14);
        assert_eq!(control_code(b't'), 0x14);
    }
}
