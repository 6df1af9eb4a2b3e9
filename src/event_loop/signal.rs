//! Self-pipe signal delivery.
//!
//! The OS handler is async-signal-safe: per signal, it snapshots `siginfo` into that
//! signal's slot, increments an atomic pending counter, and writes one byte to the
//! pipe, preserving `errno` around the write. Everything else — deciding which
//! handler to call, clearing counters — happens on the read side, inside the event
//! loop thread.

use std::cell::UnsafeCell;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Mutex;

use nix::fcntl::{self, FcntlArg, OFlag};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{self, pipe};

use crate::error::Result;

const NSIG: usize = 64;

/// Holds the most recent `siginfo_t` delivered for a slot. Written only by that
/// slot's OS handler invocation, read only by `drain_and_dispatch` strictly after
/// observing the corresponding pending-count increment -- the two never run
/// concurrently on a single-threaded event loop, so no lock is needed on the hot
/// (signal-delivery) path.
struct SiginfoCell(UnsafeCell<Option<libc::siginfo_t>>);

// SAFETY: access is sequenced (signal handler runs to completion before the
// consumer observes its pending-count increment), never concurrent.
unsafe impl Sync for SiginfoCell {}

struct SignalSlot {
    pending: AtomicU32,
    last_siginfo: SiginfoCell,
    handler: Mutex<Option<Box<dyn FnMut(u32, Option<libc::siginfo_t>) + Send>>>,
}

impl SignalSlot {
    const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            last_siginfo: SiginfoCell(UnsafeCell::new(None)),
            handler: Mutex::new(None),
        }
    }
}

static SELF_PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

static SLOTS: [SignalSlot; NSIG] = [const { SignalSlot::new() }; NSIG];

extern "C" fn dispatch_signal(signo: libc::c_int, info: *mut libc::siginfo_t, _ucontext: *mut libc::c_void) {
    let saved_errno = unsafe { *libc::__errno_location() };

    if let Some(slot) = SLOTS.get(signo as usize) {
        if !info.is_null() {
            // SAFETY: `info` is valid for the duration of this handler per SA_SIGINFO;
            // `ptr::read` performs a bitwise copy without requiring `siginfo_t: Copy`
            // and without disturbing the kernel-owned memory `info` points at.
            let snapshot = unsafe { std::ptr::read(info) };
            // SAFETY: see `SiginfoCell`'s invariant above.
            unsafe { *slot.last_siginfo.0.get() = Some(snapshot) };
        }
        slot.pending.fetch_add(1, Ordering::SeqCst);
    }

    let write_fd = SELF_PIPE_WRITE_FD.load(Ordering::SeqCst);
    if write_fd >= 0 {
        let byte: u8 = 1;
        unsafe {
            libc::write(write_fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }

    unsafe { *libc::__errno_location() = saved_errno };
}

/// Owns the self-pipe's two ends and installs `sigaction`s on demand.
pub struct SelfPipe {
    pub read_fd: RawFd,
    write_fd: RawFd,
}

impl SelfPipe {
    pub fn new() -> Result<Self> {
        let (read_fd, write_fd) = pipe()?;
        let read_fd = std::os::fd::IntoRawFd::into_raw_fd(read_fd);
        let write_fd = std::os::fd::IntoRawFd::into_raw_fd(write_fd);

        for fd in [read_fd, write_fd] {
            let flags = fcntl::fcntl(fd, FcntlArg::F_GETFL)?;
            let mut flags = OFlag::from_bits_truncate(flags);
            flags.insert(OFlag::O_NONBLOCK);
            fcntl::fcntl(fd, FcntlArg::F_SETFL(flags))?;
        }

        SELF_PIPE_WRITE_FD.store(write_fd, Ordering::SeqCst);
        Ok(Self { read_fd, write_fd })
    }

    /// Installs (or replaces) the handler invoked for `signal` once its pending
    /// count is observed nonzero on the read side. Passing `None` unregisters it
    /// without touching the installed `sigaction` (the kernel still delivers the
    /// signal; it is simply no longer dispatched to user code).
    pub fn register_signal(
        &self,
        signal: Signal,
        handler: Option<Box<dyn FnMut(u32, Option<libc::siginfo_t>) + Send>>,
    ) -> Result<()> {
        let idx = signal as usize;
        let slot = &SLOTS[idx];
        let first_registration = slot.handler.lock().unwrap().is_none() && handler.is_some();
        *slot.handler.lock().unwrap() = handler;

        if first_registration {
            let action = SigAction::new(
                SigHandler::SigAction(dispatch_signal),
                SaFlags::SA_SIGINFO | SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            unsafe { nix::sys::signal::sigaction(signal, &action)? };
        }
        Ok(())
    }

    /// Drains the pipe (bounded read) then invokes every slot with a nonzero
    /// pending count, passing the slot's most recently snapshotted `siginfo` and
    /// zeroing the count after the handler runs.
    pub fn drain_and_dispatch(&self) {
        let mut buf = [0u8; 64];
        loop {
            match unistd::read(self.read_fd, &mut buf) {
                Ok(0) => break,
                Ok(n) if n < buf.len() => break,
                Ok(_) => continue,
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(_) => break,
            }
        }

        for slot in SLOTS.iter() {
            let count = slot.pending.swap(0, Ordering::SeqCst);
            if count == 0 {
                continue;
            }
            // SAFETY: sequenced after the handler's write by the swap above; both
            // run on this same thread, never concurrently.
            let siginfo = unsafe { std::ptr::read(slot.last_siginfo.0.get()) };
            if let Some(handler) = slot.handler.lock().unwrap().as_mut() {
                handler(count, siginfo);
            }
        }
    }
}

impl Drop for SelfPipe {
    fn drop(&mut self) {
        SELF_PIPE_WRITE_FD.store(-1, Ordering::SeqCst);
        let _ = unistd::close(self.read_fd);
        let _ = unistd::close(self.write_fd);
    }
}
