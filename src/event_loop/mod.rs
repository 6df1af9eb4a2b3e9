//! The level-triggered, single-threaded event loop.
//!
//! Unifies fd readiness (via [`crate::pal::pal_poll`]) and UNIX signal delivery (via
//! the self-pipe in [`signal`]) behind one `run_once` call. Scheduling is
//! cooperative: every callback invoked from `run_once` runs to completion before
//! the next `pal_poll` wait.

pub mod registry;
pub mod signal;

use nix::sys::signal::Signal;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pal::{self, PalPollFd, PollFlags};
use registry::{Owner, Registry};
use signal::SelfPipe;

/// One descriptor's readiness, handed back to the caller of [`EventLoop::run_once`]
/// for dispatch. The loop itself holds no dispatch logic beyond the self-pipe,
/// which it drains internally.
pub struct Ready {
    pub owner: Owner,
    pub revents: PollFlags,
}

pub struct EventLoop {
    registry: Registry,
    self_pipe: SelfPipe,
}

impl EventLoop {
    pub fn new() -> Result<Self> {
        let self_pipe = SelfPipe::new()?;
        let mut registry = Registry::new();
        registry.register(self_pipe.read_fd, Owner::SelfPipeRead, PollFlags::IN)?;
        Ok(Self { registry, self_pipe })
    }

    pub fn register(&mut self, fd: std::os::unix::io::RawFd, owner: Owner, interest: PollFlags) -> Result<()> {
        debug!(event = "event_loop.register", fd, ?owner, "registering descriptor");
        self.registry.register(fd, owner, interest)
    }

    pub fn deregister(&mut self, fd: std::os::unix::io::RawFd) {
        debug!(event = "event_loop.deregister", fd, "deregistering descriptor");
        self.registry.deregister(fd);
    }

    pub fn set_interest(&mut self, fd: std::os::unix::io::RawFd, interest: PollFlags) {
        self.registry.set_interest(fd, interest);
    }

    pub fn register_signal(
        &self,
        signal: Signal,
        handler: Option<Box<dyn FnMut(u32, Option<libc::siginfo_t>) + Send>>,
    ) -> Result<()> {
        self.self_pipe.register_signal(signal, handler)
    }

    /// Blocks in `pal_poll` until at least one registered descriptor is ready (or a
    /// signal interrupts the wait), then returns the ready set in registration
    /// order. The self-pipe's own readiness is consumed here and never surfaced to
    /// the caller — it only triggers `drain_and_dispatch`.
    pub fn run_once(&mut self) -> Result<Vec<Ready>> {
        loop {
            let mut fds: Vec<PalPollFd> =
                self.registry.iter().map(|d| PalPollFd::new(d.fd, d.interest)).collect();

            let rc = match pal::pal_poll(&mut fds, -1) {
                Ok(rc) => rc,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!(event = "event_loop.poll_failed", error = %e, "pal_poll failed");
                    return Err(e.into());
                }
            };
            if rc == 0 {
                continue;
            }

            let mut ready = Vec::with_capacity(rc);
            for (desc, fd) in self.registry.iter().zip(fds.iter()) {
                if fd.revents.is_empty() {
                    continue;
                }
                if desc.owner == Owner::SelfPipeRead {
                    self.self_pipe.drain_and_dispatch();
                    continue;
                }
                ready.push(Ready { owner: desc.owner, revents: fd.revents });
            }
            return Ok(ready);
        }
    }
}
