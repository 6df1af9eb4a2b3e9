//! Portable `poll`: a thin, allocation-free wrapper over `libc::poll`, with a
//! `select`-based fallback for platforms whose `poll` cannot wait on character
//! devices (PTY masters, notably on some BSD-derived systems).
//!
//! The event loop only ever talks to [`pal_poll`]; which implementation backs it is
//! decided at compile time by target OS, never at runtime.

use std::os::unix::io::RawFd;

use nix::errno::Errno;

bitflags::bitflags! {
    /// Subset of `POLLIN | POLLPRI | POLLRDBAND | POLLOUT | POLLWRBAND | POLLERR | POLLHUP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollFlags: i16 {
        const IN      = libc::POLLIN;
        const PRI     = libc::POLLPRI;
        const RDBAND  = libc::POLLRDBAND;
        const OUT     = libc::POLLOUT;
        const WRBAND  = libc::POLLWRBAND;
        const ERR     = libc::POLLERR;
        const HUP     = libc::POLLHUP;
    }
}

/// One entry in the wait array passed to [`pal_poll`].
#[derive(Debug, Clone, Copy)]
pub struct PalPollFd {
    pub fd: RawFd,
    pub events: PollFlags,
    pub revents: PollFlags,
}

impl PalPollFd {
    pub fn new(fd: RawFd, events: PollFlags) -> Self {
        Self { fd, events, revents: PollFlags::empty() }
    }
}

/// Waits for readiness on `fds`, identical in spirit to POSIX `poll`.
///
/// `timeout_ms` of `-1` blocks indefinitely, `0` polls without blocking. Returns the
/// number of descriptors with a nonzero `revents`, or an `Errno` (including `EINTR`,
/// which the event loop restarts).
pub fn pal_poll(fds: &mut [PalPollFd], timeout_ms: i32) -> Result<usize, Errno> {
    imp::pal_poll(fds, timeout_ms)
}

#[cfg(not(any(target_os = "openbsd", target_os = "netbsd")))]
mod imp {
    use super::*;

    pub fn pal_poll(fds: &mut [PalPollFd], timeout_ms: i32) -> Result<usize, Errno> {
        let mut raw: Vec<libc::pollfd> = fds
            .iter()
            .map(|f| libc::pollfd { fd: f.fd, events: f.events.bits(), revents: 0 })
            .collect();

        let rc = unsafe { libc::poll(raw.as_mut_ptr(), raw.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            return Err(Errno::last());
        }

        for (slot, raw) in fds.iter_mut().zip(raw.iter()) {
            slot.revents = PollFlags::from_bits_truncate(raw.revents);
        }
        Ok(rc as usize)
    }
}

/// `select`-based emulation for platforms where `poll` refuses to wait on PTY
/// masters. `POLLERR`/`POLLHUP` are reported via membership in the exception set,
/// and clear any writable bit that would otherwise be set on the same descriptor.
#[cfg(any(target_os = "openbsd", target_os = "netbsd"))]
mod imp {
    use super::*;
    use std::mem::MaybeUninit;

    pub fn pal_poll(fds: &mut [PalPollFd], timeout_ms: i32) -> Result<usize, Errno> {
        let mut read_set = unsafe { MaybeUninit::<libc::fd_set>::zeroed().assume_init() };
        let mut write_set = unsafe { MaybeUninit::<libc::fd_set>::zeroed().assume_init() };
        let mut err_set = unsafe { MaybeUninit::<libc::fd_set>::zeroed().assume_init() };
        unsafe {
            libc::FD_ZERO(&mut read_set);
            libc::FD_ZERO(&mut write_set);
            libc::FD_ZERO(&mut err_set);
        }

        let mut max_fd = 0;
        for f in fds.iter() {
            if f.events.contains(PollFlags::IN | PollFlags::PRI) {
                unsafe { libc::FD_SET(f.fd, &mut read_set) };
            }
            if f.events.contains(PollFlags::OUT | PollFlags::WRBAND) {
                unsafe { libc::FD_SET(f.fd, &mut write_set) };
            }
            unsafe { libc::FD_SET(f.fd, &mut err_set) };
            max_fd = max_fd.max(f.fd);
        }

        let mut timeout_storage;
        let timeout_ptr = if timeout_ms < 0 {
            std::ptr::null_mut()
        } else {
            timeout_storage = libc::timeval {
                tv_sec: (timeout_ms / 1000) as libc::time_t,
                tv_usec: ((timeout_ms % 1000) * 1000) as libc::suseconds_t,
            };
            &mut timeout_storage as *mut _
        };

        let rc = unsafe {
            libc::select(max_fd + 1, &mut read_set, &mut write_set, &mut err_set, timeout_ptr)
        };
        if rc < 0 {
            return Err(Errno::last());
        }

        let mut ready = 0;
        for f in fds.iter_mut() {
            let mut revents = PollFlags::empty();
            let errored = unsafe { libc::FD_ISSET(f.fd, &err_set) };
            if errored {
                revents |= PollFlags::ERR;
            }
            if unsafe { libc::FD_ISSET(f.fd, &read_set) } {
                revents |= PollFlags::IN;
            }
            if unsafe { libc::FD_ISSET(f.fd, &write_set) } && !errored {
                revents |= PollFlags::OUT;
            }
            f.revents = revents;
            if !revents.is_empty() {
                ready += 1;
            }
        }
        Ok(ready)
    }
}
