//! Fixed-capacity output staging, shared by [`crate::buffer::Buffer`] (1024 bytes,
//! bound for a PTY master) and [`crate::controller::Controller`] (102400 bytes,
//! bound for stdout).

use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::unistd;

use crate::error::{MuxError, Result};

pub struct Stage {
    data: VecDeque<u8>,
    capacity: usize,
}

impl Stage {
    pub fn new(capacity: usize) -> Self {
        Self { data: VecDeque::with_capacity(capacity.min(4096)), capacity }
    }

    /// Appends `bytes` whole or not at all: either every byte fits, or none do and
    /// `TemporaryFull` is returned.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.data.len() + bytes.len() > self.capacity {
            return Err(MuxError::TemporaryFull);
        }
        self.data.extend(bytes.iter().copied());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes as many staged bytes as the kernel currently accepts to `fd`. Returns
    /// the number of bytes written; a `WouldBlock`-equivalent errno is treated as
    /// "wrote zero this round", not an error.
    pub fn flush_to(&mut self, fd: RawFd) -> Result<usize> {
        let mut total = 0;
        while !self.data.is_empty() {
            let (chunk, _) = self.data.as_slices();
            match unistd::write(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.data.drain(..n);
                    total += n;
                }
                Err(Errno::EAGAIN) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }
}
