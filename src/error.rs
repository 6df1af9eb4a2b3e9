//! The error taxonomy shared across the event loop, PTY host, buffers and controller.
//!
//! Mirrors the categories in the design doc: `OutOfMemory`, `TemporaryFull`,
//! `ChildExited`, `SetupFailure`, `ParseError`. `ParseError` never leaves the VT
//! emulator (see [`crate::vt`]), so it has no variant here.

use thiserror::Error;

/// Failures that can occur while opening the PTY device pair and forking the child.
///
/// Kept as a distinct enum (rather than folding into [`MuxError`] directly) so that
/// `tty_new`'s four failure points stay individually diagnosable, matching the
/// distinct negative return codes the original design calls for.
#[derive(Debug, Error)]
pub enum SetupFailure {
    #[error("failed to open a PTY master (posix_openpt): {0}")]
    OpenPt(#[source] nix::Error),
    #[error("grantpt failed on the PTY master: {0}")]
    GrantPt(#[source] nix::Error),
    #[error("unlockpt failed on the PTY master: {0}")]
    UnlockPt(#[source] nix::Error),
    #[error("ptsname failed on the PTY master: {0}")]
    PtsName(#[source] nix::Error),
    #[error("failed to open the PTY slave: {0}")]
    SlaveOpen(#[source] nix::Error),
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),
}

/// Top-level error type propagated with `?` through the event loop, PTY host, buffer,
/// and controller.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum MuxError {
    /// A backing array (event-loop registry, staging buffer) could not grow.
    #[error("allocation failed")]
    OutOfMemory,

    /// A staging region is at capacity; the caller should drop the bytes and retry
    /// once the next readiness cycle drains the descriptor.
    #[error("staging buffer is temporarily full")]
    TemporaryFull,

    /// The PTY master reported `POLLHUP`/`POLLERR`: the child has exited.
    #[error("child process exited")]
    ChildExited,

    /// PTY/fork setup failed; fatal during single-buffer startup.
    #[error("pty setup failed")]
    SetupFailure(#[source] SetupFailure),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl From<SetupFailure> for MuxError {
    fn from(value: SetupFailure) -> Self { MuxError::SetupFailure(value) }
}

pub type Result<T> = std::result::Result<T, MuxError>;
