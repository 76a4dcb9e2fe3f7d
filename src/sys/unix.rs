// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! POSIX backend: raw pipe reads, signals, process groups.

use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};

/// Owned read end of a child's stdout/stderr pipe.
///
/// Held behind an `Arc` by both the reader thread and the handle. Reads
/// block in `poll(2)` on the pipe together with an internal wake pipe;
/// [`shutdown`](Self::shutdown) writes to the wake pipe, so the handle can
/// end a pending read from another thread. The descriptors themselves are
/// closed only when the last owner drops the stream, never while a read
/// may still be in flight.
pub(crate) struct RawStream {
    fd: RawFd,
    wake_read: RawFd,
    wake_write: RawFd,
    shutdown: AtomicBool,
}

// SAFETY: raw fds are just integers and the shutdown flag is atomic; the
// kernel serializes operations on the underlying pipes.
unsafe impl Send for RawStream {}
unsafe impl Sync for RawStream {}

impl RawStream {
    pub(crate) fn new(io: impl IntoRawFd) -> io::Result<Self> {
        let mut wake = [0 as RawFd; 2];
        // SAFETY: pipe fills the two-element array with the new descriptors.
        let rc = unsafe { libc::pipe(wake.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: setting FD_CLOEXEC on descriptors we just created.
        unsafe {
            libc::fcntl(wake[0], libc::F_SETFD, libc::FD_CLOEXEC);
            libc::fcntl(wake[1], libc::F_SETFD, libc::FD_CLOEXEC);
        }
        Ok(Self {
            fd: io.into_raw_fd(),
            wake_read: wake[0],
            wake_write: wake[1],
            shutdown: AtomicBool::new(false),
        })
    }

    /// Blocking read of the next available chunk. `Ok(0)` means the write
    /// end has been fully closed or [`shutdown`](Self::shutdown) was called.
    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(0);
            }
            let mut fds = [
                libc::pollfd {
                    fd: self.fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake_read,
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            // SAFETY: fds points at two initialized pollfd entries.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
            if rc < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            if fds[1].revents != 0 {
                return Ok(0);
            }
            if fds[0].revents == 0 {
                continue;
            }
            // SAFETY: the fd is owned by this struct and buf's bounds are
            // passed explicitly.
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            return Ok(usize::try_from(n).unwrap_or(0));
        }
    }

    /// Makes any pending and all future reads return `Ok(0)`. Idempotent.
    pub(crate) fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let byte = 1u8;
            // SAFETY: the wake descriptor stays open until drop.
            let _ = unsafe { libc::write(self.wake_write, (&raw const byte).cast(), 1) };
        }
    }
}

impl Drop for RawStream {
    fn drop(&mut self) {
        // SAFETY: last owner of all three descriptors; no read can be in
        // flight once the reader thread has released its reference.
        unsafe {
            libc::close(self.fd);
            libc::close(self.wake_read);
            libc::close(self.wake_write);
        }
    }
}

/// Sends a termination signal to a child by pid.
///
/// `forceful` selects SIGKILL over SIGTERM; `tree` targets the child's
/// process group (every handle spawns its child into its own group).
pub(crate) fn kill(pid: u32, forceful: bool, tree: bool) -> io::Result<()> {
    let signal = if forceful { libc::SIGKILL } else { libc::SIGTERM };
    let pid = i32::try_from(pid).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let target = if tree { -pid } else { pid };
    // SAFETY: sending a signal is memory-safe for any pid value.
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Maps a waited status to the exit code reported to callers.
///
/// Signal-killed children surface as `128 + signal`, the shell convention,
/// so a kill-induced termination is always a non-zero code.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

/// Places the child in its own process group so `kill(tree)` can signal
/// the whole descendant tree without touching the caller's group.
pub(crate) fn configure_command(command: &mut Command) {
    command.process_group(0);
}
