// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! The process handle: lifecycle, wait protocol, kill, stdin writer.
//!
//! ```text
//! Process
//!   exit_status()      blocking; exactly one caller reaps, the code is
//!                      cached, every caller sees the same value and
//!                      joins the readers before returning
//!   try_exit_status()  non-blocking poll of the same protocol
//!   kill(flags)        async signal; no-op once exited
//!   write/close_stdin  synchronized stdin pipe with idempotent half-close
//!   drop               shut readers down and join them, close stdin;
//!                      never kills the child unless KILL_ON_DROP
//! ```

use std::fmt;
use std::io::Write as _;
use std::process::{Child, ChildStdin};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

use super::builder::ProcessFlags;
use super::io::{self, Reader, StreamCallback};
use crate::error::{ProcessError, Result};
use crate::sys;

bitflags::bitflags! {
    /// Flags selecting how a termination request is delivered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KillFlags: u32 {
        /// Unconditional kill (SIGKILL / TerminateProcess) instead of a
        /// cooperative request (SIGTERM / CTRL_BREAK).
        const FORCE = 0x01;
        /// Also terminate descendant processes of the child (its process
        /// group on POSIX, its Job Object on Windows).
        const TREE = 0x02;
    }
}

/// Externally observable lifecycle of a handle's child.
///
/// Spawning happens in the constructor, so a live handle starts at
/// `Running`. `KillRequested` means a termination request was delivered
/// but no wait has confirmed the exit yet. `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    KillRequested,
    Exited,
}

/// State guarded by the wait lock.
///
/// `exit_code` settles exactly once: the reaper takes `child` out, waits
/// without holding the lock, joins the readers, then publishes the code
/// and wakes the condvar. `reaping` keeps late callers parked while that
/// is in flight.
struct WaitState {
    child: Option<Child>,
    reaping: bool,
    kill_requested: bool,
    exit_code: Option<i32>,
}

/// The stdin channel, present only when requested at construction.
enum StdinState {
    NotPiped,
    Open(ChildStdin),
    Closed,
}

/// Everything the builder hands over after a successful OS spawn.
pub(super) struct SpawnedParts {
    pub(super) child: Child,
    pub(super) command_line: String,
    pub(super) flags: ProcessFlags,
    pub(super) stdin_requested: bool,
    pub(super) stdout_callback: Option<StreamCallback>,
    pub(super) stderr_callback: Option<StreamCallback>,
    #[cfg(windows)]
    pub(super) job: Option<crate::job::JobObject>,
}

/// One live or finished child process.
///
/// The handle exclusively owns its pipe endpoints and reader threads.
/// It may be shared across threads (e.g. in an `Arc`); all public
/// operations are internally synchronized, though interleaving of
/// `write` calls from multiple threads is unspecified.
pub struct Process {
    pid: u32,
    command_line: String,
    flags: ProcessFlags,
    wait: Mutex<WaitState>,
    exited: Condvar,
    stdin: Mutex<StdinState>,
    readers: Mutex<Vec<Reader>>,
    #[cfg(windows)]
    job: Option<crate::job::JobObject>,
}

/// Exit code assigned to a tree kill on Windows.
#[cfg(windows)]
const TREE_KILL_EXIT_CODE: u32 = 1;

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("command", &self.command_line)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Process {
    /// Fire-and-forget spawn of a shell command line: no stream capture,
    /// no stdin pipe. The caller can still `kill` and `exit_status`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::EmptyCommand`] or
    /// [`ProcessError::SpawnFailed`] as in
    /// [`ProcessBuilder::spawn`](super::ProcessBuilder::spawn).
    pub fn spawn(command: impl Into<String>) -> Result<Self> {
        super::ProcessBuilder::shell(command).spawn()
    }

    pub(super) fn from_spawned(mut parts: SpawnedParts) -> Result<Self> {
        let pid = parts.child.id();
        let mut readers = Vec::new();

        let streams_started = (|| -> std::io::Result<()> {
            if let Some(callback) = parts.stdout_callback.take()
                && let Some(stdout) = parts.child.stdout.take()
            {
                readers.push(io::spawn_reader(
                    "stdout",
                    sys::RawStream::new(stdout)?,
                    callback,
                )?);
            }
            if let Some(callback) = parts.stderr_callback.take()
                && let Some(stderr) = parts.child.stderr.take()
            {
                readers.push(io::spawn_reader(
                    "stderr",
                    sys::RawStream::new(stderr)?,
                    callback,
                )?);
            }
            Ok(())
        })();

        // The child is already running when a reader fails to start; take
        // it down and join whatever was started instead of leaking both.
        if let Err(source) = streams_started {
            if let Err(e) = parts.child.kill() {
                warn!(pid, error = %e, "rollback kill failed");
            }
            let _ = parts.child.wait();
            for reader in readers {
                reader.stream.shutdown();
                if reader.thread.join().is_err() {
                    warn!(pid, "reader thread panicked");
                }
            }
            return Err(ProcessError::SpawnFailed {
                command: parts.command_line,
                source,
            });
        }

        let stdin = match parts.child.stdin.take() {
            Some(pipe) if parts.stdin_requested => StdinState::Open(pipe),
            _ => StdinState::NotPiped,
        };

        trace!(pid, cmd = %parts.command_line, "spawned");

        Ok(Self {
            pid,
            command_line: parts.command_line,
            flags: parts.flags,
            wait: Mutex::new(WaitState {
                child: Some(parts.child),
                reaping: false,
                kill_requested: false,
                exit_code: None,
            }),
            exited: Condvar::new(),
            stdin: Mutex::new(stdin),
            readers: Mutex::new(readers),
            #[cfg(windows)]
            job: parts.job,
        })
    }

    /// The platform process identifier, assigned at spawn.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// The command line this handle was spawned with.
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Current lifecycle state. `Exited` is only reported once a wait has
    /// confirmed (reaped) the exit.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        let wait = self.lock_wait();
        if wait.exit_code.is_some() {
            ProcessState::Exited
        } else if wait.kill_requested {
            ProcessState::KillRequested
        } else {
            ProcessState::Running
        }
    }

    /// Writes `bytes` to the child's stdin pipe.
    ///
    /// May block briefly when the pipe buffer is full (backpressure from
    /// the child); that is not an error. Calls from multiple threads are
    /// individually safe but their byte interleaving is unspecified.
    ///
    /// # Errors
    ///
    /// [`ProcessError::StdinNotPiped`] if stdin was not requested,
    /// [`ProcessError::StdinClosed`] after a half-close, or
    /// [`ProcessError::StdinWrite`] on a pipe error.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut stdin = self.lock_stdin();
        match &mut *stdin {
            StdinState::Open(pipe) => pipe
                .write_all(bytes)
                .and_then(|()| pipe.flush())
                .map_err(ProcessError::StdinWrite),
            StdinState::Closed => Err(ProcessError::StdinClosed),
            StdinState::NotPiped => Err(ProcessError::StdinNotPiped),
        }
    }

    /// Half-closes stdin, signalling EOF to the child without affecting
    /// output capture or the wait protocol. Idempotent.
    ///
    /// # Errors
    ///
    /// [`ProcessError::StdinNotPiped`] if stdin was never requested.
    pub fn close_stdin(&self) -> Result<()> {
        let mut stdin = self.lock_stdin();
        match &*stdin {
            // Replacing the state drops the pipe, closing the write end.
            StdinState::Open(_) => {
                *stdin = StdinState::Closed;
                trace!(pid = self.pid, "stdin closed");
                Ok(())
            }
            StdinState::Closed => Ok(()),
            StdinState::NotPiped => Err(ProcessError::StdinNotPiped),
        }
    }

    /// Sends a termination request to the child. Non-blocking: the caller
    /// must still use [`exit_status`](Self::exit_status) to observe the
    /// exit and reap resources. No-op once the child has exited. Safe to
    /// call from any thread, including while another thread is blocked in
    /// `exit_status`.
    pub fn kill(&self, flags: KillFlags) {
        // Holding the wait lock serializes against exit publication, so a
        // kill never races a pid that this handle has already reaped.
        let mut wait = self.lock_wait();
        if wait.exit_code.is_some() {
            trace!(pid = self.pid, "kill after exit ignored");
            return;
        }
        wait.kill_requested = true;
        debug!(
            pid = self.pid,
            forceful = flags.contains(KillFlags::FORCE),
            tree = flags.contains(KillFlags::TREE),
            "kill"
        );
        if let Err(e) = self.deliver_kill(flags) {
            warn!(pid = self.pid, error = %e, "termination request failed");
        }
    }

    #[cfg(windows)]
    fn deliver_kill(&self, flags: KillFlags) -> std::io::Result<()> {
        if flags.contains(KillFlags::TREE)
            && let Some(job) = &self.job
        {
            return job
                .terminate(TREE_KILL_EXIT_CODE)
                .map_err(|e| std::io::Error::other(e.to_string()));
        }
        sys::kill(self.pid, flags.contains(KillFlags::FORCE), false)
    }

    #[cfg(not(windows))]
    fn deliver_kill(&self, flags: KillFlags) -> std::io::Result<()> {
        sys::kill(
            self.pid,
            flags.contains(KillFlags::FORCE),
            flags.contains(KillFlags::TREE),
        )
    }

    /// Blocks until the child has terminated (by any cause) and returns
    /// the platform exit code. Kill-induced termination surfaces as a
    /// non-zero code, not an error.
    ///
    /// Exactly one caller performs the OS reap; the value is cached and
    /// every caller, concurrent or later, observes the same code. Every
    /// caller also joins the reader threads before returning, so no
    /// callback fires after this returns.
    ///
    /// Must not be called from inside a stream callback: joining the
    /// reader threads would wait on itself.
    pub fn exit_status(&self) -> i32 {
        let code = {
            let mut wait = self.lock_wait();
            loop {
                if let Some(code) = wait.exit_code {
                    break code;
                }
                if !wait.reaping
                    && let Some(child) = wait.child.take()
                {
                    wait.reaping = true;
                    drop(wait);
                    let code = self.reap(child);
                    wait = self.lock_wait();
                    wait.exit_code = Some(code);
                    self.exited.notify_all();
                    break code;
                }
                wait = self
                    .exited
                    .wait(wait)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        self.join_readers(false);
        code
    }

    /// Non-blocking poll of the exit status. Returns `None` while the
    /// child is still running (or while another thread is mid-reap);
    /// otherwise reaps and returns the same cached code `exit_status`
    /// would.
    ///
    /// Unlike [`exit_status`](Self::exit_status) this never waits on the
    /// reader threads, so stream callbacks may still run after it returns
    /// a code; call `exit_status` to synchronize with them.
    pub fn try_exit_status(&self) -> Option<i32> {
        let mut wait = self.lock_wait();
        if let Some(code) = wait.exit_code {
            return Some(code);
        }
        if wait.reaping {
            return None;
        }
        let code = match wait.child.as_mut()?.try_wait() {
            Ok(Some(status)) => sys::exit_code(status),
            Ok(None) => return None,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "try_wait failed");
                -1
            }
        };
        // try_wait already reaped; discard the child and publish.
        wait.child = None;
        wait.exit_code = Some(code);
        trace!(pid = self.pid, code, "reaped");
        self.exited.notify_all();
        Some(code)
    }

    /// Waits on the taken child and maps the status to an exit code.
    fn reap(&self, mut child: Child) -> i32 {
        let code = match child.wait() {
            Ok(status) => sys::exit_code(status),
            Err(e) => {
                warn!(pid = self.pid, error = %e, "wait failed");
                -1
            }
        };
        trace!(pid = self.pid, code, "reaped");
        code
    }

    /// Joins reader threads, optionally shutting the streams down first
    /// to end reads whose write end is still open (teardown path).
    ///
    /// The readers lock is held across the joins; concurrent callers
    /// serialize, so none returns while a reader is still running.
    fn join_readers(&self, shutdown_first: bool) {
        let mut readers = self
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if shutdown_first {
            for reader in readers.iter() {
                reader.stream.shutdown();
            }
        }
        for reader in readers.drain(..) {
            if reader.thread.join().is_err() {
                warn!(pid = self.pid, "reader thread panicked");
            }
        }
    }

    fn lock_wait(&self) -> MutexGuard<'_, WaitState> {
        self.wait.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stdin(&self) -> MutexGuard<'_, StdinState> {
        self.stdin.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Process {
    /// Releases every owned resource. Closes the stdin pipe, shuts the
    /// readers down and joins them; this returns promptly even while the
    /// child keeps its streams open. The child itself is left running
    /// (and unreaped) unless `KILL_ON_DROP` was set, in which case it and
    /// its descendants are forcefully terminated and reaped.
    fn drop(&mut self) {
        let unreaped = self.lock_wait().exit_code.is_none();
        if unreaped && self.flags.contains(ProcessFlags::KILL_ON_DROP) {
            self.kill(KillFlags::FORCE | KillFlags::TREE);
            let _ = self.exit_status();
        }
        {
            let mut stdin = self.lock_stdin();
            if matches!(*stdin, StdinState::Open(_)) {
                *stdin = StdinState::Closed;
            }
        }
        self.join_readers(true);
    }
}
