// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Windows backend: pipe handles, CTRL_BREAK, TerminateProcess.
//!
//! ```text
//! kill(forceful=false)  GenerateConsoleCtrlEvent(CTRL_BREAK) to the
//!                       child's process group (CREATE_NEW_PROCESS_GROUP)
//! kill(forceful=true)   OpenProcess + TerminateProcess
//! tree kill             handled by the Job Object in crate::job
//! ```

use std::io;
use std::os::windows::io::{IntoRawHandle, RawHandle};
use std::os::windows::process::CommandExt;
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use windows::Win32::Foundation::{CloseHandle, ERROR_BROKEN_PIPE, HANDLE};
use windows::Win32::Storage::FileSystem::ReadFile;
use windows::Win32::System::Console::{CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent};
use windows::Win32::System::Pipes::PeekNamedPipe;
use windows::Win32::System::Threading::{
    CREATE_NEW_PROCESS_GROUP, OpenProcess, PROCESS_TERMINATE, TerminateProcess,
};

/// Exit code reported by children we terminate forcefully.
const TERMINATED_EXIT_CODE: u32 = 1;

/// Idle interval between availability checks on an empty pipe.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Converts a Windows API error to a `std::io::Error`.
fn windows_error_to_io(err: &windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(err.code().0)
}

/// Owned read end of a child's stdout/stderr pipe.
///
/// Held behind an `Arc` by both the reader thread and the handle.
/// Anonymous pipes cannot be waited on alongside an event, so reads check
/// availability with `PeekNamedPipe` and sleep [`POLL_INTERVAL`] while the
/// pipe is empty; [`shutdown`](Self::shutdown) is observed within one
/// interval. The handle itself is closed only when the last owner drops
/// the stream, never while a read may still be in flight.
pub(crate) struct RawStream {
    handle: RawHandle,
    shutdown: AtomicBool,
}

// SAFETY: HANDLE is a pointer-sized kernel object reference usable from
// any thread; the shutdown flag is atomic.
unsafe impl Send for RawStream {}
unsafe impl Sync for RawStream {}

impl RawStream {
    pub(crate) fn new(io: impl IntoRawHandle) -> io::Result<Self> {
        Ok(Self {
            handle: io.into_raw_handle(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Bytes currently buffered in the pipe; `None` once the write end is
    /// gone.
    fn available(&self) -> io::Result<Option<u32>> {
        let mut avail = 0u32;
        // SAFETY: the handle is owned by this struct; no buffer is passed.
        let result = unsafe { PeekNamedPipe(HANDLE(self.handle), None, 0, None, Some(&mut avail), None) };
        match result {
            Ok(()) => Ok(Some(avail)),
            Err(e) if e.code() == ERROR_BROKEN_PIPE.to_hresult() => Ok(None),
            Err(e) => Err(windows_error_to_io(&e)),
        }
    }

    /// Blocking read of the next available chunk. `Ok(0)` means the write
    /// end has been fully closed or [`shutdown`](Self::shutdown) was called.
    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(0);
            }
            let avail = match self.available()? {
                None => return Ok(0),
                Some(n) => n as usize,
            };
            if avail == 0 {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }
            let want = buf.len().min(avail);
            let mut read = 0u32;
            // SAFETY: the handle is owned by this struct and the buffer
            // slice carries its own bounds; data is buffered, so the read
            // returns immediately.
            let result =
                unsafe { ReadFile(HANDLE(self.handle), Some(&mut buf[..want]), Some(&mut read), None) };
            return match result {
                Ok(()) => Ok(read as usize),
                Err(e) if e.code() == ERROR_BROKEN_PIPE.to_hresult() => Ok(0),
                Err(e) => Err(windows_error_to_io(&e)),
            };
        }
    }

    /// Makes any pending and all future reads return `Ok(0)`. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for RawStream {
    fn drop(&mut self) {
        // SAFETY: last owner of the handle; no read can be in flight once
        // the reader thread has released its reference.
        unsafe {
            let _ = CloseHandle(HANDLE(self.handle));
        }
    }
}

/// Sends a termination request to a child by pid.
///
/// `forceful=false` delivers CTRL_BREAK to the child's process group, a
/// request a console child may handle; `forceful=true` is unconditional.
/// Tree kills go through the Job Object instead (see `crate::job`), so
/// `tree` is accepted only for signature parity with the POSIX backend.
pub(crate) fn kill(pid: u32, forceful: bool, _tree: bool) -> io::Result<()> {
    if forceful {
        // SAFETY: OpenProcess/TerminateProcess are safe with a valid pid;
        // the handle is closed regardless of the termination result.
        unsafe {
            let process =
                OpenProcess(PROCESS_TERMINATE, false, pid).map_err(|e| windows_error_to_io(&e))?;
            let result = TerminateProcess(process, TERMINATED_EXIT_CODE);
            let _ = CloseHandle(process);
            result.map_err(|e| windows_error_to_io(&e))
        }
    } else {
        // SAFETY: GenerateConsoleCtrlEvent is safe with a valid process
        // group id; the child is its own group leader.
        unsafe {
            GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid).map_err(|e| windows_error_to_io(&e))
        }
    }
}

/// Maps a waited status to the exit code reported to callers.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Creates the child in a new process group so CTRL_BREAK can target it
/// without signalling the caller's console group.
pub(crate) fn configure_command(command: &mut Command) {
    command.creation_flags(CREATE_NEW_PROCESS_GROUP.0);
}
