// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Windows Job Object wrapper backing `KillFlags::TREE`.
//!
//! ```text
//! JobObject (Windows-only)
//!   new(kill_on_close)  --> optional KILL_ON_JOB_CLOSE
//!   assign_pid()        --> add the spawned child
//!   terminate()         --> kill every process in the job
//! ```
//!
//! Each handle assigns its child to a fresh job at spawn so a later tree
//! kill reaches descendants the child spawned in the meantime. The
//! kill-on-close limit is only set when the handle was built with
//! `ProcessFlags::KILL_ON_DROP`; otherwise dropping the job handle leaves
//! the child running.

use crate::error::JobError;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
    JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JobObjectExtendedLimitInformation,
    SetInformationJobObject, TerminateJobObject,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_SET_QUOTA, PROCESS_TERMINATE};

/// Converts a Windows API error to a `std::io::Error`.
fn windows_error_to_io(err: &windows::core::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(err.code().0)
}

/// A Job Object owning the spawned child and its descendants.
pub struct JobObject(HANDLE);

// SAFETY: HANDLE is a pointer-sized value and Job Objects support
// multi-threaded access.
unsafe impl Send for JobObject {}
unsafe impl Sync for JobObject {}

impl JobObject {
    /// Creates a new Job Object.
    ///
    /// With `kill_on_close`, Windows terminates every assigned process
    /// when the last job handle is closed, including when the owning
    /// process dies abnormally.
    ///
    /// # Errors
    /// Returns an error if the Job Object could not be created or
    /// configured.
    pub fn new(kill_on_close: bool) -> Result<Self, JobError> {
        // SAFETY: CreateJobObjectW is safe with None arguments; the handle
        // is closed on the configuration failure path.
        unsafe {
            let job = CreateJobObjectW(None, None)
                .map_err(|e| JobError::CreateFailed(windows_error_to_io(&e)))?;

            if kill_on_close {
                let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
                info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;

                let result = SetInformationJobObject(
                    job,
                    JobObjectExtendedLimitInformation,
                    (&raw const info).cast(),
                    u32::try_from(std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>())
                        .unwrap_or(u32::MAX),
                );

                if let Err(e) = result {
                    let _ = CloseHandle(job);
                    return Err(JobError::ConfigureFailed(windows_error_to_io(&e)));
                }
            }

            Ok(Self(job))
        }
    }

    /// Assigns a process to this Job Object by pid.
    ///
    /// # Errors
    /// Returns an error if the process could not be opened or assigned.
    pub fn assign_pid(&self, pid: u32) -> Result<(), JobError> {
        // SAFETY: OpenProcess is safe with a valid pid; the process handle
        // is closed regardless of the assignment result.
        unsafe {
            let process =
                OpenProcess(PROCESS_SET_QUOTA | PROCESS_TERMINATE, false, pid).map_err(|e| {
                    JobError::OpenProcessFailed {
                        pid,
                        source: windows_error_to_io(&e),
                    }
                })?;

            let result = AssignProcessToJobObject(self.0, process);
            let _ = CloseHandle(process);

            result.map_err(|e| JobError::AssignFailed {
                pid,
                source: windows_error_to_io(&e),
            })
        }
    }

    /// Terminates every process in this Job Object with `exit_code`.
    ///
    /// # Errors
    /// Returns an error if termination failed.
    pub fn terminate(&self, exit_code: u32) -> Result<(), JobError> {
        // SAFETY: TerminateJobObject is safe with a valid job handle.
        unsafe {
            TerminateJobObject(self.0, exit_code)
                .map_err(|e| JobError::TerminateFailed(windows_error_to_io(&e)))
        }
    }
}

impl Drop for JobObject {
    fn drop(&mut self) {
        // SAFETY: we own this handle. Without the kill-on-close limit this
        // only releases the job, never the child.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

#[cfg(test)]
mod tests;
