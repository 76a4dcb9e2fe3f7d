// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Error handling module.
//!
//! ```text
//!               ProcessError
//!                     |
//!     +---------+-----+------+----------+
//!     v         v            v          v
//!  EmptyCommand SpawnFailed  Stdin*    Job
//!  ExecutableNotFound        NotPiped  (Windows)
//!                            Closed
//!                            Write(io)
//!
//! Spawn-time failures are surfaced from construction; a child that ran
//! and exited non-zero is NOT an error, it is a normal exit status.
//! ```

use thiserror::Error;

/// Result type using [`ProcessError`].
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Errors produced by process construction and stdin plumbing.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command string or program name was empty.
    #[error("cannot spawn an empty command")]
    EmptyCommand,

    /// Executable not found in PATH.
    #[error("executable not found: '{name}' (not in PATH)")]
    ExecutableNotFound { name: String },

    /// The OS refused to create the child (bad executable, bad working
    /// directory, resource exhaustion).
    #[error("failed to spawn process '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Stdin capture was not requested at construction.
    #[error("stdin was not requested for this process")]
    StdinNotPiped,

    /// Stdin has already been half-closed.
    #[error("stdin has already been closed")]
    StdinClosed,

    /// Writing to the stdin pipe failed.
    #[error("failed to write to stdin: {0}")]
    StdinWrite(#[source] std::io::Error),

    /// Job Object error (Windows).
    #[error("job error: {0}")]
    Job(#[from] JobError),
}

/// Windows Job Object errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Failed to create a Job Object.
    #[error("failed to create job object")]
    CreateFailed(#[source] std::io::Error),

    /// Failed to configure a Job Object.
    #[error("failed to configure job object")]
    ConfigureFailed(#[source] std::io::Error),

    /// Failed to open a process for job assignment.
    #[error("failed to open process (PID {pid})")]
    OpenProcessFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Failed to assign a process to a Job Object.
    #[error("failed to assign process (PID {pid}) to job")]
    AssignFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Failed to terminate a Job Object.
    #[error("failed to terminate job")]
    TerminateFailed(#[source] std::io::Error),
}
