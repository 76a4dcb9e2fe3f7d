// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Platform backend.
//!
//! ```text
//! RawStream          owned read end of a pipe; read-chunk, shutdown wakeup
//! kill(pid, ..)      SIGTERM/SIGKILL (+process group) | CTRL_BREAK/TerminateProcess
//! exit_code(status)  platform exit code; killed children map to non-zero
//! configure_command  own process group at spawn (enables tree signalling)
//! ```
//!
//! The handle and its readers depend only on these operations, never on
//! platform types directly.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{RawStream, configure_command, exit_code, kill};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use self::windows::{RawStream, configure_command, exit_code, kill};
