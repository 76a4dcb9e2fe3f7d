// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Library root.
//!
//! # Crate Architecture
//!
//! ```text
//!             ProcessBuilder
//!       program/argv | shell string
//!       cwd, env, callbacks, stdin, flags
//!                   |
//!                   v  spawn()
//!                Process
//!         ,-------+--------+-----------,
//!         v       v        v           v
//!     reader    stdin    kill()   exit_status()
//!     threads   writer  FORCE|TREE  blocking wait,
//!     (io)   (half-close)           settled once
//!         |_______________|___________|
//!                   v
//!   +---------------------------------------+
//!   |  sys   unix (libc) / windows (Win32)  |
//!   |  job   Windows Job Object (TREE kill) |
//!   +---------------------------------------+
//!   |  foundation   error (thiserror)       |
//!   +---------------------------------------+
//! ```
//!
//! One child per handle. A handle may be shared across threads; `write`,
//! `close_stdin`, `kill` and `exit_status` are individually thread-safe.

pub mod error;
#[cfg(windows)]
pub mod job;
pub mod process;
pub(crate) mod sys;

pub use error::{ProcessError, Result};
pub use process::{
    KillFlags, Process, ProcessBuilder, ProcessFlags, ProcessState, StreamCallback,
    StreamDisposition,
};
