// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Child-process spawning and lifecycle management.
//!
//! ```text
//! ProcessBuilder::new("cmake") / ::shell("echo hi && ls")
//!   .args() .cwd() .env() .on_stdout() .on_stderr() .pipe_stdin()
//!   .spawn()
//!       --> Process (spawned immediately, readers running)
//!           write / close_stdin
//!           kill(FORCE | TREE)
//!           exit_status() / try_exit_status()
//! ```

pub mod builder;
mod handle;
mod io;
#[cfg(test)]
mod tests;

pub use builder::{ProcessBuilder, ProcessFlags, StreamDisposition};
pub use handle::{KillFlags, Process, ProcessState};
pub use io::StreamCallback;
