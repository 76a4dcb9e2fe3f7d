// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Process builder with configuration options.
//!
//! ```text
//! ProcessBuilder
//!  • new (program + argv) / shell (one command string) / which / exists / find
//!  • args/cwd/env/envs/flags
//!  • on_stdout/on_stderr (chunk callbacks), discard_stdout/stderr, quiet
//!  • pipe_stdin
//!  • spawn() --> Process
//!
//! ProcessFlags: KILL_ON_DROP
//! StreamDisposition (uncaptured streams): Inherit (default), Discard
//! ```

use bitflags::bitflags;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;
#[cfg(windows)]
use tracing::warn;

use super::handle::{Process, SpawnedParts};
use super::io::StreamCallback;
use crate::error::{ProcessError, Result};
use crate::sys;

bitflags! {
    /// Flags controlling handle behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcessFlags: u32 {
        /// Forcefully terminate the child (and its descendants) when the
        /// handle is dropped without the child having been reaped.
        /// Without this flag, dropping a handle never kills the child.
        const KILL_ON_DROP = 0x01;
    }
}

/// Where an uncaptured stream goes when no callback was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamDisposition {
    /// Connected to the parent's own stream.
    #[default]
    Inherit,
    /// Discarded (the bit bucket).
    Discard,
}

/// How the child is launched.
enum LaunchMode {
    /// Direct exec of a program with discrete arguments.
    Argv { program: PathBuf, args: Vec<String> },
    /// One opaque command line handed to the platform shell
    /// (`/bin/sh -c` on POSIX, `cmd /C` on Windows).
    Shell { command_line: String },
}

/// Builder for configuring and spawning a [`Process`].
///
/// Spawning happens in [`spawn`](Self::spawn); there is no deferred start
/// step, and the returned handle's readers are already running.
pub struct ProcessBuilder {
    mode: LaunchMode,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    flags: ProcessFlags,
    stdout_callback: Option<StreamCallback>,
    stderr_callback: Option<StreamCallback>,
    stdout_disposition: StreamDisposition,
    stderr_disposition: StreamDisposition,
    open_stdin: bool,
}

impl fmt::Debug for ProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessBuilder")
            .field("command", &self.command_line())
            .field("cwd", &self.cwd)
            .field("flags", &self.flags)
            .field("capture_stdout", &self.stdout_callback.is_some())
            .field("capture_stderr", &self.stderr_callback.is_some())
            .field("open_stdin", &self.open_stdin)
            .finish_non_exhaustive()
    }
}

impl ProcessBuilder {
    fn with_mode(mode: LaunchMode) -> Self {
        Self {
            mode,
            cwd: None,
            env: BTreeMap::new(),
            flags: ProcessFlags::empty(),
            stdout_callback: None,
            stderr_callback: None,
            stdout_disposition: StreamDisposition::Inherit,
            stderr_disposition: StreamDisposition::Inherit,
            open_stdin: false,
        }
    }

    /// Creates a builder that execs `program` directly with discrete
    /// arguments. The program can be an absolute path, a relative path,
    /// or a bare name resolved via PATH at spawn time.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self::with_mode(LaunchMode::Argv {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        })
    }

    /// Creates a builder that runs one opaque command line through the
    /// platform shell (`/bin/sh -c` on POSIX, `cmd /C` on Windows).
    ///
    /// Shell semantics, including the 127 exit code for an unknown
    /// command, belong to the shell; spawn failures here mean the shell
    /// itself could not be started.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::with_mode(LaunchMode::Shell {
            command_line: command.into(),
        })
    }

    /// Creates a builder after resolving `program` via PATH.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::ExecutableNotFound`] if the executable is
    /// not in PATH.
    pub fn which(program: &str) -> Result<Self> {
        which::which(program).map_or_else(
            |_| {
                Err(ProcessError::ExecutableNotFound {
                    name: program.to_string(),
                })
            },
            |path| Ok(Self::new(path)),
        )
    }

    /// Checks whether an executable exists in PATH.
    #[must_use]
    pub fn exists(program: &str) -> bool {
        Self::find(program).is_some()
    }

    /// Finds the full path to an executable in PATH.
    #[must_use]
    pub fn find(program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    /// Adds an argument (argv mode only; ignored for shell launches).
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        if let LaunchMode::Argv { args, .. } = &mut self.mode {
            args.push(arg.as_ref().to_string_lossy().into_owned());
        }
        self
    }

    /// Adds multiple arguments (argv mode only).
    #[must_use]
    pub fn args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if let LaunchMode::Argv { args, .. } = &mut self.mode {
            for arg in new_args {
                args.push(arg.as_ref().to_string_lossy().into_owned());
            }
        }
        self
    }

    /// Sets the working directory for the child. Validity is checked by
    /// the OS at spawn time and reported as a spawn failure.
    #[must_use]
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets one environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets multiple environment variables for the child.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Sets handle flags.
    #[must_use]
    pub const fn flags(mut self, flags: ProcessFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds a handle flag.
    #[must_use]
    pub fn flag(mut self, flag: ProcessFlags) -> Self {
        self.flags |= flag;
        self
    }

    /// Captures stdout, invoking `callback` once per chunk as produced.
    /// Chunks are in stream order but not line-aligned; EOF is the silent
    /// absence of further calls.
    #[must_use]
    pub fn on_stdout(mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.stdout_callback = Some(Box::new(callback));
        self
    }

    /// Captures stderr, invoking `callback` once per chunk as produced.
    #[must_use]
    pub fn on_stderr(mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.stderr_callback = Some(Box::new(callback));
        self
    }

    /// Discards stdout if it is not captured.
    #[must_use]
    pub const fn discard_stdout(mut self) -> Self {
        self.stdout_disposition = StreamDisposition::Discard;
        self
    }

    /// Discards stderr if it is not captured.
    #[must_use]
    pub const fn discard_stderr(mut self) -> Self {
        self.stderr_disposition = StreamDisposition::Discard;
        self
    }

    /// Convenience: discard all uncaptured output.
    #[must_use]
    pub const fn quiet(self) -> Self {
        self.discard_stdout().discard_stderr()
    }

    /// Opens a stdin pipe to the child, enabling
    /// [`Process::write`](super::Process::write) and
    /// [`Process::close_stdin`](super::Process::close_stdin).
    /// Without this, stdin is the bit bucket and writes are a defined
    /// failure.
    #[must_use]
    pub const fn pipe_stdin(mut self) -> Self {
        self.open_stdin = true;
        self
    }

    /// Returns the full command line as a string (for logging).
    fn command_line(&self) -> String {
        match &self.mode {
            LaunchMode::Shell { command_line } => command_line.clone(),
            LaunchMode::Argv { program, args } => {
                let mut cmd = format!("{}", program.display());
                for arg in args {
                    use std::fmt::Write as _;
                    if arg.contains(' ') {
                        let _ = write!(cmd, " \"{arg}\"");
                    } else {
                        let _ = write!(cmd, " {arg}");
                    }
                }
                cmd
            }
        }
    }

    fn is_empty_command(&self) -> bool {
        match &self.mode {
            LaunchMode::Argv { program, .. } => program.as_os_str().is_empty(),
            LaunchMode::Shell { command_line } => command_line.trim().is_empty(),
        }
    }

    /// Builds the `std::process::Command` from this builder's
    /// configuration. Pipes are requested here so the child inherits
    /// connected endpoints atomically with creation.
    fn build_command(&self) -> Command {
        let mut command = match &self.mode {
            LaunchMode::Argv { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            LaunchMode::Shell { command_line } => {
                #[cfg(windows)]
                {
                    let mut command = Command::new("cmd");
                    command.arg("/C").arg(command_line);
                    command
                }
                #[cfg(not(windows))]
                {
                    let mut command = Command::new("/bin/sh");
                    command.arg("-c").arg(command_line);
                    command
                }
            }
        };

        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        command.stdin(if self.open_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Self::stdio_for(
            self.stdout_callback.is_some(),
            self.stdout_disposition,
        ));
        command.stderr(Self::stdio_for(
            self.stderr_callback.is_some(),
            self.stderr_disposition,
        ));

        // Own process group (POSIX) / new console group (Windows).
        sys::configure_command(&mut command);

        command
    }

    fn stdio_for(captured: bool, disposition: StreamDisposition) -> Stdio {
        if captured {
            Stdio::piped()
        } else {
            match disposition {
                StreamDisposition::Inherit => Stdio::inherit(),
                StreamDisposition::Discard => Stdio::null(),
            }
        }
    }

    /// Spawns the child and returns its live handle.
    ///
    /// Reader threads for captured streams are running before this
    /// returns, so no output is lost between spawn and the caller's first
    /// API call.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::EmptyCommand`] for an empty command, or
    /// [`ProcessError::SpawnFailed`] when the OS cannot create the child
    /// (missing executable in argv mode, invalid working directory,
    /// resource exhaustion). A child that spawns and later exits non-zero
    /// is not an error.
    pub fn spawn(self) -> Result<Process> {
        if self.is_empty_command() {
            return Err(ProcessError::EmptyCommand);
        }

        let command_line = self.command_line();
        if let Some(cwd) = &self.cwd {
            debug!(cwd = %cwd.display(), "cd");
        }
        debug!(cmd = %command_line, "spawn");

        let mut command = self.build_command();
        let child = command
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                command: command_line.clone(),
                source,
            })?;

        #[cfg(windows)]
        let job = match crate::job::JobObject::new(self.flags.contains(ProcessFlags::KILL_ON_DROP))
        {
            Ok(job) => {
                if let Err(e) = job.assign_pid(child.id()) {
                    warn!(pid = child.id(), error = %e, "job assignment failed, tree kill degraded");
                    None
                } else {
                    Some(job)
                }
            }
            Err(e) => {
                warn!(error = %e, "job object unavailable, tree kill degraded");
                None
            }
        };

        Process::from_spawned(SpawnedParts {
            child,
            command_line,
            flags: self.flags,
            stdin_requested: self.open_stdin,
            stdout_callback: self.stdout_callback,
            stderr_callback: self.stderr_callback,
            #[cfg(windows)]
            job,
        })
    }
}
