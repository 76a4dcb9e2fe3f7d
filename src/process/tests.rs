// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::builder::{ProcessBuilder, ProcessFlags};
use super::handle::{KillFlags, Process, ProcessState};
use crate::error::ProcessError;

#[cfg(windows)]
const EOL: &str = "\r\n";
#[cfg(not(windows))]
const EOL: &str = "\n";

/// Shared byte sink plus a callback feeding it.
fn sink() -> (Arc<Mutex<Vec<u8>>>, impl FnMut(&[u8]) + Send + 'static) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&buf);
    (buf, move |bytes: &[u8]| {
        writer.lock().unwrap().extend_from_slice(bytes);
    })
}

// =============================================================================
// Stream capture
// =============================================================================

#[test]
fn test_echo_stdout_capture() {
    let (out, callback) = sink();
    let process = ProcessBuilder::shell("echo hello")
        .on_stdout(callback)
        .spawn()
        .expect("echo should spawn");
    assert_eq!(process.exit_status(), 0);
    assert_eq!(*out.lock().unwrap(), format!("hello{EOL}").into_bytes());
}

#[test]
fn test_stderr_capture() {
    let (out, out_callback) = sink();
    let (err, err_callback) = sink();
    let process = ProcessBuilder::shell("echo oops 1>&2")
        .on_stdout(out_callback)
        .on_stderr(err_callback)
        .spawn()
        .expect("shell should spawn");
    assert_eq!(process.exit_status(), 0);
    assert!(out.lock().unwrap().is_empty());
    let captured = String::from_utf8(err.lock().unwrap().clone()).unwrap();
    assert!(captured.contains("oops"), "stderr: {captured:?}");
}

#[test]
fn test_no_callback_after_exit_status_returns() {
    let (out, callback) = sink();
    let process = ProcessBuilder::shell("echo drained")
        .on_stdout(callback)
        .spawn()
        .expect("echo should spawn");
    process.exit_status();
    let len = out.lock().unwrap().len();
    assert!(len > 0, "output should arrive before the wait returns");
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(out.lock().unwrap().len(), len);
}

// =============================================================================
// Exit status protocol
// =============================================================================

#[test]
fn test_exit_code_propagated() {
    let process = ProcessBuilder::shell("exit 42")
        .spawn()
        .expect("shell should spawn");
    assert_eq!(process.exit_status(), 42);
}

#[test]
fn test_exit_status_stable_across_calls_and_threads() {
    let process = Arc::new(
        ProcessBuilder::shell("exit 7")
            .spawn()
            .expect("shell should spawn"),
    );
    let first = process.exit_status();
    assert_eq!(first, 7);

    let mut workers = Vec::new();
    for _ in 0..4 {
        let handle = Arc::clone(&process);
        workers.push(std::thread::spawn(move || handle.exit_status()));
    }
    for worker in workers {
        assert_eq!(worker.join().unwrap(), first);
    }
    assert_eq!(process.exit_status(), first);
    assert_eq!(process.try_exit_status(), Some(first));
}

#[cfg(unix)]
#[test]
fn test_try_exit_status_polls() {
    let process = ProcessBuilder::new("sleep")
        .arg("1")
        .spawn()
        .expect("sleep should spawn");
    assert_eq!(process.try_exit_status(), None);
    assert_eq!(process.exit_status(), 0);
    assert_eq!(process.try_exit_status(), Some(0));
}

#[cfg(unix)]
#[test]
fn test_try_exit_status_settles_while_descendant_holds_stream() {
    // The backgrounded subshell inherits stdout and outlives the shell,
    // so the stream never reaches EOF while the poll runs.
    let (out, callback) = sink();
    let process = ProcessBuilder::shell("(sleep 2; echo late) & echo early")
        .on_stdout(callback)
        .spawn()
        .expect("shell should spawn");
    let start = Instant::now();
    let code = loop {
        if let Some(code) = process.try_exit_status() {
            break code;
        }
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "poll must settle once the shell itself exits"
        );
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(code, 0);
    // The poll does not synchronize with the reader; give the chunk a
    // bounded moment to arrive.
    let deadline = Instant::now() + Duration::from_secs(1);
    while out.lock().unwrap().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(out.lock().unwrap().starts_with(b"early"));
    // Dropping with the write end still held must also stay prompt.
    let start = Instant::now();
    drop(process);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_fire_and_forget() {
    let process = Process::spawn("exit 0").expect("shell should spawn");
    assert_eq!(process.exit_status(), 0);
}

// =============================================================================
// Spawn failures
// =============================================================================

#[test]
fn test_empty_command_rejected() {
    assert!(matches!(
        ProcessBuilder::shell("   ").spawn(),
        Err(ProcessError::EmptyCommand)
    ));
    assert!(matches!(
        ProcessBuilder::new("").spawn(),
        Err(ProcessError::EmptyCommand)
    ));
}

#[test]
fn test_nonexistent_program_is_spawn_error() {
    let result = ProcessBuilder::new("proclet_definitely_missing_1234").spawn();
    assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
}

#[test]
fn test_nonexistent_cwd_is_spawn_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("gone");
    let result = ProcessBuilder::shell("echo hi").cwd(missing).spawn();
    assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
}

// =============================================================================
// Stdin
// =============================================================================

#[cfg(unix)]
#[test]
fn test_stdin_roundtrip_through_cat() {
    let (out, callback) = sink();
    let process = ProcessBuilder::new("cat")
        .pipe_stdin()
        .on_stdout(callback)
        .spawn()
        .expect("cat should spawn");
    process.write(b"hello stdin\n").unwrap();
    process.close_stdin().unwrap();
    assert_eq!(process.exit_status(), 0);
    assert_eq!(*out.lock().unwrap(), b"hello stdin\n");
}

#[test]
fn test_write_without_stdin_is_defined_failure() {
    let process = ProcessBuilder::shell("exit 0")
        .spawn()
        .expect("shell should spawn");
    assert!(matches!(
        process.write(b"x"),
        Err(ProcessError::StdinNotPiped)
    ));
    assert!(matches!(
        process.close_stdin(),
        Err(ProcessError::StdinNotPiped)
    ));
    process.exit_status();
}

#[cfg(unix)]
#[test]
fn test_close_stdin_idempotent_and_write_after_close_fails() {
    let process = ProcessBuilder::new("cat")
        .pipe_stdin()
        .spawn()
        .expect("cat should spawn");
    process.close_stdin().unwrap();
    process.close_stdin().unwrap();
    assert!(matches!(
        process.write(b"late"),
        Err(ProcessError::StdinClosed)
    ));
    assert_eq!(process.exit_status(), 0);
}

// =============================================================================
// Kill and state machine
// =============================================================================

#[cfg(unix)]
#[test]
fn test_forceful_kill_is_bounded_and_nonzero() {
    let start = Instant::now();
    let process = ProcessBuilder::new("sleep")
        .arg("10")
        .spawn()
        .expect("sleep should spawn");
    assert_eq!(process.state(), ProcessState::Running);
    process.kill(KillFlags::FORCE);
    assert_ne!(process.state(), ProcessState::Exited);
    let code = process.exit_status();
    assert_eq!(code, 128 + libc::SIGKILL, "SIGKILL maps to 128+signal");
    assert_eq!(process.state(), ProcessState::Exited);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[test]
fn test_tree_kill_reaches_shell_children() {
    let start = Instant::now();
    let process = ProcessBuilder::shell("sleep 10")
        .spawn()
        .expect("shell should spawn");
    process.kill(KillFlags::FORCE | KillFlags::TREE);
    assert_ne!(process.exit_status(), 0);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_kill_after_exit_is_noop() {
    let process = ProcessBuilder::shell("exit 3")
        .spawn()
        .expect("shell should spawn");
    assert_eq!(process.exit_status(), 3);
    process.kill(KillFlags::FORCE);
    process.kill(KillFlags::empty());
    assert_eq!(process.exit_status(), 3);
}

#[cfg(unix)]
#[test]
fn test_kill_from_other_thread_unblocks_waiter() {
    let start = Instant::now();
    let process = Arc::new(
        ProcessBuilder::new("sleep")
            .arg("10")
            .spawn()
            .expect("sleep should spawn"),
    );
    let killer = Arc::clone(&process);
    let thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        killer.kill(KillFlags::FORCE);
    });
    assert_ne!(process.exit_status(), 0);
    assert!(start.elapsed() < Duration::from_secs(5));
    thread.join().unwrap();
}

#[cfg(unix)]
#[test]
fn test_kill_on_drop() {
    let start = Instant::now();
    {
        let _process = ProcessBuilder::new("sleep")
            .arg("10")
            .flag(ProcessFlags::KILL_ON_DROP)
            .spawn()
            .expect("sleep should spawn");
    }
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[test]
fn test_drop_without_kill_leaves_child_running() {
    let pid;
    {
        let process = ProcessBuilder::new("sleep")
            .arg("5")
            .spawn()
            .expect("sleep should spawn");
        pid = process.pid();
    }
    // Signal 0 probes existence without delivering anything.
    let alive = unsafe { libc::kill(i32::try_from(pid).unwrap(), 0) } == 0;
    assert!(alive, "dropping a handle must not kill the child");
    unsafe {
        libc::kill(i32::try_from(pid).unwrap(), libc::SIGKILL);
    }
}

#[cfg(unix)]
#[test]
fn test_drop_with_captured_stream_is_prompt() {
    // The child holds its stdout open for its whole lifetime, so the
    // reader only ends because teardown shuts the stream down.
    let (_out, callback) = sink();
    let process = ProcessBuilder::new("sleep")
        .arg("3")
        .on_stdout(callback)
        .spawn()
        .expect("sleep should spawn");
    let pid = process.pid();
    std::thread::sleep(Duration::from_millis(200));
    let start = Instant::now();
    drop(process);
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "drop must not wait for the child to exit"
    );
    unsafe {
        libc::kill(i32::try_from(pid).unwrap(), libc::SIGKILL);
    }
}

// =============================================================================
// Executable lookup
// =============================================================================

#[test]
fn test_executable_lookup_found() {
    // cargo is always present when running tests under cargo.
    let builder = ProcessBuilder::which("cargo").expect("cargo should be in PATH");
    assert!(format!("{builder:?}").contains("cargo"));
    assert!(ProcessBuilder::exists("cargo"));
    assert!(ProcessBuilder::find("cargo").is_some_and(|path| path.exists()));
}

#[test]
fn test_executable_lookup_not_found() {
    let program = "proclet_definitely_missing_1234";
    assert!(matches!(
        ProcessBuilder::which(program),
        Err(ProcessError::ExecutableNotFound { .. })
    ));
    assert!(!ProcessBuilder::exists(program));
    assert!(ProcessBuilder::find(program).is_none());
}
