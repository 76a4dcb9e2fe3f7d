// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

//! Stream reader threads.
//!
//! ```text
//! spawn_reader(stream, callback)
//!   dedicated thread, 4096-byte chunks
//!   callback(&bytes) per chunk, in pipe order
//!   stops at EOF (write end closed), read error, or stream shutdown
//!   never called with an empty chunk
//! ```
//!
//! The stream is shared with the handle so teardown can shut it down and
//! end a read that is still pending.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::trace;

use crate::sys::RawStream;

/// Per-chunk output callback. Chunk boundaries follow whatever the pipe
/// yields; callers needing line framing must buffer themselves.
pub type StreamCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Pipe read granularity.
const CHUNK_SIZE: usize = 4096;

/// A captured stream: the shared read end plus its draining thread.
pub(super) struct Reader {
    pub(super) stream: Arc<RawStream>,
    pub(super) thread: JoinHandle<()>,
}

/// Starts the draining thread for one captured stream.
pub(super) fn spawn_reader(
    name: &'static str,
    stream: RawStream,
    mut callback: StreamCallback,
) -> io::Result<Reader> {
    let stream = Arc::new(stream);
    let drained = Arc::clone(&stream);
    let thread = thread::Builder::new()
        .name(format!("proclet-{name}"))
        .spawn(move || {
            let mut buf = [0u8; CHUNK_SIZE];
            loop {
                match drained.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => callback(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        trace!(stream = name, error = %e, "reader stopping on error");
                        break;
                    }
                }
            }
            trace!(stream = name, "drained");
        })?;
    Ok(Reader { stream, thread })
}
