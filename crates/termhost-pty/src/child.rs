//! Common plumbing for supervised children.

use std::io::Read;
use std::sync::mpsc::Sender;
use std::thread;

use tracing::debug;

use termhost_core::Result;

use crate::ops::ProcessOperations;

const READ_BUFFER_SIZE: usize = 4096;

/// A chunk of raw output read from the child.
#[derive(Debug)]
pub(crate) enum Chunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// A spawned child, as seen by the supervising loop.
pub(crate) trait ChildProcess: ProcessOperations {
    /// Exit code if the child has exited.
    fn try_wait(&self) -> Result<Option<i32>>;
}

/// Pump `reader` into `tx` on a dedicated thread until EOF or error.
pub(crate) fn spawn_reader<R, F>(name: String, mut reader: R, tx: Sender<Chunk>, wrap: F)
where
    R: Read + Send + 'static,
    F: Fn(Vec<u8>) -> Chunk + Send + 'static,
{
    let result = thread::Builder::new().name(name.clone()).spawn(move || {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(wrap(buffer[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO is how a pty master reports that the slave side closed
                    debug!("Reader finished: thread={}, reason={}", name, e);
                    break;
                }
            }
        }
    });

    if let Err(e) = result {
        tracing::error!("Failed to spawn reader thread: {}", e);
    }
}
