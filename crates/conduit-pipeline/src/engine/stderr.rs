//! Bounded capture of stage standard error.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::ENGINE_TARGET;

const CHUNK_SIZE: usize = 4 * 1024;

/// Keeps the last `limit` bytes written to it.
#[derive(Debug)]
pub(super) struct TailBuffer {
    limit: usize,
    bytes: VecDeque<u8>,
}

impl TailBuffer {
    pub(super) fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: VecDeque::with_capacity(limit.min(CHUNK_SIZE)),
        }
    }

    pub(super) fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend(chunk);
        let excess = self.bytes.len().saturating_sub(self.limit);
        self.bytes.drain(..excess);
    }

    pub(super) fn into_string(self) -> String {
        let bytes: Vec<u8> = self.bytes.into();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Drains `reader` on a background thread, keeping the last `limit` bytes.
///
/// Draining continuously keeps a chatty stage from blocking on a full stderr
/// pipe.
pub(super) fn capture<R>(plugin: String, mut reader: R, limit: usize) -> io::Result<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("stderr-{plugin}"))
        .spawn(move || {
            let mut tail = TailBuffer::new(limit);
            let mut chunk = vec![0_u8; CHUNK_SIZE];
            let mut total: usize = 0;
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(read) => {
                        total = total.saturating_add(read);
                        tail.extend(chunk.get(..read).unwrap_or_default());
                    }
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                    Err(error) => {
                        warn!(target: ENGINE_TARGET, plugin = %plugin, %error, "reading stage stderr failed");
                        break;
                    }
                }
            }
            debug!(target: ENGINE_TARGET, plugin = %plugin, bytes = total, "stage stderr closed");
            tail.into_string()
        })
}
