//! Reading the stream the engine consumes.
//!
//! The tap sits at the end of the pipeline, or in front of the target when a
//! truncated consumption needs to see records before they are encoded. It
//! never drops its reader: the caller decides when the upstream pipe closes
//! so that an induced shutdown can be recorded first.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};

use tracing::warn;

use super::{Consumption, ENGINE_TARGET};

const CHUNK_SIZE: usize = 8 * 1024;

/// What the tap observed.
#[derive(Debug, Default)]
pub(super) struct TapOutcome {
    /// Records written to the sink.
    pub(super) records: usize,
    /// Whether reading stopped before end of stream.
    pub(super) induced: bool,
    /// First error raised by the sink.
    pub(super) write_error: Option<io::Error>,
}

/// Forwards newline-framed records from `reader` to `sink` according to
/// `consumption`. A final record lacking its newline gets one.
pub(super) fn drain<R, W>(reader: &mut R, consumption: Consumption, sink: &mut W) -> TapOutcome
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffered = BufReader::new(reader);
    let mut outcome = match consumption {
        Consumption::All => copy_records(&mut buffered, usize::MAX, sink),
        Consumption::Head(limit) => copy_records(&mut buffered, limit, sink),
        Consumption::Tail(limit) => keep_last(&mut buffered, limit, sink),
    };
    if let Err(error) = sink.flush() {
        outcome.write_error.get_or_insert(error);
    }
    outcome
}

/// Copies raw bytes, used when the final stage emits an encoded format.
pub(super) fn forward<R, W>(reader: &mut R, sink: &mut W) -> TapOutcome
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut outcome = TapOutcome::default();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!(target: ENGINE_TARGET, %error, "reading final stage output failed");
                break;
            }
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        if let Err(error) = sink.write_all(chunk) {
            outcome.write_error = Some(error);
            return outcome;
        }
    }
    if let Err(error) = sink.flush() {
        outcome.write_error = Some(error);
    }
    outcome
}

fn copy_records<R, W>(reader: &mut R, limit: usize, sink: &mut W) -> TapOutcome
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let mut outcome = TapOutcome::default();
    let mut record = Vec::new();
    loop {
        if outcome.records >= limit {
            outcome.induced = has_more(reader);
            return outcome;
        }
        if !next_record(reader, &mut record) {
            return outcome;
        }
        if let Err(error) = sink.write_all(&record) {
            outcome.write_error = Some(error);
            return outcome;
        }
        outcome.records += 1;
    }
}

fn keep_last<R, W>(reader: &mut R, limit: usize, sink: &mut W) -> TapOutcome
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let mut ring: VecDeque<Vec<u8>> = VecDeque::with_capacity(limit.min(1024));
    let mut record = Vec::new();
    while next_record(reader, &mut record) {
        if limit == 0 {
            continue;
        }
        if ring.len() == limit {
            ring.pop_front();
        }
        ring.push_back(std::mem::take(&mut record));
    }

    let mut outcome = TapOutcome::default();
    for kept in ring {
        if let Err(error) = sink.write_all(&kept) {
            outcome.write_error = Some(error);
            break;
        }
        outcome.records += 1;
    }
    outcome
}

/// Whether bytes remain past the last forwarded record. A stream that ends
/// exactly at the limit was not cut short.
fn has_more<R: BufRead + ?Sized>(reader: &mut R) -> bool {
    loop {
        match reader.fill_buf() {
            Ok(pending) => return !pending.is_empty(),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                warn!(target: ENGINE_TARGET, %error, "reading past the limit failed");
                return false;
            }
        }
    }
}

/// Reads the next record into `buffer`. Returns `false` at end of stream.
fn next_record<R: BufRead + ?Sized>(reader: &mut R, buffer: &mut Vec<u8>) -> bool {
    buffer.clear();
    match reader.read_until(b'\n', buffer) {
        Ok(0) => false,
        Ok(_) => {
            if buffer.last() != Some(&b'\n') {
                buffer.push(b'\n');
            }
            true
        }
        Err(error) => {
            warn!(target: ENGINE_TARGET, %error, "reading records failed, treating as end of stream");
            false
        }
    }
}
