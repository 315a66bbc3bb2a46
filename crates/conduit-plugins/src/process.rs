//! Child-process helpers shared by introspection and pipeline execution.

use std::io;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use tracing::debug;

const PROCESS_TARGET: &str = "conduit_plugins::process";

/// `ETXTBSY`: the executable is still open for writing somewhere, typically
/// because a sibling thread forked while the file was being written.
const TEXT_FILE_BUSY: i32 = 26;

const BUSY_RETRIES: u32 = 5;

/// Spawns `command`, retrying briefly while the executable is busy.
///
/// # Errors
///
/// Returns the spawn error once retries are exhausted or for any other
/// failure.
pub fn spawn(command: &mut Command) -> io::Result<Child> {
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Err(error) if error.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < BUSY_RETRIES => {
                attempt += 1;
                debug!(
                    target: PROCESS_TARGET,
                    program = ?command.get_program(),
                    attempt,
                    "executable busy, retrying spawn"
                );
                thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
            }
            result => return result,
        }
    }
}
