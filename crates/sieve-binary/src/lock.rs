//! Bounded advisory locking for in-place header updates

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive lock on a file, released on drop
#[derive(Debug)]
pub struct FileLock<'f> {
    file: &'f File,
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(error = %e, "failed to release binary lock");
        }
    }
}

/// Try to take an exclusive lock on `file` within `timeout`
///
/// Returns `Ok(None)` when the lock is still held by someone else after the
/// timeout elapsed.
pub fn lock_exclusive_timeout(file: &File, timeout: Duration) -> io::Result<Option<FileLock<'_>>> {
    let deadline = Instant::now() + timeout;
    let contended = fs2::lock_contended_error();

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(Some(FileLock { file })),
            Err(e) if e.raw_os_error() == contended.raw_os_error() => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
}
