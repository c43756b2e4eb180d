use std::sync::atomic::AtomicBool;

use tracing::{debug, trace, warn};

use super::core::*;
use super::errors::{QueueError, Result};

/// Best size before any record has been read.
pub const INITIAL_BEST: i32 = 100_000;

/// `free` credits handed out at shutdown. A producer parked on a pair's second
/// cell writes it without checking the stop flag, then needs one more credit
/// to reach the next check. Credits nobody takes are left in `free`.
pub const WAKE_CREDITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The zero-length record; the search is satisfied.
    Terminal,
    /// A record smaller than the best so far; its pairs were emitted.
    Improved(usize),
    /// A record no better than the best so far; its payload was skipped.
    Superseded(usize),
    /// Cancelled while waiting. Nothing was consumed when the wait was for a
    /// length cell; otherwise the rest of the record is left unread and the
    /// queue must not be read again.
    Cancelled,
}

/// Consumer side of the queue. Owns the region and the semaphores and
/// destroys them when dropped, setting the stop flag first if nobody did.
pub struct RecordReader {
    queue: Queue,
}

impl RecordReader {
    pub fn create(cfg: &QueueConfig) -> Result<RecordReader> {
        Ok(RecordReader {
            queue: Queue::create(cfg)?,
        })
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Sets the stop flag, then hands out [`WAKE_CREDITS`] `free` credits so a
    /// producer parked on a full ring wakes up and reaches a stop check.
    pub fn signal_stop(&self) -> Result<()> {
        self.queue.request_stop();
        for _ in 0..WAKE_CREDITS {
            self.queue.sems().free.post()?;
        }
        Ok(())
    }

    /// Reads the next record, blocking until its cells are available.
    pub fn read<F>(&mut self, best: &mut i32, on_pair: F) -> Result<ReadOutcome>
    where
        F: FnMut(i32, i32),
    {
        self.read_with(best, None, on_pair)
    }

    /// Like [`read`](Self::read), but every wait gives up once `cancel` is set.
    pub fn read_cancellable<F>(
        &mut self,
        best: &mut i32,
        cancel: &AtomicBool,
        on_pair: F,
    ) -> Result<ReadOutcome>
    where
        F: FnMut(i32, i32),
    {
        self.read_with(best, Some(cancel), on_pair)
    }

    fn read_with<F>(
        &mut self,
        best: &mut i32,
        cancel: Option<&AtomicBool>,
        mut on_pair: F,
    ) -> Result<ReadOutcome>
    where
        F: FnMut(i32, i32),
    {
        let region = self.queue.region();
        let sems = self.queue.sems();

        if !sems.used.acquire(cancel)? {
            return Ok(ReadOutcome::Cancelled);
        }
        let mut cursor = region.read_cursor();
        let size = region.load(cursor);
        sems.free.post()?;

        if size < 0 {
            return Err(QueueError::CorruptRecord(size));
        }
        if size == 0 {
            // The read cursor stays on the terminal record.
            *best = 0;
            debug!(cursor, "terminal record");
            return Ok(ReadOutcome::Terminal);
        }

        if size >= *best {
            region.set_read_cursor(cursor + 2 * size as usize + 1);
            for _ in 0..size {
                if !(sems.used.acquire(cancel)? && sems.used.acquire(cancel)?) {
                    return Ok(ReadOutcome::Cancelled);
                }
                sems.free.post()?;
                sems.free.post()?;
            }
            trace!(size, best = *best, "record superseded");
            return Ok(ReadOutcome::Superseded(size as usize));
        }

        cursor += 1;
        region.set_read_cursor(cursor);
        for _ in 0..size {
            if !(sems.used.acquire(cancel)? && sems.used.acquire(cancel)?) {
                return Ok(ReadOutcome::Cancelled);
            }
            let a = region.load(cursor);
            let b = region.load(cursor + 1);
            cursor += 2;
            region.set_read_cursor(cursor);
            sems.free.post()?;
            sems.free.post()?;
            on_pair(a, b);
        }
        *best = size;
        debug!(size, "improved solution");
        Ok(ReadOutcome::Improved(size as usize))
    }
}

impl Drop for RecordReader {
    fn drop(&mut self) {
        if !self.queue.is_stopped() {
            if let Err(e) = self.signal_stop() {
                warn!(error = %e, "could not wake producers before destroying the queue");
            }
        }
    }
}
