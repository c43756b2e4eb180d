use std::sync::atomic::AtomicBool;

use tracing::{debug, trace};

use super::core::*;
use super::errors::Result;
use super::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every cell of the record was published.
    Published,
    /// The stop flag was seen; the record was dropped, possibly after some of
    /// its leading cells were already published.
    Discarded,
    /// The cancel flag was set while waiting for the writer mutex or a free
    /// cell. Cells published before that stay in the ring as a partial record.
    Cancelled,
}

/// Producer side of the queue.
pub struct RecordWriter {
    queue: Queue,
}

impl RecordWriter {
    pub fn attach(cfg: &QueueConfig) -> Result<RecordWriter> {
        Ok(RecordWriter {
            queue: Queue::attach(cfg)?,
        })
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }

    /// Publishes `record` cell by cell, one `free` credit per cell. The length
    /// cell is released to the reader before the payload is written.
    ///
    /// The stop flag is checked before anything is written and after every
    /// `free` acquire that precedes the length cell or a pair's first cell.
    /// A credit acquired right before an abort is not returned.
    pub fn submit(&mut self, record: &Record) -> Result<WriteOutcome> {
        self.submit_with(record, None)
    }

    /// Like [`submit`](Self::submit), but every blocking wait gives up once
    /// `cancel` is set, so a producer parked on a ring nobody drains can
    /// still exit.
    pub fn submit_cancellable(&mut self, record: &Record, cancel: &AtomicBool) -> Result<WriteOutcome> {
        self.submit_with(record, Some(cancel))
    }

    fn submit_with(&mut self, record: &Record, cancel: Option<&AtomicBool>) -> Result<WriteOutcome> {
        let region = self.queue.region();
        let sems = self.queue.sems();

        let _lock = match SemaphoreGuard::acquire(&sems.mutex, cancel)? {
            Some(lock) => lock,
            None => return Ok(WriteOutcome::Cancelled),
        };
        if region.is_stopped() {
            return Ok(WriteOutcome::Discarded);
        }

        if !sems.free.acquire(cancel)? {
            return Ok(WriteOutcome::Cancelled);
        }
        if region.is_stopped() {
            debug!("stop seen before length cell, record dropped");
            return Ok(WriteOutcome::Discarded);
        }
        let mut cursor = region.write_cursor();
        region.store(cursor, record.size() as i32);
        cursor += 1;
        region.set_write_cursor(cursor);
        sems.used.post()?;

        for (a, b) in record.pairs() {
            if !sems.free.acquire(cancel)? {
                debug!(cursor, "cancelled mid-record");
                return Ok(WriteOutcome::Cancelled);
            }
            if region.is_stopped() {
                debug!(cursor, size = record.size(), "stop seen mid-record, record dropped");
                return Ok(WriteOutcome::Discarded);
            }
            region.store(cursor, a);
            sems.used.post()?;

            if !sems.free.acquire(cancel)? {
                debug!(cursor, "cancelled mid-record");
                return Ok(WriteOutcome::Cancelled);
            }
            region.store(cursor + 1, b);
            cursor += 2;
            region.set_write_cursor(cursor);
            sems.used.post()?;
        }

        trace!(size = record.size(), cursor, "record published");
        Ok(WriteOutcome::Published)
    }
}
