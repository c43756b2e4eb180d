use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::core::CANCEL_POLL;
use super::errors::Result;
use super::reader::{ReadOutcome, RecordReader, INITIAL_BEST};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsumerOptions {
    /// Stop after this many records. Unbounded when `None`.
    pub limit: Option<usize>,
    /// Pause before the first read so producers can attach.
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A terminal record was read.
    Satisfied,
    /// The best record still had this many pairs.
    Partial(usize),
    /// Nothing was read.
    NoSolution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub verdict: Verdict,
    pub records: usize,
}

struct Drained {
    records: usize,
    satisfied: bool,
    best: i32,
}

/// Drains records until a terminal record, the record limit, or `cancel`.
/// Improving records are written to `out` as they are read:
///
/// ```text
/// Solution with 2 edges: 5-6 7-8
/// ```
///
/// Then sets the stop flag and destroys the queue. The stop flag is set on
/// the error paths too, before the error is returned.
pub fn run_consumer<W>(
    mut reader: RecordReader,
    opts: &ConsumerOptions,
    cancel: &AtomicBool,
    out: &mut W,
) -> Result<ConsumerSummary>
where
    W: Write,
{
    let drained = drain(&mut reader, opts, cancel, out);
    if let Ok(credits) = reader.queue().credits() {
        debug!(%credits, "stopping producers");
    }
    let stopped = reader.signal_stop();
    let Drained {
        records,
        satisfied,
        best,
    } = drained?;
    stopped?;

    let verdict = if satisfied {
        Verdict::Satisfied
    } else if records == 0 {
        Verdict::NoSolution
    } else {
        Verdict::Partial(best as usize)
    };
    info!(?verdict, records, "consumer finished");
    Ok(ConsumerSummary { verdict, records })
}

fn drain<W: Write>(
    reader: &mut RecordReader,
    opts: &ConsumerOptions,
    cancel: &AtomicBool,
    out: &mut W,
) -> Result<Drained> {
    if !opts.delay.is_zero() {
        debug!(delay = ?opts.delay, "waiting for producers");
        pause(opts.delay, cancel);
    }

    let mut best = INITIAL_BEST;
    let mut records = 0usize;
    let mut satisfied = false;
    let mut pairs = Vec::new();

    loop {
        pairs.clear();
        let outcome = reader.read_cancellable(&mut best, cancel, |a, b| pairs.push((a, b)))?;
        match outcome {
            ReadOutcome::Cancelled => {
                info!("consumer cancelled");
                break;
            }
            ReadOutcome::Terminal => {
                records += 1;
                satisfied = true;
                break;
            }
            ReadOutcome::Improved(size) => {
                write!(out, "Solution with {} edges:", size)?;
                for (a, b) in &pairs {
                    write!(out, " {}-{}", a, b)?;
                }
                writeln!(out)?;
                out.flush()?;
            }
            ReadOutcome::Superseded(_) => {}
        }
        records += 1;
        if let Some(limit) = opts.limit {
            if records >= limit {
                break;
            }
        }
    }
    Ok(Drained {
        records,
        satisfied,
        best,
    })
}

// Sleeps for `delay`, waking early once `cancel` is set.
fn pause(delay: Duration, cancel: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while !cancel.load(Ordering::Relaxed) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(CANCEL_POLL));
    }
}
