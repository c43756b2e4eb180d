use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use super::errors::Result;
use super::record::Record;
use super::writer::{RecordWriter, WriteOutcome};

/// Produces one candidate record per call.
pub trait SearchStep {
    /// Upper bound on the pairs any candidate can hold; sizes the record
    /// buffer once.
    fn max_pairs(&self) -> usize;

    /// Overwrites `record` with the next candidate.
    fn next_candidate(&mut self, record: &mut Record);
}

#[derive(Debug, Clone, Copy)]
pub struct ProducerOptions {
    /// Candidates with more pairs than this are dropped without submitting.
    pub max_size: usize,
    /// Stop after this many submissions. Unbounded when `None`.
    pub max_submissions: Option<usize>,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        ProducerOptions {
            max_size: 8,
            max_submissions: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSummary {
    pub candidates: usize,
    pub published: usize,
    pub skipped: usize,
    pub discarded: usize,
}

/// Runs `step` and submits its candidates until the queue's stop flag is
/// seen, `cancel` is set, or the submission limit is reached. `cancel` also
/// interrupts a submission parked on a full ring.
pub fn run_producer<S>(
    writer: &mut RecordWriter,
    step: &mut S,
    opts: &ProducerOptions,
    cancel: &AtomicBool,
) -> Result<ProducerSummary>
where
    S: SearchStep + ?Sized,
{
    let mut record = Record::with_max_pairs(step.max_pairs());
    let mut summary = ProducerSummary::default();

    while !writer.is_stopped() && !cancel.load(Ordering::Relaxed) {
        if let Some(max) = opts.max_submissions {
            if summary.published + summary.discarded >= max {
                break;
            }
        }
        step.next_candidate(&mut record);
        summary.candidates += 1;
        if record.size() > opts.max_size {
            summary.skipped += 1;
            continue;
        }
        match writer.submit_cancellable(&record, cancel)? {
            WriteOutcome::Published => summary.published += 1,
            WriteOutcome::Discarded => {
                summary.discarded += 1;
                debug!("queue stopped while submitting");
                break;
            }
            WriteOutcome::Cancelled => {
                debug!("cancelled while submitting");
                break;
            }
        }
    }

    info!(
        candidates = summary.candidates,
        published = summary.published,
        skipped = summary.skipped,
        "producer finished"
    );
    Ok(summary)
}
