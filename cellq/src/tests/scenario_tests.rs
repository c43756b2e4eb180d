use std::{
    error::Error,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
    sync::{Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use crate::{
    consumer::{run_consumer, ConsumerOptions, Verdict},
    core::QueueConfig,
    producer::{run_producer, ProducerOptions, ProducerSummary, SearchStep},
    reader::{ReadOutcome, RecordReader, INITIAL_BEST, WAKE_CREDITS},
    record::Record,
    writer::{RecordWriter, WriteOutcome},
};

fn scenario_config(capacity: usize) -> QueueConfig {
    static QUEUE_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
    QueueConfig::new(
        format!(
            "cellq-scenario-{}-{}",
            std::process::id(),
            QUEUE_ID_COUNTER.fetch_add(1, AtomicOrdering::SeqCst)
        ),
        capacity,
    )
}

fn wait_until<F: FnMut() -> bool>(mut cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn record_longer_than_ring_is_pipelined() -> Result<(), Box<dyn Error>> {
    let cfg = scenario_config(4);
    let mut reader = RecordReader::create(&cfg)?;

    let producer = thread::spawn({
        let cfg = cfg.clone();
        move || -> crate::Result<WriteOutcome> {
            let mut writer = RecordWriter::attach(&cfg)?;
            writer.submit(&Record::from_pairs(&[(5, 6), (7, 8)]))
        }
    });

    let mut best = 1000;
    let mut emitted = Vec::new();
    let outcome = reader.read(&mut best, |a, b| emitted.push(format!("{}-{}", a, b)))?;
    assert_eq!(producer.join().expect("producer panicked")?, WriteOutcome::Published);

    assert_eq!(outcome, ReadOutcome::Improved(2));
    assert_eq!(emitted.join(" "), "5-6 7-8");
    assert_eq!(best, 2);

    let credits = reader.queue().credits()?;
    assert_eq!((credits.free, credits.used, credits.mutex), (4, 0, 1));
    Ok(())
}

#[test]
fn capacity_sized_records_do_not_deadlock() -> Result<(), Box<dyn Error>> {
    // 2n + 1 == capacity
    let cfg = scenario_config(5);
    let mut reader = RecordReader::create(&cfg)?;
    let rounds = 50;

    let producer = thread::spawn({
        let cfg = cfg.clone();
        move || -> crate::Result<usize> {
            let mut writer = RecordWriter::attach(&cfg)?;
            let mut published = 0;
            for i in 0..rounds {
                let record = Record::from_pairs(&[(i, i + 1), (i + 2, i + 3)]);
                if writer.submit(&record)? == WriteOutcome::Published {
                    published += 1;
                }
            }
            Ok(published)
        }
    });

    for i in 0..rounds {
        let mut best = INITIAL_BEST;
        let mut pairs = Vec::new();
        assert_eq!(reader.read(&mut best, |a, b| pairs.push((a, b)))?, ReadOutcome::Improved(2));
        assert_eq!(pairs, vec![(i, i + 1), (i + 2, i + 3)]);
    }
    assert_eq!(producer.join().expect("producer panicked")?, rounds as usize);

    let credits = reader.queue().credits()?;
    assert_eq!((credits.free, credits.used), (5, 0));
    Ok(())
}

#[test]
fn concurrent_producers_do_not_interleave() -> Result<(), Box<dyn Error>> {
    let cfg = scenario_config(6);
    let mut reader = RecordReader::create(&cfg)?;
    let per_producer = 20;

    // Producer p writes pairs (p * 1000 + k, p * 1000 + k + 500).
    let producers: Vec<_> = (1..=2)
        .map(|p: i32| {
            let cfg = cfg.clone();
            thread::spawn(move || -> crate::Result<()> {
                let mut writer = RecordWriter::attach(&cfg)?;
                for _ in 0..per_producer {
                    let pairs: Vec<(i32, i32)> =
                        (0..3).map(|k| (p * 1000 + k, p * 1000 + k + 500)).collect();
                    writer.submit(&Record::from_pairs(&pairs))?;
                }
                Ok(())
            })
        })
        .collect();

    let mut seen = [0usize; 3];
    for _ in 0..2 * per_producer {
        let mut best = INITIAL_BEST;
        let mut pairs = Vec::new();
        assert_eq!(reader.read(&mut best, |a, b| pairs.push((a, b)))?, ReadOutcome::Improved(3));
        let owner = pairs[0].0 / 1000;
        for (k, &(a, b)) in pairs.iter().enumerate() {
            assert_eq!(a, owner * 1000 + k as i32, "pair from another record: {:?}", pairs);
            assert_eq!(b, a + 500, "mismatched pair: {:?}", pairs);
        }
        seen[owner as usize] += 1;
    }
    for producer in producers {
        producer.join().expect("producer panicked")?;
    }
    assert_eq!(seen[1], per_producer);
    assert_eq!(seen[2], per_producer);
    Ok(())
}

#[test]
fn stop_releases_producer_blocked_on_first_cell_of_pair() -> Result<(), Box<dyn Error>> {
    // Five cells fit [3, a1, b1, a2, b2]; the producer parks on a3.
    let cfg = scenario_config(5);
    let reader = RecordReader::create(&cfg)?;

    let producer = thread::spawn({
        let cfg = cfg.clone();
        move || -> crate::Result<WriteOutcome> {
            let mut writer = RecordWriter::attach(&cfg)?;
            writer.submit(&Record::from_pairs(&[(1, 2), (3, 4), (5, 6)]))
        }
    });

    wait_until(|| reader.queue().credits().map(|c| c.used == 5).unwrap_or(false));
    thread::sleep(Duration::from_millis(50));
    reader.signal_stop()?;

    assert_eq!(producer.join().expect("producer panicked")?, WriteOutcome::Discarded);
    let region = reader.queue().region();
    assert_eq!(region.write_cursor(), 5);
    // a3 would have landed on the length cell.
    assert_eq!(region.load(5), 3);

    // After shutdown free + used == capacity + wake credits, minus the credit
    // the aborting producer kept. used still matches the five cells written.
    let credits = reader.queue().credits()?;
    assert_eq!((credits.used, credits.mutex), (5, 1));
    assert_eq!(credits.free + credits.used, 5 + WAKE_CREDITS as i32 - 1);
    Ok(())
}

#[test]
fn stop_after_length_credit_keeps_that_credit() -> Result<(), Box<dyn Error>> {
    let cfg = scenario_config(3);
    let mut reader = RecordReader::create(&cfg)?;
    let mut first = RecordWriter::attach(&cfg)?;
    first.submit(&Record::from_pairs(&[(1, 2)]))?;

    // The ring is full; the second producer passes the first stop check and
    // parks on the length cell's free credit.
    let producer = thread::spawn({
        let cfg = cfg.clone();
        move || -> crate::Result<WriteOutcome> {
            let mut writer = RecordWriter::attach(&cfg)?;
            writer.submit(&Record::from_pairs(&[(3, 4)]))
        }
    });
    thread::sleep(Duration::from_millis(200));
    reader.queue().request_stop();

    let mut best = INITIAL_BEST;
    assert_eq!(reader.read(&mut best, |_, _| {})?, ReadOutcome::Improved(1));
    assert_eq!(producer.join().expect("producer panicked")?, WriteOutcome::Discarded);

    // Three cells were handed back, the aborted producer kept one of them.
    let credits = reader.queue().credits()?;
    assert_eq!((credits.free, credits.used), (2, 0));
    assert_eq!(reader.queue().region().write_cursor(), 3);
    Ok(())
}

struct Countdown {
    id: i32,
    size: usize,
}

impl SearchStep for Countdown {
    fn max_pairs(&self) -> usize {
        4
    }

    fn next_candidate(&mut self, record: &mut Record) {
        record.clear();
        for k in 0..self.size as i32 {
            record.push_pair(self.id, k);
        }
        self.size = self.size.saturating_sub(1);
    }
}

#[test]
fn loops_run_until_terminal_record() -> Result<(), Box<dyn Error>> {
    let cfg = scenario_config(8);
    let reader = RecordReader::create(&cfg)?;
    let cancel = Arc::new(AtomicBool::new(false));
    let attached = Arc::new(Barrier::new(4));

    let producers: Vec<_> = (0..3)
        .map(|id| {
            let cfg = cfg.clone();
            let cancel = Arc::clone(&cancel);
            let attached = Arc::clone(&attached);
            thread::spawn(move || -> crate::Result<ProducerSummary> {
                let writer = RecordWriter::attach(&cfg);
                attached.wait();
                let mut writer = writer?;
                let mut step = Countdown { id, size: 4 };
                run_producer(&mut writer, &mut step, &ProducerOptions::default(), &cancel)
            })
        })
        .collect();

    attached.wait();
    let mut out = Vec::new();
    let opts = ConsumerOptions {
        limit: None,
        delay: Duration::from_millis(20),
    };
    let summary = run_consumer(reader, &opts, &AtomicBool::new(false), &mut out)?;
    assert_eq!(summary.verdict, Verdict::Satisfied);
    assert!(summary.records >= 1);

    let mut published = 0;
    for producer in producers {
        published += producer.join().expect("producer panicked")?.published;
    }
    assert!(published >= summary.records);

    // Reported sizes never grow.
    let sizes: Vec<usize> = String::from_utf8(out)?
        .lines()
        .map(|line| {
            line.trim_start_matches("Solution with ")
                .split(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .expect("size in report line")
        })
        .collect();
    assert!(sizes.windows(2).all(|w| w[1] < w[0]), "sizes: {:?}", sizes);
    Ok(())
}
