use std::error::Error;
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cellq::consumer::{run_consumer, ConsumerOptions, ConsumerSummary, Verdict};
use cellq::reader::RecordReader;
use cellq::QueueConfig;

#[derive(clap::Parser)]
#[clap(about = "Creates the queue, reads solutions from generators and keeps the best one")]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "cellq-supervisor.toml")]
    config: String,
    /// Stop after this many solutions
    #[clap(short = 'n', long = "limit")]
    limit: Option<usize>,
    /// Seconds to wait before reading the first solution
    #[clap(short = 'w', long = "delay")]
    delay: Option<u64>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
#[serde(default)]
struct SupervisorSection {
    limit: Option<usize>,
    delay_secs: u64,
}

#[derive(Default, Debug, Serialize, Deserialize)]
#[serde(default)]
struct SupervisorConfig {
    queue: QueueConfig,
    supervisor: SupervisorSection,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts: Opts = Opts::parse();
    let cfg: SupervisorConfig = confy::load_path(&opts.config)?;
    let consumer_opts = consumer_options(&opts, &cfg.supervisor)?;

    let cancel = Arc::new(AtomicBool::new(false));
    for signal in [SIGHUP, SIGINT, SIGQUIT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&cancel))?;
    }

    let reader = RecordReader::create(&cfg.queue)?;
    info!(name = %cfg.queue.name, capacity = cfg.queue.capacity, "waiting for generators");

    let summary = {
        let stderr = io::stderr();
        let mut trace = stderr.lock();
        run_consumer(reader, &consumer_opts, &cancel, &mut trace)?
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    report(&summary, &mut stdout.lock(), &mut stderr.lock())?;
    Ok(())
}

fn consumer_options(opts: &Opts, section: &SupervisorSection) -> Result<ConsumerOptions, Box<dyn Error>> {
    let limit = opts.limit.or(section.limit);
    if limit == Some(0) {
        return Err("limit must be at least 1".into());
    }
    let delay = opts.delay.unwrap_or(section.delay_secs);
    Ok(ConsumerOptions {
        limit,
        delay: Duration::from_secs(delay),
    })
}

fn report<O: Write, E: Write>(summary: &ConsumerSummary, out: &mut O, err: &mut E) -> io::Result<()> {
    match summary.verdict {
        Verdict::Satisfied => writeln!(out, "The graph is 3-colorable!"),
        Verdict::Partial(edges) => writeln!(
            out,
            "The graph might not be 3-colorable, best solution removes {} edges.",
            edges
        ),
        Verdict::NoSolution => writeln!(err, "No solution found! Please check if you start generators"),
    }
}
