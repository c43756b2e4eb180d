use std::error::Error;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cellq::producer::{run_producer, ProducerOptions};
use cellq::writer::RecordWriter;
use cellq::QueueConfig;

mod coloring;

use coloring::{ColoringSearch, Graph};

#[derive(clap::Parser)]
#[clap(about = "Generates random 3-colorings and sends the edges to remove to the supervisor")]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "cellq-generator.toml")]
    config: String,
    /// Solutions removing more edges than this are not sent
    #[clap(short = 'm', long = "max-edges")]
    max_edges: Option<usize>,
    /// Edges as vertex1-vertex2
    #[clap(required = true)]
    edges: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct GeneratorSection {
    max_edges: usize,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        GeneratorSection { max_edges: 8 }
    }
}

#[derive(Default, Debug, Serialize, Deserialize)]
#[serde(default)]
struct GeneratorConfig {
    queue: QueueConfig,
    generator: GeneratorSection,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts: Opts = Opts::parse();
    let cfg: GeneratorConfig = confy::load_path(&opts.config)?;
    let graph = Graph::parse(opts.edges.as_slice())?;
    info!(vertices = graph.vertices(), edges = graph.edges().len(), "graph loaded");

    let cancel = Arc::new(AtomicBool::new(false));
    for signal in [SIGHUP, SIGINT, SIGQUIT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&cancel))?;
    }

    let writer = &mut RecordWriter::attach(&cfg.queue)?;
    let producer_opts = ProducerOptions {
        max_size: opts.max_edges.unwrap_or(cfg.generator.max_edges),
        max_submissions: None,
    };
    let mut search = ColoringSearch::new(graph, rand::thread_rng());
    let summary = run_producer(writer, &mut search, &producer_opts, &cancel)?;
    info!(published = summary.published, "generator stopped");
    Ok(())
}
