use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use vafile_rs::workload::parse_queries;
use vafile_rs::{
    BoundKind, KnnStrategy, LinearScanIndex, Match, Query, StoreKind, VaConfig, VaIndex,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "vafile")]
#[command(version)]
#[command(about = "Vector approximation file for point, range and kNN search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the input file
    Build {
        #[command(flatten)]
        index: IndexArgs,
    },

    /// Run a query-description stream, building the index first if needed
    Query {
        #[command(flatten)]
        index: IndexArgs,

        /// Query stream file (reads stdin when omitted)
        #[arg(short, long)]
        queries: Option<PathBuf>,

        /// Print `<type> <microseconds>` per query instead of payloads
        #[arg(long)]
        timing: bool,

        /// Answer with an in-memory linear scan of the input file
        #[arg(long)]
        linear: bool,
    },

    /// Show the manifest and verify the approximation file
    Info {
        #[command(flatten)]
        index: IndexArgs,
    },
}

#[derive(Args)]
struct IndexArgs {
    /// Dimensionality of every point
    #[arg(short, long)]
    dim: usize,

    /// Bits per dimension (1-16)
    #[arg(short, long, default_value = "8")]
    bits: u32,

    /// Input point file (`<x_0> ... <x_{D-1}> <payload>` per line)
    #[arg(short, long, default_value = "data.txt")]
    input: PathBuf,

    /// Approximation file
    #[arg(short, long, default_value = "vafile.txt")]
    approx: PathBuf,

    /// Object store directory (or log file with `--store-kind log`)
    #[arg(short, long, default_value = "objects")]
    store: PathBuf,

    #[arg(long, value_enum, default_value_t = StoreArg::Files)]
    store_kind: StoreArg,

    #[arg(long, value_enum, default_value_t = BoundArg::NearestEdge)]
    bound: BoundArg,

    #[arg(long, value_enum, default_value_t = KnnArg::UpperBound)]
    knn: KnnArg,

    /// Store coordinates outside [0, 1) clamped into the domain instead of rejecting them
    #[arg(long)]
    lenient: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Files,
    Log,
}

#[derive(Clone, Copy, ValueEnum)]
enum BoundArg {
    NearestEdge,
    LowerEdge,
}

#[derive(Clone, Copy, ValueEnum)]
enum KnnArg {
    UpperBound,
    Cascade,
}

impl IndexArgs {
    fn to_config(&self) -> VaConfig {
        VaConfig::new(self.dim, self.bits)
            .with_input_path(&self.input)
            .with_approx_path(&self.approx)
            .with_store_path(&self.store)
            .with_store_kind(match self.store_kind {
                StoreArg::Files => StoreKind::Files,
                StoreArg::Log => StoreKind::Log,
            })
            .with_bound(match self.bound {
                BoundArg::NearestEdge => BoundKind::NearestEdge,
                BoundArg::LowerEdge => BoundKind::LowerEdge,
            })
            .with_knn_strategy(match self.knn {
                KnnArg::UpperBound => KnnStrategy::UpperBound,
                KnnArg::Cascade => KnnStrategy::LowerBoundCascade,
            })
            .with_strict_domain(!self.lenient)
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Build { index } => run_build(index.to_config()),
        Commands::Query {
            index,
            queries,
            timing,
            linear,
        } => run_queries(index.to_config(), queries, timing, linear),
        Commands::Info { index } => run_info(index.to_config()),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        let mut source = err.source();
        while let Some(inner) = source {
            eprintln!("  caused by: {inner}");
            source = inner.source();
        }
        process::exit(1);
    }
}

fn run_build(config: VaConfig) -> CliResult<()> {
    let index = VaIndex::build(config)?;
    if let Some(summary) = index.last_build() {
        println!(
            "indexed {} objects ({} bytes, crc32 {:08x})",
            summary.records, summary.approx.bytes, summary.approx.checksum
        );
    }
    Ok(())
}

fn run_queries(
    config: VaConfig,
    queries: Option<PathBuf>,
    timing: bool,
    linear: bool,
) -> CliResult<()> {
    let dim = config.dim;
    let queries = match queries {
        Some(path) => parse_queries(BufReader::new(File::open(path)?), dim)?,
        None => parse_queries(io::stdin().lock(), dim)?,
    };
    info!("loaded {} queries", queries.len());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if linear {
        let started = Instant::now();
        let baseline = LinearScanIndex::load(&config.input_path, dim)?;
        info!(
            "loaded {} objects for linear scan in {:.2?}",
            baseline.len(),
            started.elapsed()
        );
        for query in &queries {
            let started = Instant::now();
            let matches = baseline.execute(query)?;
            report(&mut out, query, &matches, started, timing)?;
        }
    } else {
        let index = VaIndex::open_or_build(config)?;
        let engine = index.engine();
        for query in &queries {
            let started = Instant::now();
            let matches = engine.execute(query)?;
            report(&mut out, query, &matches, started, timing)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn report<W: Write>(
    out: &mut W,
    query: &Query,
    matches: &[Match],
    started: Instant,
    timing: bool,
) -> io::Result<()> {
    if timing {
        writeln!(out, "{} {}", query.type_code(), started.elapsed().as_micros())
    } else {
        for hit in matches {
            writeln!(out, "{}", hit.payload)?;
        }
        Ok(())
    }
}

fn run_info(config: VaConfig) -> CliResult<()> {
    let index = VaIndex::open(config)?;
    let manifest = match index.manifest() {
        Some(manifest) => manifest,
        None => {
            println!(
                "no manifest for {}",
                index.config().approx_path.display()
            );
            return Ok(());
        }
    };

    println!("approximation file: {}", index.config().approx_path.display());
    println!("dimension:          {}", manifest.dim);
    println!("bits per dimension: {}", manifest.bits);
    println!("object store:       {:?}", manifest.store_kind);
    println!("records:            {}", manifest.records);
    println!("bytes:              {}", manifest.approx_bytes);
    println!("crc32:              {:08x}", manifest.approx_checksum);

    let summary = index.verify()?;
    println!("verified:           {} records match", summary.records);
    Ok(())
}
