//! OSM extraction driver.
//!
//! Reads an OSM extract, builds the city hierarchy, reports on it and
//! optionally writes the interesting subset back out.

mod report;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sift::config::ExtractionConfig;
use sift::display::{JsonSummary, LogSummary, RegionDisplay};
use sift::osm::{ClosureMode, Compression, OutputStream};
use sift::{Extractor, InputFormat};

use crate::report::write_diagnostics;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "extract")]
#[command(about = "Extract cities, buildings and amenities from OSM data")]
struct Args {
    /// OSM XML (optionally bzip2/gzip compressed) or PBF file
    #[arg(short, long)]
    file: PathBuf,

    /// Input is bzip2 compressed; fail fast if it is not
    #[arg(long)]
    compressed: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the interesting subset as OSM XML
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compress the output with bzip2
    #[arg(long)]
    compress_output: bool,

    /// Degrees per road tile (overrides the config)
    #[arg(long)]
    tile_size: Option<f64>,

    /// Write a JSON summary of the region here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write diagnostics as CSV here
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    /// Write only the interesting entities, without their references
    #[arg(long)]
    no_closure: bool,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Sift Extraction");
    info!("File: {}", args.file.display());

    let mut config = match &args.config {
        Some(path) => ExtractionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExtractionConfig::default(),
    };
    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    if args.compressed {
        config.input_compression = Compression::Bzip2;
    }
    if args.no_closure {
        config.output.closure = ClosureMode::InterestingOnly;
    }
    if args.compress_output {
        config.output.compression = Compression::Bzip2;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(200));

    let start = Utc::now();
    let format = InputFormat::from_path(&args.file);
    let file = File::open(&args.file).context("Failed to open input file")?;

    let progress = pb.clone();
    let extraction = Extractor::new(config.clone())?
        .with_progress(move |stats| {
            progress.set_message(format!(
                "{} nodes, {} ways, {} relations ({} kept)",
                stats.nodes_seen,
                stats.ways_seen,
                stats.relations_seen,
                stats.kept()
            ));
        })
        .run(BufReader::new(file), format)
        .context("Extraction failed")?;
    pb.finish_with_message("Ingestion complete");

    LogSummary.display(&extraction.region)?;

    if let Some(path) = &args.summary {
        let file = File::create(path).context("Failed to create summary file")?;
        JsonSummary::new(BufWriter::new(file))
            .pretty()
            .display(&extraction.region)?;
        info!("Wrote summary to {}", path.display());
    }

    let diagnostics = extraction.diagnostics();
    if !diagnostics.is_empty() {
        warn!("{} diagnostics recorded", diagnostics.len());
    }
    if let Some(path) = &args.diagnostics {
        write_diagnostics(path, diagnostics)?;
    }

    if let Some(path) = &args.output {
        let compression = match config.output.compression {
            Compression::Auto => Compression::from_path(path),
            other => other,
        };
        let file = File::create(path).context("Failed to create output file")?;
        let mut stream = OutputStream::new(BufWriter::new(file), compression);
        let summary = extraction
            .write_subset(&mut stream, &config)
            .context("Failed to write subset")?;
        stream
            .finish()
            .context("Failed to finish output stream")?
            .flush()?;
        if summary.unresolved > 0 {
            warn!(
                "{} referenced entities were missing from the input",
                summary.unresolved
            );
        }
        info!("Wrote subset to {}", path.display());
    }

    let elapsed = Utc::now() - start;
    info!("Done in {}s", elapsed.num_seconds());
    Ok(())
}
