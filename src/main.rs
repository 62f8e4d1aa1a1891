//! stagewrite: write a CSV file into a destination directory as N staged files.
//!
//! Reads the job configuration from a JSON file, splits the input rows into
//! contiguous ranges (one per task), and runs the full plan/prepare/split/commit
//! pipeline against a local `file://` filesystem.

use anyhow::{Context, Result};
use clap::Parser;
use stagewrite::dirty::{DirtyRecordCollector, LoggingCollector, MemoryCollector};
use stagewrite::io::LocalConnector;
use stagewrite::logging::init_tracing;
use stagewrite::{ExecMode, JobConfig, Record, Value, WriteJob};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Staged parallel writer.
#[derive(Parser, Debug)]
#[command(name = "stagewrite")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the job configuration (JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// CSV file with the records to write.
    #[arg(short, long)]
    input: PathBuf,

    /// Treat the first input row as a header.
    #[arg(long)]
    has_headers: bool,

    /// Delimiter of the input file.
    #[arg(long, default_value_t = ',')]
    input_delimiter: char,

    /// Number of writer tasks (defaults to the number of CPUs).
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Write dirty records to this file as JSON instead of only logging them.
    #[arg(long)]
    dirty_out: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = JobConfig::from_path(&args.config)?;
    let records = read_input(args)?;
    let tasks = args.parallelism.unwrap_or_else(num_cpus::get).max(1);
    info!(records = records.len(), tasks, "input loaded");

    let sources: Vec<_> = split_ranges(records.len(), tasks)
        .into_iter()
        .map(|(start, end)| records[start..end].to_vec().into_iter())
        .collect();

    let memory = args.dirty_out.as_ref().map(|_| Arc::new(MemoryCollector::new()));
    let collector: Arc<dyn DirtyRecordCollector> = match &memory {
        Some(m) => Arc::clone(m) as Arc<dyn DirtyRecordCollector>,
        None => Arc::new(LoggingCollector::new()),
    };

    let job = WriteJob::plan(&config, Arc::new(LocalConnector))?.with_exec_mode(
        ExecMode::Parallel {
            threads: Some(tasks),
        },
    );
    let report = job.run(sources, collector)?;

    if let (Some(path), Some(memory)) = (&args.dirty_out, &memory) {
        memory
            .write_to_file(path)
            .with_context(|| format!("write dirty records to {}", path.display()))?;
        info!(count = memory.count(), path = %path.display(), "dirty records exported");
    }
    info!(
        files = report.committed.len(),
        records = report.records_written,
        dirty = report.dirty_records,
        post_commit = report.post_commit_executed,
        "done"
    );
    Ok(())
}

fn read_input(args: &Args) -> Result<Vec<Record>> {
    let delimiter = u8::try_from(args.input_delimiter)
        .context("input delimiter must be a single-byte character")?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(args.has_headers)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?;

    let mut out = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("read row {} of {}", idx + 1, args.input.display()))?;
        out.push(Record::new(
            row.iter()
                .map(|field| {
                    if field.is_empty() {
                        Value::Null
                    } else {
                        Value::from(field)
                    }
                })
                .collect(),
        ));
    }
    Ok(out)
}

/// `parts` contiguous `(start, end)` ranges covering `0..len`, sizes differing by at
/// most one. Always returns `parts` ranges so every task gets a file, possibly empty.
fn split_ranges(len: usize, parts: usize) -> Vec<(usize, usize)> {
    let parts = parts.max(1);
    let base = len / parts;
    let rem = len % parts;

    let mut out = Vec::with_capacity(parts);
    let mut start = 0usize;
    for idx in 0..parts {
        let extra = usize::from(idx < rem);
        let end = start + base + extra;
        out.push((start, end));
        start = end;
    }
    out
}
