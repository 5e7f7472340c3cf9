#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use wordfeed_core::vocab::Vocabulary;
use wordfeed_pipeline::config::{PipelineConfig, DEFAULT_FILE_PATTERNS};
use wordfeed_pipeline::pipeline::{Pipeline, PipelineMetrics};
use wordfeed_pipeline::synth::{SynthConfig, SynthSource};

/// Runs the ingestion pipeline and consumes its batches, printing periodic
/// metrics snapshots. With `--base-dir` it reads shard files; without, it
/// runs over the synthetic source.
#[derive(Debug, Parser)]
#[command(name = "wordfeed-demo")]
struct Args {
    #[arg(long, env = "WORDFEED_BASE_DIR")]
    base_dir: Option<PathBuf>,

    #[arg(long, env = "WORDFEED_FILE_PATTERNS", default_value = DEFAULT_FILE_PATTERNS)]
    file_patterns: String,

    #[arg(long, env = "WORDFEED_BATCH_SIZE", default_value_t = 32)]
    batch_size: usize,

    #[arg(long, env = "WORDFEED_NUM_INPUT_THREADS", default_value_t = 4)]
    num_input_threads: usize,

    /// Comma-separated ascending width boundaries; empty selects dynamic
    /// (window) padding.
    #[arg(
        long,
        env = "WORDFEED_BOUNDARIES",
        default_value = "32,64,96,128,160,192,224,256"
    )]
    boundaries: String,

    #[arg(long, env = "WORDFEED_NUM_EPOCHS")]
    num_epochs: Option<u32>,

    #[arg(long, env = "WORDFEED_MINIMUM_WIDTH", default_value_t = 20)]
    minimum_width: i32,

    #[arg(long, env = "WORDFEED_WIDTH_THRESHOLD")]
    width_threshold: Option<i32>,

    #[arg(long, env = "WORDFEED_LENGTH_THRESHOLD")]
    length_threshold: Option<i32>,

    /// Synthetic examples per pass when no base dir is given.
    #[arg(long, env = "WORDFEED_SYNTH_COUNT", default_value_t = 1024)]
    synth_count: u64,

    #[arg(long, env = "WORDFEED_SYNTH_SEED", default_value_t = 0)]
    synth_seed: u64,

    /// Periodically emit a metrics snapshot (0 disables).
    #[arg(long, env = "WORDFEED_METRICS_SNAPSHOT_INTERVAL_MS", default_value_t = 1000)]
    metrics_snapshot_interval_ms: u64,
}

fn parse_boundaries(raw: &str) -> Result<Vec<i32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i32>().with_context(|| format!("bad boundary {s:?}")))
        .collect()
}

fn emit_metrics_snapshot(metrics: &PipelineMetrics) {
    tracing::info!(
        target: "wordfeed_metrics",
        records_read_total = metrics.records_read_total.get(),
        examples_parsed_total = metrics.examples_parsed_total.get(),
        examples_filtered_total = metrics.examples_filtered_total.get(),
        batches_emitted_total = metrics.batches_emitted_total.get(),
        epochs_completed_total = metrics.epochs_completed_total.get(),
        records_buffered = metrics.records_buffered.get(),
        records_buffered_high_water = metrics.records_buffered_high_water.get(),
        batches_buffered = metrics.batches_buffered.get(),
        "metrics"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    wordfeed_observe::logging::init_tracing();
    let args = Args::parse();

    let config = PipelineConfig {
        batch_size: args.batch_size,
        num_workers: args.num_input_threads,
        boundaries: parse_boundaries(&args.boundaries)?,
        num_epochs: args.num_epochs,
        minimum_width: Some(args.minimum_width),
        width_threshold: args.width_threshold,
        length_threshold: args.length_threshold,
        ..PipelineConfig::default()
    };
    let vocab = Arc::new(Vocabulary::ascii_alphanumeric());
    let pipeline = Pipeline::new(config, Arc::clone(&vocab))?;
    let metrics = pipeline.metrics();

    let metrics_task = if args.metrics_snapshot_interval_ms > 0 {
        let interval_ms = args.metrics_snapshot_interval_ms.max(1);
        let metrics = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                emit_metrics_snapshot(&metrics);
            }
        }))
    } else {
        None
    };

    let (mut stream, handle) = match &args.base_dir {
        Some(base_dir) => {
            info!(base_dir = %base_dir.display(), patterns = %args.file_patterns, "starting file pipeline");
            pipeline.spawn(base_dir, args.file_patterns.clone())
        }
        None => {
            info!(count = args.synth_count, seed = args.synth_seed, "starting synthetic pipeline");
            let synth = SynthConfig {
                count: args.synth_count,
                seed: args.synth_seed,
                ..SynthConfig::default()
            };
            pipeline.spawn_synthetic(SynthSource::new(synth, vocab)?)
        }
    };

    let start = Instant::now();
    let mut batches: u64 = 0;
    let mut examples: u64 = 0;
    loop {
        tokio::select! {
            batch = stream.recv() => {
                let Some(batch) = batch else { break };
                batches += 1;
                examples += batch.len() as u64;
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received; shutting down");
                stream.shutdown();
                break;
            }
        }
    }
    drop(stream);
    handle.await.context("pipeline task panicked")??;

    if let Some(task) = metrics_task {
        task.abort();
    }
    emit_metrics_snapshot(&metrics);
    info!(
        batches,
        examples,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "pipeline drained"
    );
    Ok(())
}
