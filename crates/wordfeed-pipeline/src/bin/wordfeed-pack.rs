#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use wordfeed_core::vocab::Vocabulary;
use wordfeed_pipeline::pack::pack_shards;
use wordfeed_pipeline::synth::{SynthConfig, SynthSource};

/// Seeds a directory with framed word-record shards for dev and test runs.
#[derive(Debug, Parser)]
#[command(name = "wordfeed-pack")]
struct Args {
    #[arg(long, env = "WORDFEED_OUT_DIR")]
    out_dir: PathBuf,

    #[arg(long, env = "WORDFEED_NUM_SHARDS", default_value_t = 4)]
    num_shards: usize,

    #[arg(long, env = "WORDFEED_COUNT", default_value_t = 256)]
    count: u64,

    #[arg(long, env = "WORDFEED_SEED", default_value_t = 0)]
    seed: u64,

    #[arg(long, env = "WORDFEED_HEIGHT", default_value_t = 31)]
    height: u32,

    #[arg(long, env = "WORDFEED_MIN_WIDTH", default_value_t = 16)]
    min_width: u32,

    #[arg(long, env = "WORDFEED_MAX_WIDTH", default_value_t = 200)]
    max_width: u32,

    #[arg(long, env = "WORDFEED_MIN_TEXT_LEN", default_value_t = 1)]
    min_text_len: usize,

    #[arg(long, env = "WORDFEED_MAX_TEXT_LEN", default_value_t = 12)]
    max_text_len: usize,

    /// Character set of the generated corpus; defaults to ASCII alphanumerics.
    #[arg(long, env = "WORDFEED_CHARSET")]
    charset: Option<String>,
}

fn main() -> Result<()> {
    wordfeed_observe::logging::init_tracing();
    let args = Args::parse();

    let vocab = match &args.charset {
        Some(charset) => Vocabulary::new(charset).context("invalid charset")?,
        None => Vocabulary::ascii_alphanumeric(),
    };
    let config = SynthConfig {
        count: args.count,
        height: args.height,
        min_width: args.min_width,
        max_width: args.max_width,
        min_text_len: args.min_text_len,
        max_text_len: args.max_text_len,
        seed: args.seed,
    };
    let source =
        SynthSource::new(config, Arc::new(vocab)).context("invalid generator configuration")?;

    let report = pack_shards(&args.out_dir, args.num_shards, &source)
        .with_context(|| format!("packing shards under {}", args.out_dir.display()))?;
    info!(
        records = report.records,
        shards = report.shards.len(),
        out_dir = %args.out_dir.display(),
        "pack complete"
    );
    Ok(())
}
