use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use wordfeed_core::types::{Batch, ParsedExample};
use wordfeed_core::vocab::Vocabulary;

use wordfeed_observe::metrics::{Counter, Gauge};

use crate::bucket::BucketBatcher;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::filter::ExampleFilter;
use crate::parse;
use crate::reader;
use crate::resolve::resolve_file_set;
use crate::synth::SynthSource;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub records_read_total: Counter,
    pub examples_parsed_total: Counter,
    pub examples_filtered_total: Counter,
    pub batches_emitted_total: Counter,
    pub epochs_completed_total: Counter,
    pub records_buffered: Gauge,
    pub records_buffered_high_water: Gauge,
    pub batches_buffered: Gauge,
}

impl PipelineMetrics {
    pub(crate) fn on_record_buffered(&self) {
        let now = self.records_buffered.add(1);
        self.records_buffered_high_water.max(now);
    }

    pub(crate) fn on_record_drained(&self) {
        self.records_buffered.sub(1);
    }

    fn on_batch_buffered(&self) {
        self.batches_buffered.add(1);
    }

    fn on_batch_drained(&self) {
        self.batches_buffered.sub(1);
    }
}

/// Consumer end of a running pipeline.
///
/// Dropping the stream (or calling [`BatchStream::shutdown`]) flips the stop
/// signal; every worker blocked on a buffer unblocks through the
/// channel-closure cascade and the pipeline task resolves in bounded time.
pub struct BatchStream {
    rx: mpsc::Receiver<Batch>,
    stop: watch::Sender<bool>,
    metrics: Arc<PipelineMetrics>,
}

impl BatchStream {
    /// Next batch, or `None` once the configured passes are exhausted or the
    /// pipeline shut down.
    pub async fn recv(&mut self) -> Option<Batch> {
        let batch = self.rx.recv().await?;
        self.metrics.on_batch_drained();
        Some(batch)
    }

    /// Requests a cooperative shutdown without dropping the stream.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

enum Source {
    Files { base_dir: PathBuf, patterns: String },
    Synthetic(SynthSource),
}

/// The bucketed ingestion pipeline: resolver, reader pool, parser pool,
/// filter, bucketing batcher, and the bounded buffers between them.
///
/// [`Pipeline::spawn`] and [`Pipeline::spawn_synthetic`] start one run and
/// hand back the consumer stream plus a join handle carrying the terminal
/// result. All fatal errors (configuration, I/O, malformed records,
/// vocabulary and sparse-format violations) surface through that handle;
/// the first one wins and tears the run down.
pub struct Pipeline {
    config: PipelineConfig,
    vocab: Arc<Vocabulary>,
    filter: Option<ExampleFilter>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Validates `config` and builds the standard threshold filter from its
    /// `minimum_width` / `width_threshold` / `length_threshold` fields.
    pub fn new(config: PipelineConfig, vocab: Arc<Vocabulary>) -> Result<Self, PipelineError> {
        config.validate()?;
        let filter = ExampleFilter::from_thresholds(
            config.minimum_width,
            config.width_threshold,
            config.length_threshold,
        );
        Ok(Self {
            config,
            vocab,
            filter,
            metrics: Arc::new(PipelineMetrics::default()),
        })
    }

    /// Replaces the threshold filter with a caller-supplied predicate
    /// (`None` disables filtering entirely).
    pub fn with_filter(mut self, filter: Option<ExampleFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Starts a run over the shard files matching `patterns` under
    /// `base_dir`. Patterns are re-resolved at the start of every pass.
    pub fn spawn(
        &self,
        base_dir: impl Into<PathBuf>,
        patterns: impl Into<String>,
    ) -> (BatchStream, JoinHandle<Result<(), PipelineError>>) {
        self.spawn_source(Source::Files {
            base_dir: base_dir.into(),
            patterns: patterns.into(),
        })
    }

    /// Starts a run over a synthetic source in place of shard files. Each
    /// pass replays the source's seeded sequence from the beginning.
    pub fn spawn_synthetic(
        &self,
        source: SynthSource,
    ) -> (BatchStream, JoinHandle<Result<(), PipelineError>>) {
        self.spawn_source(Source::Synthetic(source))
    }

    fn spawn_source(
        &self,
        source: Source,
    ) -> (BatchStream, JoinHandle<Result<(), PipelineError>>) {
        let (batch_tx, batch_rx) = mpsc::channel(self.config.batch_capacity());
        let (stop_tx, stop_rx) = watch::channel(false);

        let driver = Driver {
            config: self.config.clone(),
            vocab: Arc::clone(&self.vocab),
            filter: self.filter.clone(),
            metrics: Arc::clone(&self.metrics),
            source,
            batch_tx,
            stop: stop_rx,
        };
        let handle = tokio::spawn(driver.run());

        let stream = BatchStream {
            rx: batch_rx,
            stop: stop_tx,
            metrics: Arc::clone(&self.metrics),
        };
        (stream, handle)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PassOutcome {
    Completed,
    Stopped,
    Aborted,
}

struct Driver {
    config: PipelineConfig,
    vocab: Arc<Vocabulary>,
    filter: Option<ExampleFilter>,
    metrics: Arc<PipelineMetrics>,
    source: Source,
    batch_tx: mpsc::Sender<Batch>,
    stop: watch::Receiver<bool>,
}

impl Driver {
    async fn run(self) -> Result<(), PipelineError> {
        let mut pass: u32 = 0;
        loop {
            if *self.stop.borrow() {
                return Ok(());
            }
            tracing::info!(target: "wordfeed_proof", event = "pass_start", pass, "starting pass");

            let outcome = match self.run_pass(pass).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(
                        target: "wordfeed_proof",
                        event = "fatal",
                        pass,
                        error = %err,
                        "pipeline terminated"
                    );
                    return Err(err);
                }
            };
            if outcome == PassOutcome::Stopped {
                tracing::info!(target: "wordfeed_proof", event = "stopped", pass, "consumer gone");
                return Ok(());
            }

            self.metrics.epochs_completed_total.inc();
            tracing::info!(target: "wordfeed_proof", event = "pass_end", pass, "finished pass");
            pass += 1;
            if matches!(self.config.num_epochs, Some(n) if pass >= n) {
                return Ok(());
            }
        }
    }

    /// One resolver-through-batcher pass: spawn the source workers, drain
    /// their output through the filter into the batcher, then join the
    /// workers before flushing partials so a worker failure wins over an
    /// end-of-pass flush.
    async fn run_pass(&self, pass: u32) -> Result<PassOutcome, PipelineError> {
        // The first worker to hit a fatal error flips `abort`; its siblings
        // and the batcher stage stop on the flag instead of draining the
        // surviving shards. The sender stays alive here so the batcher's
        // abort branch only fires on an actual worker failure.
        let (abort_tx, abort_rx) = watch::channel(false);
        let (parsed_rx, mut workers) = match &self.source {
            Source::Files { base_dir, patterns } => {
                self.spawn_file_workers(base_dir, patterns, abort_tx.clone())
                    .await?
            }
            Source::Synthetic(source) => self.spawn_synth_worker(source),
        };

        let drained = self.drain_examples(parsed_rx, abort_rx).await;
        // Join before flushing partials: a worker failure is the root cause
        // and must win over both a batcher error and an end-of-pass flush.
        if let Some(err) = join_workers(&mut workers).await {
            return Err(err);
        }
        let (mut batcher, outcome) = drained?;
        match outcome {
            PassOutcome::Stopped => return Ok(PassOutcome::Stopped),
            PassOutcome::Aborted => {
                return Err(PipelineError::Internal(
                    "pass aborted without a worker error".to_string(),
                ))
            }
            PassOutcome::Completed => {}
        }

        let finals = batcher.flush()?;
        if !finals.is_empty() {
            tracing::debug!(
                target: "wordfeed_proof",
                event = "flush",
                pass,
                batches = finals.len(),
                "flushing partial buckets"
            );
        }
        for batch in finals {
            if !self.send_batch(batch).await {
                return Ok(PassOutcome::Stopped);
            }
        }
        Ok(PassOutcome::Completed)
    }

    async fn spawn_file_workers(
        &self,
        base_dir: &Path,
        patterns: &str,
        abort: watch::Sender<bool>,
    ) -> Result<(mpsc::Receiver<ParsedExample>, Vec<JoinSet<Result<(), PipelineError>>>), PipelineError>
    {
        let base = base_dir.to_path_buf();
        let patterns_owned = patterns.to_string();
        let shards = tokio::task::spawn_blocking(move || resolve_file_set(&base, &patterns_owned))
            .await
            .map_err(PipelineError::join)??;
        tracing::debug!(
            target: "wordfeed_proof",
            event = "resolved",
            shards = shards.len(),
            "resolved shard set"
        );

        let (raw_tx, raw_rx) = mpsc::channel(self.config.record_capacity());
        let (parsed_tx, parsed_rx) = mpsc::channel(self.config.record_capacity());

        let readers = reader::spawn_readers(
            shards,
            self.config.num_workers,
            raw_tx,
            self.stop.clone(),
            abort.clone(),
            Arc::clone(&self.metrics),
        );
        let parsers = parse::spawn_parsers(
            raw_rx,
            parsed_tx,
            self.config.num_workers,
            Arc::clone(&self.vocab),
            self.stop.clone(),
            abort,
            Arc::clone(&self.metrics),
        );
        Ok((parsed_rx, vec![readers, parsers]))
    }

    fn spawn_synth_worker(
        &self,
        source: &SynthSource,
    ) -> (mpsc::Receiver<ParsedExample>, Vec<JoinSet<Result<(), PipelineError>>>) {
        let (parsed_tx, parsed_rx) = mpsc::channel(self.config.record_capacity());
        let mut workers = JoinSet::new();

        let source = source.clone();
        let stop = self.stop.clone();
        let metrics = Arc::clone(&self.metrics);
        workers.spawn_blocking(move || {
            let mut stream = source.stream();
            while let Some(example) = stream.next_example() {
                if *stop.borrow() {
                    return Ok(());
                }
                metrics.examples_parsed_total.inc();
                if parsed_tx.blocking_send(example).is_err() {
                    return Ok(());
                }
            }
            Ok(())
        });
        (parsed_rx, vec![workers])
    }

    /// Runs the serialized batcher stage until the example channel closes or
    /// a worker flips `abort`.
    ///
    /// Returns the batcher (so the caller can flush after joining workers)
    /// together with whether the consumer went away or a worker failed
    /// mid-pass.
    async fn drain_examples(
        &self,
        mut parsed_rx: mpsc::Receiver<ParsedExample>,
        mut abort: watch::Receiver<bool>,
    ) -> Result<(BucketBatcher, PassOutcome), PipelineError> {
        let mut batcher = BucketBatcher::new(&self.config.boundaries, self.config.batch_size)?;
        loop {
            let example = tokio::select! {
                maybe = parsed_rx.recv() => match maybe {
                    Some(example) => example,
                    None => break,
                },
                _ = abort.changed() => return Ok((batcher, PassOutcome::Aborted)),
            };
            if let Some(filter) = &self.filter {
                if !filter.keeps(&example) {
                    self.metrics.examples_filtered_total.inc();
                    continue;
                }
            }
            if let Some(batch) = batcher.push(example)? {
                if !self.send_batch(batch).await {
                    return Ok((batcher, PassOutcome::Stopped));
                }
            }
        }
        if *self.stop.borrow() {
            return Ok((batcher, PassOutcome::Stopped));
        }
        Ok((batcher, PassOutcome::Completed))
    }

    async fn send_batch(&self, batch: Batch) -> bool {
        self.metrics.on_batch_buffered();
        if self.batch_tx.send(batch).await.is_err() {
            self.metrics.on_batch_drained();
            return false;
        }
        self.metrics.batches_emitted_total.inc();
        true
    }
}

async fn join_workers(
    workers: &mut Vec<JoinSet<Result<(), PipelineError>>>,
) -> Option<PipelineError> {
    let mut first = None;
    for set in workers {
        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first.get_or_insert(err);
                }
                Err(err) => {
                    first.get_or_insert(PipelineError::join(err));
                }
            }
        }
    }
    first
}
