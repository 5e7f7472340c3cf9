use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use wordfeed_core::record::{FrameError, RecordReader};
use wordfeed_core::types::RecordOrigin;

use crate::error::PipelineError;
use crate::pipeline::PipelineMetrics;

/// One framed payload pulled off disk, not yet parsed.
#[derive(Debug)]
pub struct RawRecord {
    pub payload: Vec<u8>,
    pub origin: RecordOrigin,
}

/// Spawns up to `num_workers` shard readers feeding `tx`.
///
/// Shards are assigned round robin by position in `shards`, so a single
/// worker reads every shard in order and the split is stable across passes.
/// Interleaving across workers is unordered. Workers exit cleanly when the
/// receiver is dropped, `stop` flips, or a sibling flips `abort`; frame and
/// I/O errors flip `abort` themselves and are returned through the joinset.
pub(crate) fn spawn_readers(
    shards: Vec<PathBuf>,
    num_workers: usize,
    tx: mpsc::Sender<RawRecord>,
    stop: watch::Receiver<bool>,
    abort: watch::Sender<bool>,
    metrics: Arc<PipelineMetrics>,
) -> JoinSet<Result<(), PipelineError>> {
    let mut workers = JoinSet::new();
    let num_workers = num_workers.max(1);
    for worker in 0..num_workers {
        let assigned: Vec<PathBuf> = shards
            .iter()
            .skip(worker)
            .step_by(num_workers)
            .cloned()
            .collect();
        if assigned.is_empty() {
            continue;
        }
        let tx = tx.clone();
        let stop = stop.clone();
        let abort = abort.clone();
        let metrics = Arc::clone(&metrics);
        workers.spawn(async move {
            let res = read_shards(assigned, tx, stop, abort.clone(), metrics).await;
            if res.is_err() {
                abort.send_replace(true);
            }
            res
        });
    }
    workers
}

async fn read_shards(
    paths: Vec<PathBuf>,
    tx: mpsc::Sender<RawRecord>,
    stop: watch::Receiver<bool>,
    abort: watch::Sender<bool>,
    metrics: Arc<PipelineMetrics>,
) -> Result<(), PipelineError> {
    for path in paths {
        if *stop.borrow() || *abort.borrow() {
            return Ok(());
        }

        let shard_name = path.to_string_lossy().into_owned();
        let mut cursor = tokio::task::spawn_blocking(move || ShardCursor::open(path))
            .await
            .map_err(PipelineError::join)??;
        tracing::debug!(target: "wordfeed_proof", event = "shard_open", shard = %shard_name, "reading shard");

        loop {
            if *stop.borrow() || *abort.borrow() {
                return Ok(());
            }

            // Frame decoding touches the filesystem, so hop to the blocking
            // pool for each record and take the cursor back with the result.
            let (next, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = cursor.next_record();
                (cursor, outcome)
            })
            .await
            .map_err(PipelineError::join)?;
            cursor = next;

            let Some(record) = outcome? else {
                break;
            };
            metrics.records_read_total.inc();
            metrics.on_record_buffered();
            if tx.send(record).await.is_err() {
                // Consumer is gone; unwind without treating it as a failure.
                metrics.on_record_drained();
                return Ok(());
            }
        }

        tracing::debug!(
            target: "wordfeed_proof",
            event = "shard_done",
            shard = %shard_name,
            records = cursor.next_ordinal,
            "finished shard"
        );
    }
    Ok(())
}

struct ShardCursor {
    shard: Arc<str>,
    path: PathBuf,
    reader: RecordReader<BufReader<File>>,
    next_ordinal: u64,
}

impl ShardCursor {
    fn open(path: PathBuf) -> Result<Self, PipelineError> {
        let file = File::open(&path).map_err(|err| PipelineError::io(&path, err))?;
        let shard: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
        Ok(Self {
            shard,
            path,
            reader: RecordReader::new(BufReader::new(file)),
            next_ordinal: 0,
        })
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>, PipelineError> {
        match self.reader.read_record() {
            Ok(Some(payload)) => {
                let origin = RecordOrigin::new(Arc::clone(&self.shard), self.next_ordinal);
                self.next_ordinal += 1;
                Ok(Some(RawRecord { payload, origin }))
            }
            Ok(None) => Ok(None),
            Err(FrameError::Io(err)) => Err(PipelineError::io(&self.path, err)),
            Err(err) => Err(PipelineError::MalformedRecord {
                origin: RecordOrigin::new(Arc::clone(&self.shard), self.next_ordinal),
                reason: err.to_string(),
            }),
        }
    }
}
