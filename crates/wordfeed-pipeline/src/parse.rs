use std::sync::Arc;

use prost::Message;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;

use wordfeed_core::schema::WordRecord;
use wordfeed_core::sparse::SparseLabel;
use wordfeed_core::types::ParsedExample;
use wordfeed_core::vocab::Vocabulary;

use crate::error::PipelineError;
use crate::pipeline::PipelineMetrics;
use crate::preprocess;
use crate::reader::RawRecord;

/// Decodes one framed payload into a preprocessed example.
///
/// Every schema violation is fatal and names the record: missing fields,
/// scalar range errors, an undecodable image payload, a declared width that
/// disagrees with the decoded image, labels outside the vocabulary, and text
/// containing characters outside the closed vocabulary.
pub fn parse_record(
    record: RawRecord,
    vocab: &Vocabulary,
) -> Result<ParsedExample, PipelineError> {
    let origin = record.origin;
    let message = WordRecord::decode(record.payload.as_slice())
        .map_err(|err| PipelineError::malformed(&origin, format!("undecodable record: {err}")))?;
    let fields = message
        .checked()
        .map_err(|err| PipelineError::malformed(&origin, err))?;
    fields
        .check_label_range(vocab.len())
        .map_err(|err| PipelineError::malformed(&origin, err))?;
    vocab.encode_text(fields.text)?;

    let decoded = image::load_from_memory(fields.image)
        .map_err(|err| PipelineError::malformed(&origin, format!("undecodable image: {err}")))?
        .to_luma8();
    if decoded.width() as i64 != i64::from(fields.width) {
        return Err(PipelineError::malformed(
            &origin,
            format!(
                "declared width {} does not match decoded image width {}",
                fields.width,
                decoded.width()
            ),
        ));
    }

    let labels: Vec<i32> = fields.labels.iter().map(|&v| v as i32).collect();
    Ok(ParsedExample {
        image: preprocess::normalize_and_pad(&decoded),
        width: fields.width,
        label: SparseLabel::encode(&labels),
        length: fields.length,
        text: fields.text.to_string(),
        filename: fields.filename.map(str::to_string),
        origin,
    })
}

/// Spawns `num_workers` decode tasks draining `rx` into `tx`.
///
/// The raw-record receiver is shared behind a mutex; each worker pulls one
/// record, hops to the blocking pool for the CPU-bound decode, and forwards
/// the example. Workers exit cleanly when the raw channel closes, the
/// example receiver is dropped, `stop` flips, or a sibling flips `abort`;
/// decode failures are fatal, flip `abort` for the rest of the pass, and
/// come back through the joinset.
pub(crate) fn spawn_parsers(
    rx: mpsc::Receiver<RawRecord>,
    tx: mpsc::Sender<ParsedExample>,
    num_workers: usize,
    vocab: Arc<Vocabulary>,
    stop: watch::Receiver<bool>,
    abort: watch::Sender<bool>,
    metrics: Arc<PipelineMetrics>,
) -> JoinSet<Result<(), PipelineError>> {
    let rx = Arc::new(Mutex::new(rx));
    let mut workers = JoinSet::new();
    for _ in 0..num_workers.max(1) {
        let rx = Arc::clone(&rx);
        let tx = tx.clone();
        let vocab = Arc::clone(&vocab);
        let stop = stop.clone();
        let abort = abort.clone();
        let metrics = Arc::clone(&metrics);
        workers.spawn(async move {
            let res = parse_worker(rx, tx, vocab, stop, abort.clone(), metrics).await;
            if res.is_err() {
                abort.send_replace(true);
            }
            res
        });
    }
    workers
}

async fn parse_worker(
    rx: Arc<Mutex<mpsc::Receiver<RawRecord>>>,
    tx: mpsc::Sender<ParsedExample>,
    vocab: Arc<Vocabulary>,
    stop: watch::Receiver<bool>,
    abort: watch::Sender<bool>,
    metrics: Arc<PipelineMetrics>,
) -> Result<(), PipelineError> {
    loop {
        if *stop.borrow() || *abort.borrow() {
            return Ok(());
        }
        let record = { rx.lock().await.recv().await };
        let Some(record) = record else {
            return Ok(());
        };
        metrics.on_record_drained();

        let vocab = Arc::clone(&vocab);
        let example = tokio::task::spawn_blocking(move || parse_record(record, &vocab))
            .await
            .map_err(PipelineError::join)??;
        metrics.examples_parsed_total.inc();
        if tx.send(example).await.is_err() {
            // Consumer is gone; unwind without treating it as a failure.
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use image::{GrayImage, Luma};
    use wordfeed_core::types::RecordOrigin;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = GrayImage::from_fn(width, height, |x, y| Luma([(x + y) as u8]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(image)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("png encode");
        out.into_inner()
    }

    fn record_for(text: &str, width: u32, vocab: &Vocabulary) -> WordRecord {
        let labels = vocab.encode_text(text).expect("known chars");
        WordRecord {
            image: Some(png_bytes(width, 31)),
            width: Some(i64::from(width)),
            labels: labels.iter().map(|&v| i64::from(v)).collect(),
            length: Some(labels.len() as i64),
            text: Some(text.to_string()),
            filename: Some("word-0000.png".to_string()),
        }
    }

    fn raw(record: &WordRecord, ordinal: u64) -> RawRecord {
        RawRecord {
            payload: record.encode_to_vec(),
            origin: RecordOrigin::new("words-000.rec", ordinal),
        }
    }

    #[test]
    fn complete_record_parses_into_a_consistent_example() {
        let vocab = Vocabulary::ascii_alphanumeric();
        let example =
            parse_record(raw(&record_for("Word7", 40, &vocab), 3), &vocab).expect("valid record");

        assert_eq!(example.width, 40);
        assert_eq!(example.cols(), 40);
        // Preprocessing adds its duplicated top row.
        assert_eq!(example.rows(), 32);
        assert_eq!(example.length, 5);
        assert_eq!(example.label.len(), 5);
        assert_eq!(example.text, "Word7");
        assert_eq!(example.filename.as_deref(), Some("word-0000.png"));
        assert_eq!(example.origin, RecordOrigin::new("words-000.rec", 3));

        let values = example.label.decode().expect("dense encoding");
        assert_eq!(vocab.decode_indices(&values).expect("in range"), "Word7");
    }

    #[test]
    fn missing_width_is_malformed_not_defaulted() {
        let vocab = Vocabulary::ascii_alphanumeric();
        let mut record = record_for("ab", 30, &vocab);
        record.width = None;

        let err = parse_record(raw(&record, 0), &vocab).unwrap_err();
        match err {
            PipelineError::MalformedRecord { origin, reason } => {
                assert_eq!(origin, RecordOrigin::new("words-000.rec", 0));
                assert!(reason.contains("width"), "reason: {reason}");
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn garbage_payload_and_garbage_image_are_malformed() {
        let vocab = Vocabulary::ascii_alphanumeric();

        let err = parse_record(
            RawRecord {
                payload: b"\xff\xff\xff not a message".to_vec(),
                origin: RecordOrigin::new("words-000.rec", 0),
            },
            &vocab,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));

        let mut record = record_for("ab", 30, &vocab);
        record.image = Some(b"not a png".to_vec());
        let err = parse_record(raw(&record, 1), &vocab).unwrap_err();
        match err {
            PipelineError::MalformedRecord { reason, .. } => {
                assert!(reason.contains("image"), "reason: {reason}")
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn width_disagreeing_with_decoded_image_is_malformed() {
        let vocab = Vocabulary::ascii_alphanumeric();
        let mut record = record_for("ab", 30, &vocab);
        record.width = Some(31);

        let err = parse_record(raw(&record, 0), &vocab).unwrap_err();
        match err {
            PipelineError::MalformedRecord { reason, .. } => {
                assert!(reason.contains("width"), "reason: {reason}")
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn label_outside_vocabulary_is_malformed() {
        let vocab = Vocabulary::new("ab").expect("valid charset");
        let mut record = record_for("ab", 30, &vocab);
        record.labels = vec![0, 9];

        let err = parse_record(raw(&record, 0), &vocab).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));
    }

    #[test]
    fn text_outside_vocabulary_is_a_vocabulary_error() {
        let vocab = Vocabulary::new("ab").expect("valid charset");
        let mut record = record_for("ab", 30, &vocab);
        record.text = Some("a b".to_string());
        record.labels = vec![0, 1];

        let err = parse_record(raw(&record, 0), &vocab).unwrap_err();
        assert!(matches!(err, PipelineError::Vocabulary(_)));
    }
}
