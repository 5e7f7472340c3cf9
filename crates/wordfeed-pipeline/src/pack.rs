use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use prost::Message;

use wordfeed_core::record::{FrameError, RecordWriter};
use wordfeed_core::schema::WordRecord;

use crate::error::PipelineError;
use crate::synth::{SynthItem, SynthSource};

/// Serializes one generated word into its on-disk record form: the image is
/// PNG-encoded, the labels/length/text come from the item, and `filename`
/// is carried verbatim (the packer assigns one, the synthetic source none).
pub fn encode_item(item: &SynthItem, filename: Option<String>) -> Result<Vec<u8>, PipelineError> {
    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(item.image.clone())
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|err| PipelineError::Internal(format!("png encode failed: {err}")))?;

    let record = WordRecord {
        image: Some(png.into_inner()),
        width: Some(i64::from(item.image.width())),
        labels: item.labels.iter().map(|&v| i64::from(v)).collect(),
        length: Some(item.labels.len() as i64),
        text: Some(item.text.clone()),
        filename,
    };
    Ok(record.encode_to_vec())
}

/// Writes the given payloads as one framed shard file.
pub fn write_shard(path: &Path, payloads: &[Vec<u8>]) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|err| PipelineError::io(path, err))?;
    let mut writer = RecordWriter::new(BufWriter::new(file));
    for payload in payloads {
        writer
            .write_record(payload)
            .map_err(|err| frame_to_io(path, err))?;
    }
    writer.flush().map_err(|err| frame_to_io(path, err))?;
    Ok(())
}

fn frame_to_io(path: &Path, err: FrameError) -> PipelineError {
    match err {
        FrameError::Io(source) => PipelineError::io(path, source),
        other => PipelineError::Internal(format!("shard write failed: {other}")),
    }
}

#[derive(Debug)]
pub struct PackReport {
    pub shards: Vec<PathBuf>,
    pub records: u64,
}

/// Drains `source` into `num_shards` framed shard files
/// (`words-000.rec`, `words-001.rec`, ...) under `out_dir`, assigning
/// records round robin so shard sizes stay within one record of each other.
pub fn pack_shards(
    out_dir: &Path,
    num_shards: usize,
    source: &SynthSource,
) -> Result<PackReport, PipelineError> {
    if num_shards == 0 {
        return Err(PipelineError::config("num_shards must be at least 1"));
    }
    std::fs::create_dir_all(out_dir).map_err(|err| PipelineError::io(out_dir, err))?;

    let mut shards = Vec::with_capacity(num_shards);
    let mut writers = Vec::with_capacity(num_shards);
    for i in 0..num_shards {
        let path = out_dir.join(format!("words-{i:03}.rec"));
        let file = File::create(&path).map_err(|err| PipelineError::io(&path, err))?;
        writers.push(RecordWriter::new(BufWriter::new(file)));
        shards.push(path);
    }

    let mut stream = source.stream();
    let mut records: u64 = 0;
    while let Some(item) = stream.next_item() {
        let payload = encode_item(&item, Some(format!("word-{records:06}.png")))?;
        let slot = (records % num_shards as u64) as usize;
        writers[slot]
            .write_record(&payload)
            .map_err(|err| frame_to_io(&shards[slot], err))?;
        records += 1;
    }
    for (writer, path) in writers.iter_mut().zip(&shards) {
        writer.flush().map_err(|err| frame_to_io(path, err))?;
    }

    tracing::info!(
        target: "wordfeed_proof",
        event = "packed",
        shards = shards.len(),
        records,
        out_dir = %out_dir.display(),
        "packed shards"
    );
    Ok(PackReport { shards, records })
}
