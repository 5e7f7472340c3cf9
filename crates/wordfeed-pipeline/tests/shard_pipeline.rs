use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use image::{GrayImage, Luma};

use wordfeed_core::vocab::Vocabulary;
use wordfeed_pipeline::config::PipelineConfig;
use wordfeed_pipeline::pack::{encode_item, write_shard};
use wordfeed_pipeline::pipeline::Pipeline;
use wordfeed_pipeline::synth::SynthItem;

fn temp_dir(test_name: &str) -> Result<PathBuf> {
    let mut root = std::env::temp_dir();
    root.push(format!(
        "wordfeed-pipeline-{test_name}-{}-{}",
        std::process::id(),
        wordfeed_observe::time::unix_time_ms()
    ));
    std::fs::create_dir_all(&root)?;
    Ok(root)
}

fn word_payload(vocab: &Vocabulary, text: &str, width: u32) -> Result<Vec<u8>> {
    let labels = vocab.encode_text(text)?;
    let image = GrayImage::from_fn(width, 31, |x, y| Luma([(x + 7 * y) as u8]));
    let item = SynthItem {
        image,
        text: text.to_string(),
        labels,
    };
    Ok(encode_item(&item, Some(format!("{text}.png")))?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn three_widths_land_in_three_singleton_batches() -> Result<()> {
    let root = temp_dir("three-widths")?;
    let vocab = Arc::new(Vocabulary::ascii_alphanumeric());
    for (i, (text, width)) in [("aa", 30u32), ("bb", 90), ("cc", 200)].iter().enumerate() {
        write_shard(
            &root.join(format!("words-{i:03}.rec")),
            &[word_payload(&vocab, text, *width)?],
        )?;
    }

    let config = PipelineConfig {
        batch_size: 1,
        num_workers: 2,
        num_epochs: Some(1),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config, Arc::clone(&vocab))?;
    let (mut stream, handle) = pipeline.spawn(&root, "words-*");

    let mut widths = BTreeSet::new();
    while let Some(batch) = stream.recv().await {
        assert_eq!(batch.len(), 1);
        // Singleton batches are padded exactly to their one member.
        assert_eq!(batch.padded_width(), batch.widths[0] as usize);
        assert_eq!(batch.height(), 32);

        let rows = batch.labels.rows()?;
        assert_eq!(vocab.decode_indices(&rows[0])?, batch.texts[0]);
        assert!(batch.filenames[0].is_some());
        widths.insert(batch.widths[0]);
    }
    handle.await??;

    assert_eq!(widths, BTreeSet::from([30, 90, 200]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_record_is_lost_or_duplicated() -> Result<()> {
    let root = temp_dir("no-loss")?;
    let vocab = Arc::new(Vocabulary::ascii_alphanumeric());

    let texts: Vec<String> = (0..10).map(|i| format!("word{i}")).collect();
    let mut payloads = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        payloads.push(word_payload(&vocab, text, 40 + i as u32)?);
    }
    write_shard(&root.join("words-000.rec"), &payloads)?;

    let config = PipelineConfig {
        batch_size: 3,
        num_workers: 2,
        boundaries: vec![32, 64],
        num_epochs: Some(1),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config, Arc::clone(&vocab))?;
    let metrics = pipeline.metrics();
    let (mut stream, handle) = pipeline.spawn(&root, "words-*");

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    while let Some(batch) = stream.recv().await {
        sizes.push(batch.len());
        for (text, length) in batch.texts.iter().zip(&batch.lengths) {
            assert_eq!(*length as usize, text.len());
            seen.push(text.clone());
        }
    }
    handle.await??;

    seen.sort();
    let mut expected = texts.clone();
    expected.sort();
    assert_eq!(seen, expected);

    // All ten share the [32,64) bucket: three full batches plus a flush.
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 3, 3, 3]);
    assert_eq!(metrics.records_read_total.get(), 10);
    assert_eq!(metrics.batches_emitted_total.get(), 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn narrow_examples_are_filtered_and_counted() -> Result<()> {
    let root = temp_dir("filtered")?;
    let vocab = Arc::new(Vocabulary::ascii_alphanumeric());
    write_shard(
        &root.join("words-000.rec"),
        &[
            word_payload(&vocab, "tiny", 15)?,
            word_payload(&vocab, "fits", 30)?,
        ],
    )?;

    let config = PipelineConfig {
        batch_size: 1,
        num_workers: 1,
        minimum_width: Some(20),
        num_epochs: Some(1),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config, Arc::clone(&vocab))?;
    let metrics = pipeline.metrics();
    let (mut stream, handle) = pipeline.spawn(&root, "words-*");

    let mut texts = Vec::new();
    while let Some(batch) = stream.recv().await {
        texts.extend(batch.texts);
    }
    handle.await??;

    assert_eq!(texts, vec!["fits".to_string()]);
    assert_eq!(metrics.examples_filtered_total.get(), 1);
    assert_eq!(metrics.examples_parsed_total.get(), 2);
    Ok(())
}
