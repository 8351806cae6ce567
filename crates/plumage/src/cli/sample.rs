//! The `plumage sample` command: draw batches and print them as JSON.

use std::path::Path;

use clap::Args;
use ndarray::Axis;
use plumage_core::{Batch, ClassCatalog, Vocabulary};
use serde::Serialize;

use super::DatasetArgs;

/// Arguments for the `sample` command.
#[derive(Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Number of batches to draw
    #[arg(short, long, default_value = "1")]
    pub batches: usize,
}

/// Printable view of one batch.
#[derive(Debug, Serialize)]
struct BatchReport {
    image_shape: Vec<usize>,
    text_shape: Vec<usize>,
    rows: Vec<RowReport>,
}

#[derive(Debug, Serialize)]
struct RowReport {
    label: i64,
    class_id: String,
    descriptions: Vec<String>,
}

/// Execute the sample command.
pub fn execute(args: SampleArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    args.dataset.apply(&mut config);
    config.validate()?;

    let mut provider = super::open_provider(&config)?;
    let n = config.dataset.descriptions_per_class;
    for _ in 0..args.batches {
        let batch = provider.get_next_batch(n)?;
        let report = describe(&batch, provider.catalog(), provider.vocabulary())?;
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

fn describe(
    batch: &Batch,
    catalog: &ClassCatalog,
    vocabulary: &Vocabulary,
) -> anyhow::Result<BatchReport> {
    let texts = batch.flat_texts()?;
    let n = batch.descriptions_per_class;

    let rows = batch
        .labels
        .iter()
        .enumerate()
        .map(|(row, &label)| RowReport {
            label,
            class_id: catalog
                .entries()
                .iter()
                .find(|entry| entry.label == label)
                .map(|entry| entry.id.clone())
                .unwrap_or_default(),
            descriptions: (row * n..(row + 1) * n)
                .map(|i| vocabulary.decode_text(texts.index_axis(Axis(0), i)))
                .collect(),
        })
        .collect();

    Ok(BatchReport {
        image_shape: batch.images.shape().to_vec(),
        text_shape: batch.texts.shape().to_vec(),
        rows,
    })
}
