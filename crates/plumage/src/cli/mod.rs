//! Command handlers and the plumbing they share.

pub mod check;
pub mod config;
pub mod sample;
pub mod train;

use std::path::{Path, PathBuf};

use clap::Args;
use plumage_core::{Config, SampleProvider, Vocabulary};

/// Load the config file given with `--config`, or the default one.
///
/// A missing default file yields defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Ok(match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    })
}

/// Dataset flags shared by every command that samples batches.
#[derive(Args, Debug, Default)]
pub struct DatasetArgs {
    /// Dataset root (overrides dataset.root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Descriptions drawn per class, 1-10 (overrides dataset.descriptions_per_class)
    #[arg(short = 'n', long)]
    pub descriptions: Option<usize>,

    /// Sampling seed (overrides dataset.seed)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl DatasetArgs {
    /// Apply the flags on top of a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.dataset.root = PathBuf::from(shellexpand::tilde(&root.to_string_lossy()).as_ref());
        }
        if let Some(n) = self.descriptions {
            config.dataset.descriptions_per_class = n;
        }
        if let Some(seed) = self.seed {
            config.dataset.seed = Some(seed);
        }
    }
}

/// Load the vocabulary and open the dataset a config points at.
pub fn open_provider(config: &Config) -> anyhow::Result<SampleProvider> {
    let vocabulary = Vocabulary::from_config(
        config.vocabulary.level,
        config.vocabulary_path().as_deref(),
    )?;
    let provider = SampleProvider::open(&config.dataset, &config.dataset_root(), vocabulary)?;
    Ok(provider)
}
