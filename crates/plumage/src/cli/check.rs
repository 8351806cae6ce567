//! The `plumage check` command: verify a dataset before training.

use std::path::Path;

use clap::Args;

use super::DatasetArgs;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

/// Execute the check command.
pub fn execute(args: CheckArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    args.dataset.apply(&mut config);
    config.validate()?;

    let provider = super::open_provider(&config)?;
    let start = std::time::Instant::now();
    let summary = provider.verify()?;

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("            Dataset check");
    eprintln!("  ====================================");
    eprintln!("    Classes:      {:>8}", summary.classes);
    eprintln!("    Images:       {:>8}", summary.images);
    eprintln!("    Descriptions: {:>8}", summary.descriptions);
    eprintln!("  ------------------------------------");
    eprintln!("    Vocabulary:   {:>8}", provider.vocabulary().len());
    eprintln!("    Duration:     {:>7.1}s", start.elapsed().as_secs_f64());
    eprintln!("  ====================================");

    Ok(())
}
