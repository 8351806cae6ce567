//! The `plumage train` command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use plumage_core::backend::default_device;
use plumage_core::{adam, CharCnnRnn, Config, OnnxImageEncoder, RunSummary, Trainer, TrainingBackend};

use super::DatasetArgs;

/// Arguments for the `train` command.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Number of gradient steps (overrides training.iterations)
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Adam learning rate (overrides training.learning_rate)
    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// ONNX image feature extractor (overrides image_encoder.model)
    #[arg(long)]
    pub image_model: Option<PathBuf>,

    /// Where to save the trained text encoder (overrides training.output)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Resume from a saved text encoder instead of initializing a new one
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Run the recurrent layers in both directions
    #[arg(long)]
    pub bidir: bool,
}

impl TrainArgs {
    fn apply(&self, config: &mut Config) {
        self.dataset.apply(config);
        if let Some(iterations) = self.iterations {
            config.training.iterations = iterations;
        }
        if let Some(rate) = self.learning_rate {
            config.training.learning_rate = rate;
        }
        if let Some(model) = &self.image_model {
            config.image_encoder.model = model.clone();
        }
        if let Some(output) = &self.output {
            config.training.output = Some(output.clone());
        }
        if self.bidir {
            config.text_encoder.rnn_bidir = true;
        }
    }
}

/// Execute the train command.
pub fn execute(args: TrainArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let provider = super::open_provider(&config)?;
    let image_encoder = OnnxImageEncoder::load(
        &config.image_model_path(),
        config.image_encoder.output.as_deref(),
    )?;

    let device = default_device();
    let text_encoder = match &args.resume {
        Some(path) => {
            let hash = provider.vocabulary().content_hash();
            let encoder = CharCnnRnn::<TrainingBackend>::load(path, Some(hash.as_str()), &device)?;
            tracing::info!("Resuming from {:?}", path);
            encoder
        }
        None => CharCnnRnn::<TrainingBackend>::from_config(
            &config.text_encoder,
            provider.vocabulary().len(),
            &device,
        )?,
    };
    tracing::info!(
        "Text encoder: {} parameters, {}-dimensional embeddings",
        text_encoder.parameter_count(),
        text_encoder.embedding_dim()
    );

    let iterations = config.training.iterations;
    let n = config.dataset.descriptions_per_class;
    let mut trainer = Trainer::new(
        provider,
        image_encoder,
        text_encoder,
        adam(),
        config.training.learning_rate,
    );

    let progress = create_progress_bar(iterations as u64);
    let start = Instant::now();
    let summary = trainer.run(iterations, n, |step| {
        progress.inc(1);
        progress.set_message(format!("loss {:.4}", step.loss));
    });
    progress.finish_and_clear();
    let summary = summary?;

    if let Some(output) = config.output_path() {
        trainer.save_text_encoder(&output)?;
        println!("Text encoder saved to: {}", output.display());
    }

    print_summary(&summary, n, start.elapsed());
    Ok(())
}

/// Create a progress bar over training steps.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after training.
fn print_summary(summary: &RunSummary, descriptions_per_class: usize, elapsed: std::time::Duration) {
    let rate = if elapsed.as_secs_f64() > 0.0 {
        summary.steps as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("            Training summary");
    eprintln!("  ====================================");
    eprintln!("    Steps:        {:>8}", summary.steps);
    eprintln!("    Descriptions: {:>8} per class", descriptions_per_class);
    eprintln!("    Mean loss:    {:>8.4}", summary.mean_loss);
    eprintln!("    Last loss:    {:>8.4}", summary.last_loss);
    eprintln!("  ------------------------------------");
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} steps/sec", rate);
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_args_override_config() {
        let mut config = Config::default();
        let args = TrainArgs {
            iterations: Some(10),
            learning_rate: Some(0.01),
            image_model: Some(PathBuf::from("/models/features.onnx")),
            output: Some(PathBuf::from("out/encoder.json")),
            bidir: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.training.iterations, 10);
        assert!((config.training.learning_rate - 0.01).abs() < f32::EPSILON);
        assert_eq!(config.image_encoder.model, PathBuf::from("/models/features.onnx"));
        assert_eq!(config.output_path(), Some(PathBuf::from("out/encoder.json")));
        assert!(config.text_encoder.rnn_bidir);
        assert_eq!(config.text_encoder.rnn_hidden_size(), 512);
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let mut config = Config::default();
        let args = TrainArgs {
            learning_rate: Some(0.0),
            ..Default::default()
        };
        args.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
