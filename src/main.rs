use aeguard::{
    calibration::{self, binary_ground_truth, resolve_normal_class},
    data::Dataset,
    evaluation,
    training::TrainingHistory,
    AeGuard, Config,
};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the autoencoder on the normal-only training table.
    Train {
        #[arg(short, long, value_name = "DIR")]
        data_dir: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Score the test table with a trained checkpoint, calibrate the
    /// decision threshold and report classification metrics.
    Evaluate {
        #[arg(short, long, value_name = "DIR")]
        data_dir: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        model: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Full pipeline: load, train, score, calibrate, evaluate.
    Run {
        #[arg(short, long, value_name = "DIR")]
        data_dir: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(Config::default()),
    }
}

fn load_dataset(data_dir: &Path, config: &Config) -> Result<Dataset> {
    match Dataset::load(data_dir, &config.data)? {
        Some(dataset) => Ok(dataset),
        None => bail!(
            "required artifacts not found in {}; nothing was computed",
            data_dir.display()
        ),
    }
}

fn write_history(history: &TrainingHistory, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("history.json");
    std::fs::write(&path, serde_json::to_string_pretty(history)?)?;
    println!("Training history saved to {}", path.display());
    Ok(())
}

fn evaluate_with_model(
    guard: &AeGuard,
    dataset: &Dataset,
    output: Option<PathBuf>,
) -> Result<()> {
    let errors = guard.score(&dataset.test)?;

    let normal_code = resolve_normal_class(
        &dataset.encoder,
        guard.config().calibration.normal_class.as_deref(),
    )?;
    let truth = binary_ground_truth(&dataset.labels, normal_code);

    let threshold = calibration::calibrate(&errors, &truth)?;
    let report = evaluation::evaluate(&errors, threshold, &truth);
    report.print_report();

    if let Some(output_dir) = output {
        std::fs::create_dir_all(&output_dir)?;
        calibration::save_threshold(output_dir.join("threshold.json"), threshold)?;
        report.save_to_file(output_dir.join("report.json"))?;
        println!("Threshold and report saved to {}", output_dir.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data_dir,
            config,
            output,
        } => {
            let config = load_config(config)?;
            let dataset = load_dataset(&data_dir, &config)?;

            println!(
                "Training on {} normal records x {} features",
                dataset.train.num_rows(),
                dataset.input_dim()
            );
            let mut guard = AeGuard::new(dataset.input_dim(), config)?;
            let history = guard.train(&dataset.train)?;
            println!("Finished after {} epochs", history.len());

            if let Some(output_dir) = output {
                guard.model().save(&output_dir)?;
                write_history(&history, &output_dir)?;
            }

            Ok(())
        }

        Commands::Evaluate {
            data_dir,
            model,
            config,
            output,
        } => {
            let config = load_config(config)?;
            let dataset = load_dataset(&data_dir, &config)?;

            let guard = AeGuard::from_checkpoint(&model, config)?;
            println!("Scoring {} test records", dataset.test.num_rows());
            evaluate_with_model(&guard, &dataset, output)
        }

        Commands::Run {
            data_dir,
            config,
            output,
        } => {
            let config = load_config(config)?;
            let dataset = load_dataset(&data_dir, &config)?;

            println!(
                "Training on {} normal records x {} features",
                dataset.train.num_rows(),
                dataset.input_dim()
            );
            let mut guard = AeGuard::new(dataset.input_dim(), config)?;
            let history = guard.train(&dataset.train)?;
            println!("Finished after {} epochs", history.len());

            if let Some(output_dir) = &output {
                guard.model().save(output_dir)?;
                write_history(&history, output_dir)?;
            }

            println!("Scoring {} test records", dataset.test.num_rows());
            evaluate_with_model(&guard, &dataset, output)
        }
    }
}
