// Nudge - continuously retrained productivity model
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use nudge::config::{load_config, Config};
use nudge::daemon::cancel_on_shutdown_signal;
use nudge::dataset::{CsvDatasetSource, DatasetSource};
use nudge::inference::Predictor;
use nudge::models::{accuracy_rating, Architecture, MlpTrainer, ModelStore, ModelTrainer, TrainingConfig};
use nudge::server::{InferenceClient, InferenceServer, PredictionRequest};
use nudge::training::{validate_current, RetrainSupervisor};

#[derive(Parser)]
#[command(name = "nudge", version, about = "Productivity model trainer and inference daemon")]
struct Cli {
    /// Configuration file (defaults to ~/.nudge/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the activity log and retrain when enough new rows arrive
    Trainer {
        /// Activity log to watch
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// New rows required before retraining
        #[arg(long)]
        min_new_samples: Option<u64>,
        /// Rows required before the first training
        #[arg(long)]
        min_total_samples: Option<u64>,
        /// Seconds between checks
        #[arg(long)]
        check_interval: Option<u64>,
        #[arg(long, value_enum)]
        architecture: Option<Architecture>,
    },

    /// Serve predictions over TCP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },

    /// Send one request to a running server and print the reply
    Predict {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, default_value_t = 12345, allow_negative_numbers = true)]
        foreground_app: i64,
        #[arg(long, default_value_t = 1000)]
        idle_time: i64,
        #[arg(long, default_value_t = 30000)]
        time_last_request: i64,
        #[arg(long)]
        keyboard_activity: Option<i64>,
        #[arg(long)]
        mouse_activity: Option<i64>,
    },

    /// Train once from a CSV file and write the model store
    Train {
        /// Labeled activity log
        csv: PathBuf,
        #[arg(long)]
        model_dir: Option<PathBuf>,
        #[arg(long, value_enum)]
        architecture: Option<Architecture>,
        /// Upper bound on training epochs
        #[arg(long)]
        epochs: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    nudge::logging::init(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Trainer {
            csv,
            model_dir,
            min_new_samples,
            min_total_samples,
            check_interval,
            architecture,
        } => {
            let trainer = &mut config.trainer;
            if let Some(csv) = csv {
                trainer.csv_path = csv;
            }
            if let Some(dir) = model_dir {
                trainer.model_dir = dir;
            }
            if let Some(n) = min_new_samples {
                trainer.min_new_samples = n;
            }
            if let Some(n) = min_total_samples {
                trainer.min_total_samples = n;
            }
            if let Some(secs) = check_interval {
                trainer.check_interval_secs = secs;
            }
            if let Some(arch) = architecture {
                trainer.architecture = arch;
            }
            config.validate()?;
            run_trainer(config).await
        }
        Commands::Serve {
            host,
            port,
            model_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = model_dir {
                config.server.model_dir = dir;
            }
            config.validate()?;
            run_server(config).await
        }
        Commands::Predict {
            host,
            port,
            foreground_app,
            idle_time,
            time_last_request,
            keyboard_activity,
            mouse_activity,
        } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            let request = PredictionRequest {
                keyboard_activity,
                mouse_activity,
                ..PredictionRequest::new(foreground_app, idle_time, time_last_request)
            };
            run_predict(format!("{}:{}", host, port), request).await
        }
        Commands::Train {
            csv,
            model_dir,
            architecture,
            epochs,
        } => {
            let model_dir = model_dir.unwrap_or(config.trainer.model_dir);
            let mut training = TrainingConfig::new(architecture.unwrap_or(config.trainer.architecture));
            if let Some(epochs) = epochs {
                training.max_epochs = epochs;
            }
            tokio::task::spawn_blocking(move || run_train(csv, model_dir, training))
                .await
                .context("Training task panicked")?
        }
    }
}

async fn run_trainer(config: Config) -> Result<()> {
    let dataset: Arc<dyn DatasetSource> = Arc::new(CsvDatasetSource::new(&config.trainer.csv_path));
    let supervisor = RetrainSupervisor::new(&config.trainer, dataset, Arc::new(MlpTrainer))?;

    let cancel = CancellationToken::new();
    cancel_on_shutdown_signal(cancel.clone());

    let state = supervisor.run(cancel).await?;
    info!(total_trainings = state.training_count, "Trainer stopped");
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let predictor = Predictor::load(&config.server.model_dir);
    let server = InferenceServer::bind(&config.server, predictor).await?;

    let cancel = CancellationToken::new();
    cancel_on_shutdown_signal(cancel.clone());

    server.run(cancel).await?;
    Ok(())
}

async fn run_predict(address: String, request: PredictionRequest) -> Result<()> {
    let client = InferenceClient::new(address);
    let response = client
        .predict(&request)
        .await
        .with_context(|| format!("Is `nudge serve` running on {}?", client.address()))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_train(csv: PathBuf, model_dir: PathBuf, training: TrainingConfig) -> Result<()> {
    let source = CsvDatasetSource::new(&csv);
    if !source.exists() {
        anyhow::bail!("Activity log not found: {}", csv.display());
    }
    let dataset = source.read_all()?;
    let (productive, unproductive) = dataset.class_counts();
    println!(
        "Loaded {} examples ({} productive, {} not productive) from {}",
        dataset.len(),
        productive,
        unproductive,
        csv.display()
    );

    let trained = MlpTrainer.train(&dataset, &training)?;

    let store = ModelStore::new(&model_dir);
    store.ensure_dir()?;
    store.write_current(&trained)?;
    validate_current(&store).context("Freshly written model failed validation")?;

    println!("Model saved to {}", store.model_path().display());
    println!("Scaler saved to {}", store.scaler_path().display());
    println!(
        "Test accuracy: {:.1}% ({})",
        trained.accuracy * 100.0,
        accuracy_rating(trained.accuracy)
    );
    Ok(())
}
