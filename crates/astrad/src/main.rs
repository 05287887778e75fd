//! astrad: AstraGuard node daemon and CLI.
//!
//! Drives the anomaly-response pipeline from the command line: single-sample
//! ingest, batch replay, phase control, decision history, operator feedback
//! labelling, and a status probe whose exit code feeds fleet monitoring.

use astra_config::ServiceConfig;
use astra_proto::{FeedbackLabel, HistoryQuery, MissionPhase, TelemetrySample};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod service;

use service::Service;

#[derive(Parser)]
#[command(name = "astrad")]
#[command(about = "AstraGuard telemetry anomaly-response node")]
#[command(version)]
struct Cli {
    /// Path to the service config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one telemetry sample (JSON from file or stdin) and print the decision
    Ingest {
        /// Sample JSON file; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Replay a batch of telemetry samples (JSON array, max 1000) through the pipeline
    Replay {
        file: PathBuf,

        /// Print only the batch summary, not per-sample decisions
        #[arg(long)]
        summary: bool,
    },

    /// Report component health. Exit codes: 0 healthy, 1 failed, 2 degraded, 3 dependency missing
    Status,

    /// Show the current mission phase, or request a transition
    Phase {
        /// Target phase (LAUNCH, DEPLOYMENT, NOMINAL_OPS, PAYLOAD_OPS, SAFE_MODE)
        #[arg(long)]
        set: Option<String>,

        /// Force the transition even if it is not in the allowed set
        #[arg(long)]
        force: bool,
    },

    /// Replay samples and query the decision history
    History {
        /// Telemetry JSON array to feed through the pipeline first
        #[arg(long)]
        replay: Option<PathBuf>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        severity_min: Option<f64>,

        /// Print aggregate stats instead of individual decisions
        #[arg(long)]
        summary: bool,
    },

    /// Inspect and label feedback events
    Feedback {
        #[command(subcommand)]
        action: FeedbackCommands,
    },

    /// Write a starter config file
    InitConfig {
        /// Path to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FeedbackCommands {
    /// List feedback events awaiting an operator label
    Pending,
    /// Label one event: correct, insufficient, or wrong
    Label {
        fault_id: String,
        label: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".astraguard")
        .join("config.json")
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServiceConfig> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() {
        Ok(ServiceConfig::load(&path)?)
    } else {
        let state_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".astraguard");
        let mut config = ServiceConfig {
            results_dir: state_path.join("results"),
            feedback_path: state_path.join("feedback_pending.json"),
            state_path,
            ..ServiceConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(file: Option<&PathBuf>) -> anyhow::Result<T> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&content)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "astrad=info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Ingest { file } => {
            let sample: TelemetrySample = read_json(file.as_ref())?;
            let service = Service::init(config)?;
            let outcome = service.process_sample(sample).await?;
            print_json(&outcome)?;
        }

        Commands::Replay { file, summary } => {
            let samples: Vec<TelemetrySample> = read_json(Some(&file))?;
            let service = Service::init(config)?;
            let batch = service.process_batch(samples).await?;
            if summary {
                print_json(&serde_json::json!({
                    "total_processed": batch.total_processed,
                    "anomalies_detected": batch.anomalies_detected,
                }))?;
            } else {
                print_json(&batch)?;
            }
        }

        Commands::Status => {
            run_status(config).await?;
        }

        Commands::Phase { set, force } => {
            let service = Service::init(config)?;
            match set {
                Some(name) => {
                    let target = MissionPhase::parse(&name)?;
                    match service.state_machine.set_phase(target, force, "operator request") {
                        Ok(outcome) => print_json(&outcome)?,
                        Err(e) => {
                            eprintln!("{e}");
                            std::process::exit(1);
                        }
                    }
                }
                None => print_json(&service.state_machine.describe())?,
            }
        }

        Commands::History {
            replay,
            limit,
            severity_min,
            summary,
        } => {
            let service = Service::init(config)?;
            if let Some(file) = replay {
                let samples: Vec<TelemetrySample> = read_json(Some(&file))?;
                service.process_batch(samples).await?;
            }
            if summary {
                print_json(&service.handler.decision_stats())?;
            } else {
                let query = HistoryQuery {
                    limit,
                    severity_min,
                    ..Default::default()
                };
                print_json(&service.handler.query_history(&query)?)?;
            }
        }

        Commands::Feedback { action } => {
            let service = Service::init(config)?;
            match action {
                FeedbackCommands::Pending => {
                    print_json(&service.handler.feedback().pending())?;
                }
                FeedbackCommands::Label {
                    fault_id,
                    label,
                    notes,
                } => {
                    let label = parse_label(&label)?;
                    service.handler.feedback().label(&fault_id, label, notes)?;
                    println!("labelled {fault_id}");
                }
            }
        }

        Commands::InitConfig { output } => {
            let path = output.unwrap_or_else(default_config_path);
            config.save(&path)?;
            println!("Config written to {}", path.display());
            println!();
            println!("Edit the file to point at a model, then run:");
            println!("  astrad --config {} status", path.display());
        }
    }

    Ok(())
}

fn parse_label(raw: &str) -> anyhow::Result<FeedbackLabel> {
    match raw {
        "correct" => Ok(FeedbackLabel::Correct),
        "insufficient" => Ok(FeedbackLabel::Insufficient),
        "wrong" => Ok(FeedbackLabel::Wrong),
        other => anyhow::bail!("unknown label '{other}' (expected correct|insufficient|wrong)"),
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

async fn run_status(config: ServiceConfig) -> anyhow::Result<()> {
    // Exit 3: a configured model file that does not exist is a missing
    // dependency, reported before any component probing.
    if let Some(model_path) = &config.model_path
        && !model_path.exists()
    {
        eprintln!("dependency missing: model file {}", model_path.display());
        std::process::exit(3);
    }

    let service = Service::init(config)?;
    if service.config.model_path.is_some() {
        service.detector.load_model().await;
    }
    service.resources.sample();

    let status = service.status();
    print_json(&status)?;
    std::process::exit(astra_health::status_exit_code(status.overall));
}
