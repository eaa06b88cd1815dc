//! Dosewatch batch jobs
//!
//! Cron-style entry points over the dosewatch database.
//!
//! Usage:
//!   dosewatch-jobs mark-missed
//!   dosewatch-jobs schedule-notifications [--prescription <id>]
//!   dosewatch-jobs send-notifications
//!   dosewatch-jobs detect-interactions --patient <id> [--classifier-url <url>]
//!
//! Every job exits 1 when any item failed, so the scheduler can alert.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dosewatch_classifier::InteractionClassifier;
use dosewatch_core::config::{self, Settings};
use dosewatch_core::models::{Channel, Notification};
use dosewatch_core::notify::{DeliveryError, DeliveryProvider};
use dosewatch_core::requests::ScheduleTarget;
use dosewatch_core::{CareService, Database};

#[derive(Parser)]
#[command(name = "dosewatch-jobs")]
#[command(version)]
#[command(about = "Medication adherence and notification jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(long, env = "DOSEWATCH_DB", default_value = "dosewatch.db")]
    db: PathBuf,

    /// JSON settings file
    #[arg(long, env = "DOSEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the batch size of the job being run
    #[arg(long, env = "DOSEWATCH_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Run as of this local time (YYYY-MM-DD HH:MM:SS) instead of now
    #[arg(long)]
    at: Option<String>,

    /// Ollama server for interaction classification (default: built-in rule table)
    #[arg(long, env = "DOSEWATCH_CLASSIFIER_URL")]
    classifier_url: Option<String>,

    /// Model the Ollama server should use
    #[arg(long, env = "DOSEWATCH_CLASSIFIER_MODEL", default_value = "medgemma")]
    classifier_model: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark stale pending doses as missed
    MarkMissed,

    /// Schedule reminders for all patients, or for one prescription
    ScheduleNotifications {
        #[arg(long)]
        prescription: Option<String>,
    },

    /// Send due notifications
    SendNotifications,

    /// Check a patient's active medications for interactions
    DetectInteractions {
        #[arg(long)]
        patient: String,
    },
}

/// Writes each delivered notification to stdout as one JSON line, for a
/// downstream push/WhatsApp relay.
struct JsonLinesDelivery {
    out: Mutex<io::Stdout>,
}

impl DeliveryProvider for JsonLinesDelivery {
    fn send(&self, notification: &Notification, channels: &[Channel]) -> Result<(), DeliveryError> {
        let line = serde_json::json!({
            "notification": notification,
            "channels": channels,
        });
        let mut out = self
            .out
            .lock()
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?;
        writeln!(out, "{line}").map_err(|e| DeliveryError::Unavailable(e.to_string()))
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_json_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(batch) = cli.batch_size {
        settings.sweep_batch_size = batch;
        settings.dispatch_batch_size = batch;
        settings.schedule_batch_size = batch;
    }
    settings.validate()?;
    Ok(settings)
}

#[cfg(feature = "ollama")]
fn llm_classifier(
    cli: &Cli,
    settings: &Settings,
) -> Result<Option<Arc<dyn InteractionClassifier>>> {
    use dosewatch_classifier::{LlmClassifier, OllamaBackend};

    let Some(url) = &cli.classifier_url else {
        return Ok(None);
    };
    let backend = OllamaBackend::new(url, &cli.classifier_model, settings.classifier_timeout())
        .with_context(|| format!("connecting classifier at {url}"))?;
    tracing::info!(url = %url, model = %cli.classifier_model, "using LLM interaction classifier");
    Ok(Some(Arc::new(LlmClassifier::new(backend).with_examples())))
}

#[cfg(not(feature = "ollama"))]
fn llm_classifier(
    cli: &Cli,
    _settings: &Settings,
) -> Result<Option<Arc<dyn InteractionClassifier>>> {
    match &cli.classifier_url {
        Some(_) => anyhow::bail!("--classifier-url needs a build with the `ollama` feature"),
        None => Ok(None),
    }
}

fn run_time(cli: &Cli) -> Result<NaiveDateTime> {
    match &cli.at {
        Some(raw) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("invalid --at '{raw}', expected YYYY-MM-DD HH:MM:SS")),
        None => Ok(chrono::Local::now().naive_local()),
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let now = run_time(&cli)?;
    let db = Database::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;
    tracing::debug!(version = config::APP_VERSION, db = %cli.db.display(), "dosewatch-jobs starting");

    let delivery = JsonLinesDelivery {
        out: Mutex::new(io::stdout()),
    };
    let mut service = CareService::new(&db, &settings).with_delivery(&delivery);
    if let Some(classifier) = llm_classifier(&cli, &settings)? {
        service = service.with_classifier(classifier);
    }

    let code = match &cli.command {
        Commands::MarkMissed => {
            let report = service.sweep_missed_doses(now, settings.sweep_batch_size)?;
            eprintln!(
                "examined={} updated={} failed={}",
                report.examined, report.updated, report.failed
            );
            report.exit_code()
        }
        Commands::ScheduleNotifications { prescription } => {
            let outcome = match prescription {
                Some(id) => service
                    .schedule_notifications(&ScheduleTarget::Prescription(id.clone()), now)?,
                None => service.schedule_all_notifications(now)?,
            };
            eprintln!(
                "scheduled={} skipped_existing={} suppressed={} failed={}",
                outcome.scheduled, outcome.skipped_existing, outcome.suppressed, outcome.failed
            );
            outcome.exit_code()
        }
        Commands::SendNotifications => {
            let report = service.dispatch_due_notifications(now)?;
            eprintln!(
                "sent={} failed={} expired={}",
                report.sent, report.failed, report.expired
            );
            report.exit_code()
        }
        Commands::DetectInteractions { patient } => {
            let report = service.detect_and_alert(patient, None, now)?;
            eprintln!(
                "evaluated={} discarded={} deferred={} alerts_created={} notifications_scheduled={}",
                report.pairs_evaluated,
                report.discarded,
                report.deferred,
                report.alerts_created,
                report.notifications_scheduled
            );
            // Deferred pairs need another run
            i32::from(report.deferred > 0)
        }
    };

    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
