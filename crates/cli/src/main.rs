//! `odm-tool`: submit drone imagery to NodeODM, track the tasks, and
//! publish the results to the data lake.

mod config;
mod logging;
mod signal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use odm_ckan::CkanUploader;
use odm_core::TaskStatus;
use odm_events::Notifier;
use odm_nodeodm::{NodeOdmApi, ProcessingOptions, Quality};
use odm_pipeline::{ExitCode, ProcessArgs, ProcessingService, Processor};
use tokio_util::sync::CancellationToken;

use config::Settings;
use logging::LogLevel;

/// Upper bound on waiting for queued notifications at exit.
const DELIVERY_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "odm-tool")]
#[command(about = "Drone imagery processing with NodeODM", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(long, global = true, env = "ODM_TOOL_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Log level (RUST_LOG overrides it)
    #[arg(short, long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Subcommand)]
enum Command {
    /// Process a request directory
    Process(ProcessCommand),

    /// List tasks on the node
    List {
        /// Only tasks of this request directory
        #[arg(short, long)]
        request_path: Option<PathBuf>,

        /// Only tasks with this status (repeatable)
        #[arg(short, long = "status")]
        statuses: Vec<TaskStatus>,
    },

    /// Remove tasks from the node
    Cleanup {
        /// Only tasks of this request directory
        #[arg(short, long)]
        request_path: Option<PathBuf>,

        /// Only tasks with this status (repeatable)
        #[arg(short, long = "status")]
        statuses: Vec<TaskStatus>,

        /// Log what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct ProcessCommand {
    /// Request directory holding request.json and the image folders
    #[arg(short, long)]
    request_path: PathBuf,

    /// Validate without submitting anything
    #[arg(short, long)]
    dry_run: bool,

    /// Submit the original images
    #[arg(long, conflicts_with = "force_preprocess")]
    skip_preprocess: bool,

    /// Discard previous preprocessing output
    #[arg(long)]
    force_preprocess: bool,

    /// Keep one image out of N during preprocessing
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    frame_step: u32,

    /// Processing quality (defaults to the configured one)
    #[arg(long)]
    quality: Option<Quality>,

    /// Also produce a digital terrain model
    #[arg(long)]
    dtm: bool,
}

impl ProcessCommand {
    /// `resolution` is the dataset ground resolution in cm/px.
    fn into_args(self, default_quality: Quality, resolution: u32) -> ProcessArgs {
        ProcessArgs {
            request_path: self.request_path,
            dry_run: self.dry_run,
            skip_preprocess: self.skip_preprocess,
            force_preprocess: self.force_preprocess,
            frame_step: self.frame_step as usize,
            options: ProcessingOptions {
                quality: self.quality.unwrap_or(default_quality),
                dtm: self.dtm,
                orthophoto_resolution: Some(resolution),
                ..ProcessingOptions::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.log_level);

    match run(cli).await {
        Ok(code) => code.into(),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "odm-tool failed");
            ExitCode::Failure.into()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("loading configuration from '{}'", cli.config.display()))?;
    tracing::debug!(
        node = %settings.nodeodm.url(),
        ckan = %settings.ckan.url,
        notifications = settings.notifications.delivers(),
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    signal::spawn_handler(cancel.clone());

    let (notifier, delivery) =
        Notifier::start(&settings.notifications).context("starting notification delivery")?;
    let processor = Processor::new(
        NodeOdmApi::from_config(&settings.nodeodm),
        settings.nodeodm.clone(),
        notifier,
        Arc::new(CkanUploader::new(settings.ckan.clone())),
        cancel,
    );
    let service = ProcessingService::new(processor);

    let code = match cli.command {
        Command::Process(command) => {
            let args = command.into_args(settings.nodeodm.quality, settings.ckan.data.resolution);
            service.handle_request(&args).await
        }
        Command::List {
            request_path,
            statuses,
        } => service.list_tasks(request_path.as_deref(), &statuses).await,
        Command::Cleanup {
            request_path,
            statuses,
            dry_run,
        } => {
            service
                .cleanup_tasks(request_path.as_deref(), &statuses, dry_run)
                .await
        }
    };

    // Dropping the last notifier closes the bus; delivery drains and stops.
    drop(service);
    match tokio::time::timeout(DELIVERY_DRAIN_TIMEOUT, delivery).await {
        Ok(Ok(0)) => {}
        Ok(Ok(failed)) => tracing::warn!(failed, "Some status updates were not delivered"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Notification delivery task failed"),
        Err(_) => tracing::warn!("Timed out waiting for notification delivery"),
    }

    tracing::info!(exit_code = code.code(), "Done");
    Ok(code)
}
