use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ecovision::adapters::{
    emissions::estimator::PowerEstimateTracker,
    http::{router, state::HttpState},
    onnx::{detector::OnnxDetector, model_catalog::FsWeightsCatalog},
    tracking::tracker_for_uri,
    training::ultralytics::UltralyticsCliTrainer,
};
use ecovision::application::{
    layout::check_layout,
    ports::WeightsCatalogPort,
    services::{DetectionService, RunLabels, TrainingService},
};
use ecovision::config::AppConfig;
use ecovision::domain::model::{Device, ModelId};

/// EcoVision: waste detection service and fine-tuning runner.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to $ECOVISION_CONFIG, then built-ins)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the detection API
    Serve {
        /// Listen address, e.g. 0.0.0.0:8000
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Run one tracked fine-tuning of the detector
    Train {
        #[arg(long)]
        epochs: Option<u32>,
        #[arg(long)]
        batch: Option<u32>,
        #[arg(long)]
        imgsz: Option<u32>,
        #[arg(long)]
        patience: Option<u32>,
        /// Training device, e.g. cpu
        #[arg(long)]
        device: Option<Device>,
        #[arg(long, value_name = "NAME")]
        run_name: Option<String>,
        /// Tracking store path or MLflow server URL
        #[arg(long, value_name = "URI")]
        tracking_uri: Option<String>,
    },
    /// Report which expected project files and directories are present
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { listen } => {
            if let Some(addr) = listen {
                config.server.listen_addr = addr;
            }
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Train { epochs, batch, imgsz, patience, device, run_name, tracking_uri } => {
            let params = &mut config.training.params;
            if let Some(v) = epochs { params.epochs = v; }
            if let Some(v) = batch { params.batch = v; }
            if let Some(v) = imgsz { params.imgsz = v; }
            if let Some(v) = patience { params.patience = v; }
            if let Some(v) = device { params.device = v; }
            if let Some(v) = run_name { config.training.run_name = v; }
            if let Some(v) = tracking_uri { config.tracking.uri = v; }
            train(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => Ok(check(config).await),
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    tracing::info!("Resolving model weights...");

    // 1. Model: fatal if no candidate exists, the service never starts without one.
    let weights = FsWeightsCatalog::new()
        .resolve(&config.weights_candidates())
        .await?;
    let detector = OnnxDetector::load(&weights, config.inference.intra_threads)?;

    // 2. Use case, built once and shared read-only by every request.
    let model = ModelId {
        name: weights
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".into()),
        path: weights.clone(),
    };
    let detection = DetectionService::new(
        Arc::new(detector),
        model,
        config.inference.params.clone(),
        config.inference.classes.clone(),
    );

    // 3. HTTP state and router
    let state = HttpState {
        detection: Arc::new(detection),
        upload: Arc::new(config.server.upload.clone()),
    };
    let app = router(state);

    // 4. Serve until ctrl-c
    let addr = &config.server.listen_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, weights = %weights.display(), "EcoVision API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn train(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    tracing::info!(base_dir = %config.base_dir.display(), "training run");

    // 1. Adapters: run tracker, trainer process, emissions estimator
    let tracker = tracker_for_uri(&config.tracking.uri, &config.base_dir)?;
    let service = TrainingService::new(
        Arc::new(UltralyticsCliTrainer::new(config.training.trainer_program.clone())),
        Arc::new(PowerEstimateTracker::new(
            config.emissions.power_watts,
            config.emissions.carbon_intensity_kg_per_kwh,
            config.emissions_output_dir(),
        )),
        tracker,
        RunLabels {
            experiment: config.training.experiment.clone(),
            run_name: config.training.tracking_run_name.clone(),
            tracker_project: config.emissions.project_name.clone(),
        },
    );

    // 2. One tracked run
    let request = config.training_request();
    let run = service.run(&request).await.context("training run failed")?;

    tracing::info!(
        run_id = %run.run_id,
        emissions_kg = %format!("{:.6}", run.emissions_kg),
        map50 = run.metrics.map50,
        map50_95 = run.metrics.map50_95,
        params = run.parameters.len(),
        "fine-tuning finished"
    );
    match &run.artifact_path {
        Some(path) => tracing::info!(model = %path.display(), "model saved"),
        None => tracing::warn!(expected = %request.best_weights().display(), "no trained weights produced"),
    }
    tracing::info!("see results with: {}", service.tracker_location());
    Ok(())
}

async fn check(config: AppConfig) -> ExitCode {
    let report = check_layout(config.expected_layout());
    for entry in &report.entries {
        println!("{entry}");
    }

    let weights = FsWeightsCatalog::new()
        .resolve(&config.weights_candidates())
        .await;
    match &weights {
        Ok(path) => println!("[     ok] inference weights: {}", path.display()),
        Err(e) => println!("[MISSING] inference weights: {e}"),
    }

    if report.all_present() && weights.is_ok() {
        println!("All expected files and directories are present.");
        ExitCode::SUCCESS
    } else {
        println!("Some files or directories are missing.");
        ExitCode::FAILURE
    }
}
