mod artifacts;
mod config;
mod error;
mod fleet;
mod models;
mod render;
mod session;
mod utils;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artifacts::ArtifactStore;
use config::Config;
use fleet::FleetOrchestrator;
use models::{InfraModel, RunMetrics};
use render::Renderer;
use session::{OutputChecker, SshConnector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_push=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Starting ForgeConfig push");
    tracing::info!("Model: {}", cfg.model_path);
    tracing::info!("Templates Dir: {}", cfg.templates_dir);
    tracing::info!("Configs Dir: {}", cfg.configs_dir);
    tracing::info!("Mode: {:?}", cfg.run_mode);

    // SSH calls block, so the whole pipeline runs on the blocking pool
    let metrics = tokio::task::spawn_blocking(move || run(&cfg))
        .await
        .context("Push task terminated abnormally")??;

    let Some(metrics) = metrics else {
        return Ok(());
    };

    for report in &metrics.devices {
        tracing::info!(
            "{} ({}): {:?} after {} artifacts in {}",
            report.hostname,
            report.host,
            report.outcome,
            report.artifacts_sent,
            utils::format_duration(report.elapsed)
        );
    }
    tracing::info!(
        "Run {} took {} ({} spent inside device turns)",
        metrics.run_id,
        utils::format_duration(metrics.total_elapsed),
        utils::format_duration(metrics.sum_device_elapsed())
    );
    tracing::debug!("Run metrics: {}", serde_json::to_string(&metrics)?);

    if !metrics.all_saved() {
        anyhow::bail!(
            "{} of {} devices were not configured and saved",
            metrics.devices.len() - metrics.saved_count(),
            metrics.devices.len()
        );
    }

    tracing::info!("All {} devices configured and saved", metrics.saved_count());
    Ok(())
}

/// Render and/or push according to the configured run mode
fn run(cfg: &Config) -> anyhow::Result<Option<RunMetrics>> {
    let model = InfraModel::load(&cfg.model_path)
        .with_context(|| format!("Failed to load model {}", cfg.model_path))?;
    tracing::info!("Loaded model with {} devices", model.devices.len());
    tracing::debug!("Model: {}", serde_json::to_string_pretty(&model)?);

    let store = if cfg.run_mode.renders() {
        let renderer = Renderer::from_dir(&cfg.templates_dir)?;
        let mut store = ArtifactStore::new(&cfg.configs_dir, &cfg.artifact_extension)?;
        let count = render::render_all(&model, &renderer, &mut store)?;
        tracing::info!("Rendered {} config files into {}", count, store.dir().display());
        store
    } else {
        ArtifactStore::scan(&cfg.configs_dir, &cfg.artifact_extension, model.hostnames())?
    };

    tracing::info!("{} config files assigned to devices", store.len());
    tracing::info!("Available config files:");
    for name in store.list()? {
        tracing::info!("  {}", name);
    }

    if !cfg.run_mode.pushes() {
        return Ok(None);
    }

    let checker = match &cfg.error_patterns_file {
        Some(path) => OutputChecker::from_file(path)?,
        None => OutputChecker::default(),
    };
    let connector = SshConnector::new(cfg.ssh_timeout(), cfg.command_idle());
    let orchestrator = FleetOrchestrator::new(connector, checker, cfg.on_connect_error);

    Ok(Some(orchestrator.run_fleet(&model, &store)))
}
