use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_save_overlay::backend::HttpBackend;
use media_save_overlay::config::Config;
use media_save_overlay::dom::{parse_html, Page};
use media_save_overlay::notify::TracingNotifier;
use media_save_overlay::runtime::NullRuntime;
use media_save_overlay::{MediaSaver, ScanOutcome};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let mut args = std::env::args().skip(1);
    let snapshot = args
        .next()
        .map(PathBuf::from)
        .context("usage: media-save-overlay <page.html> [location] [--watch]")?;
    let rest: Vec<String> = args.collect();
    let watch = rest.iter().any(|a| a == "--watch");
    let location = rest
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "https://x.com/home".to_string());

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(backend_url = %config.backend_url, "Configuration loaded");

    let html = tokio::fs::read_to_string(&snapshot)
        .await
        .with_context(|| format!("Failed to read snapshot: {}", snapshot.display()))?;
    let page = Arc::new(Page::new(parse_html(&html, &location)));

    let backend = HttpBackend::new(&config).context("Failed to build backend client")?;
    let saver = MediaSaver::new(
        Arc::clone(&page),
        Arc::new(backend),
        Arc::new(NullRuntime),
        Arc::new(TracingNotifier),
        config,
    );

    match saver.scan_page().await {
        ScanOutcome::Completed(report) => info!(
            containers = report.containers,
            processed = report.processed,
            attached = report.attached,
            "Scan complete"
        ),
        ScanOutcome::AlreadyRunning => warn!("Scan already running"),
    }

    for (control, binding) in saver.controls().attached() {
        let state = saver.controls().state(control);
        info!(
            control = ?control,
            media = ?binding.media,
            kind = binding.kind.as_str(),
            identity = %binding.identity,
            state = ?state,
            "Control attached"
        );
    }

    if watch {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });
        info!("Watching for changes, press Ctrl+C to stop");
        saver.run(shutdown).await;
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,media_save_overlay=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {e}");
    }
    info!("Shutdown signal received");
}
