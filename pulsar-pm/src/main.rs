//! Production manager (pulsar-pm) - Main entry point
//!
//! Opens one project from the user's settings, serves the navigation API
//! and streams project snapshots to the UI over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pulsar_common::config::SettingsService;
use pulsar_common::events::EventBus;
use pulsar_common::fs::LocalFs;
use pulsar_pm::layout::{project_root, ProjectLayout};
use pulsar_pm::project::Project;
use pulsar_pm::resolver::ResolverDeps;
use pulsar_pm::software::SoftwareHub;
use pulsar_pm::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Command-line arguments for pulsar-pm
#[derive(Parser, Debug)]
#[command(name = "pulsar-pm")]
#[command(about = "Production manager service for Pulsar")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7846", env = "PULSAR_PORT")]
    port: u16,

    /// Settings file (defaults to ~/.pulsar.json)
    #[arg(short, long, env = "PULSAR_SETTINGS")]
    settings: Option<PathBuf>,

    /// Template copied when the settings file does not exist
    #[arg(
        short,
        long,
        env = "PULSAR_TEMPLATE",
        default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/resources/pulsar.json")
    )]
    template: PathBuf,

    /// Project to open, by name in the `projects` setting
    #[arg(long, env = "PULSAR_PROJECT")]
    project: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulsar_pm=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting Pulsar production manager v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        args.port
    );

    // Settings
    let settings = match args.settings {
        Some(path) => SettingsService::new(path, &args.template),
        None => SettingsService::for_current_user(&args.template)
            .context("Failed to locate the user settings file")?,
    };
    let settings = Arc::new(settings);
    let loaded = settings
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {}", settings.file_path().display()))?;
    info!("Settings: {}", settings.file_path().display());

    let capacity = match loaded.get("event_capacity").and_then(|v| v.as_u64()) {
        Some(capacity) if capacity > 0 => capacity as usize,
        Some(_) => {
            warn!("Ignoring event_capacity 0, using {}", DEFAULT_EVENT_CAPACITY);
            DEFAULT_EVENT_CAPACITY
        }
        None => DEFAULT_EVENT_CAPACITY,
    };
    let bus = EventBus::new(capacity);

    // Project
    let layout = ProjectLayout::from_settings(&loaded).context("Invalid project layout")?;
    let (name, root) =
        project_root(&loaded, args.project.as_deref()).context("Failed to resolve project")?;

    let hub = Arc::new(SoftwareHub::from_settings(&loaded, bus.clone()));
    let deps = ResolverDeps::new(Arc::new(LocalFs), hub.clone());
    let project = Arc::new(Project::open(name, root, &layout, deps, bus.clone()));
    project
        .get_data()
        .await
        .context("Failed to list the project root")?;

    let state = AppState::new(project, hub, settings, bus);
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
