//! Pi Camera server
//!
//! Serves snapshots, saved photos and MJPEG streams from the configured
//! cameras.

use clap::Parser;
use pi_camera::{
    capture::{Camera, CameraFactory, FileConfig, MockCamera},
    device::{DeviceDescriptor, DeviceRegistry},
    manager::{CaptureManager, ManagerConfig},
    metrics::CaptureMetrics,
    server::{AppState, CameraServer, SensorGuard},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "pi-camera", version, about = "Camera snapshot and MJPEG server")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Root that a relative photo directory is resolved against
    #[arg(long, env = "GARDYN_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// Photo directory, absolute or relative to the project root
    #[arg(long, env = "CAMERA_PHOTOS_DIR")]
    photos_dir: Option<String>,

    /// Serve synthetic frames instead of opening camera hardware
    #[arg(long)]
    mock: bool,
}

#[cfg(feature = "camera")]
fn hardware_factory() -> Option<Arc<dyn CameraFactory>> {
    Some(Arc::new(|descriptor: &DeviceDescriptor| {
        Box::new(pi_camera::capture::NokhwaCamera::new(descriptor)) as Box<dyn Camera>
    }))
}

#[cfg(not(feature = "camera"))]
fn hardware_factory() -> Option<Arc<dyn CameraFactory>> {
    warn!("Built without the `camera` feature, serving mock frames");
    None
}

fn camera_factory(mock: bool) -> Arc<dyn CameraFactory> {
    if !mock {
        if let Some(factory) = hardware_factory() {
            return factory;
        }
    }
    Arc::new(|_: &DeviceDescriptor| Box::new(MockCamera::new()) as Box<dyn Camera>)
}

fn load_config(cli: &Cli) -> Result<FileConfig, String> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path).map_err(|e| e.to_string())?,
        None => FileConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(root) = &cli.project_root {
        config.server.project_root = root.clone();
    } else if config.server.project_root.as_os_str() == "." {
        if let Ok(cwd) = std::env::current_dir() {
            config.server.project_root = cwd;
        }
    }
    if let Some(dir) = &cli.photos_dir {
        config.server.photos_dir = dir.clone();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Pi Camera v{}", pi_camera::VERSION);

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let metrics = match CaptureMetrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };

    let registry = DeviceRegistry::new(&config.devices);
    for device in registry.list_devices() {
        info!(id = device.id, path = %device.path, name = %device.name, "Configured camera");
    }

    let manager = CaptureManager::new(
        registry,
        camera_factory(cli.mock),
        ManagerConfig {
            capture: config.capture.clone(),
            stream: config.stream.clone(),
        },
    )
    .with_metrics(Arc::clone(&metrics));

    let photos_dir = config.server.resolve_photos_dir();
    info!(dir = %photos_dir.display(), "Photo directory");

    let guard = SensorGuard::new("Camera", config.server.enabled);
    if !guard.is_enabled() {
        warn!("Camera sensor disabled in configuration");
    }

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }
    let shutdown = async move {
        let _ = shutdown_rx.changed().await;
        info!("Shutdown requested");
    };

    let state = AppState::new(manager, metrics, photos_dir, guard);
    let server = CameraServer::new(config.server.bind_addr, state);
    if let Err(e) = server.run(shutdown).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
