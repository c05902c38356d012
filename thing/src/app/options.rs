//! Application configuration options

use std::time::Duration;

use crate::camera::{controller, snapshot};
use crate::hardware::params::CameraParameters;
use crate::storage::settings::{Settings, ThingSettings};
use crate::workers::capture;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Thing identity
    pub thing: ThingSettings,

    /// Initial camera parameters
    pub camera: CameraParameters,

    /// Camera controller options
    pub controller: controller::Options,

    /// Snapshot property options
    pub snapshot: snapshot::Options,

    /// Capture worker options
    pub capture_worker: capture::Options,

    /// Enable the Web Thing server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,
}

impl AppOptions {
    /// Runtime options from the settings file
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                scheduler_stop_timeout: Duration::from_secs(settings.shutdown_timeout_secs),
                ..Default::default()
            },
            thing: settings.thing.clone(),
            camera: settings.camera.parameters(),
            controller: controller::Options {
                warmup: Duration::from_secs(settings.camera.warmup_secs),
                ..Default::default()
            },
            snapshot: snapshot::Options {
                path: settings.capture.snapshot_path.clone(),
                history: settings.capture.event_history,
            },
            capture_worker: capture::Options {
                interval: Duration::from_secs(settings.capture.interval_secs),
            },
            enable_server: true,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            thing: ThingSettings::default(),
            camera: CameraParameters::default(),
            controller: controller::Options::default(),
            snapshot: snapshot::Options::default(),
            capture_worker: capture::Options::default(),
            enable_server: true,
            server: ServerOptions::default(),
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Bound on waiting for the capture loop to stop
    pub scheduler_stop_timeout: Duration,

    /// Bound on waiting for the server to drain connections
    pub server_stop_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            scheduler_stop_timeout: Duration::from_secs(30),
            server_stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Web Thing server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8900,
        }
    }
}
