//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ThingError;
use crate::hardware::params::{CameraParameters, ExposureMode, Framerate, Resolution};
use crate::hardware::CameraBackend;
use crate::logs::LogLevel;

/// Thing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log output configuration
    #[serde(default)]
    pub log: LogSettings,

    /// Web Thing server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Thing identity
    #[serde(default)]
    pub thing: ThingSettings,

    /// Camera configuration
    #[serde(default)]
    pub camera: CameraSettings,

    /// Capture loop configuration
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Seconds to wait for the capture loop to stop on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log: LogSettings::default(),
            server: ServerSettings::default(),
            thing: ThingSettings::default(),
            camera: CameraSettings::default(),
            capture: CaptureSettings::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Settings {
    /// Reject values that deserialize fine but cannot run
    pub fn validate(&self) -> Result<(), ThingError> {
        if self.capture.interval_secs == 0 {
            return Err(ThingError::ConfigError(
                "capture.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Write logs to stdout
    #[serde(default = "default_true")]
    pub stdout: bool,

    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,

    /// Also write daily-rotated log files into this directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            stdout: true,
            json: false,
            dir: None,
        }
    }
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8900
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Identity published in the thing description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingSettings {
    #[serde(default = "default_thing_id")]
    pub id: String,

    #[serde(default = "default_thing_title")]
    pub title: String,

    #[serde(default = "default_thing_description")]
    pub description: String,
}

fn default_thing_id() -> String {
    "urn:dev:ops:my-picam-thing-1234".to_string()
}

fn default_thing_title() -> String {
    "My PiCamera Thing".to_string()
}

fn default_thing_description() -> String {
    "A web connected Pi Camera".to_string()
}

impl Default for ThingSettings {
    fn default() -> Self {
        Self {
            id: default_thing_id(),
            title: default_thing_title(),
            description: default_thing_description(),
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Device implementation
    #[serde(default)]
    pub backend: CameraBackend,

    /// Device node for the V4L2 backend
    #[serde(default = "default_camera_device")]
    pub device_path: String,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_resolution")]
    pub resolution: Resolution,

    #[serde(default = "default_framerate")]
    pub framerate: Framerate,

    #[serde(default)]
    pub exposure_mode: ExposureMode,

    #[serde(default)]
    pub rotation: u16,

    #[serde(default)]
    pub iso: u32,

    #[serde(default)]
    pub shutter_speed: u32,

    #[serde(default = "default_sensor_mode")]
    pub sensor_mode: u8,

    #[serde(default)]
    pub use_video_port: bool,

    /// Sensor calibration pause after opening the device
    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,
}

fn default_camera_device() -> String {
    "/dev/video0".to_string()
}

fn default_device_name() -> String {
    CameraParameters::default().device_name
}

fn default_resolution() -> Resolution {
    CameraParameters::default().resolution
}

fn default_framerate() -> Framerate {
    CameraParameters::default().framerate
}

fn default_sensor_mode() -> u8 {
    CameraParameters::default().sensor_mode
}

fn default_warmup() -> u64 {
    3
}

impl CameraSettings {
    /// Initial parameter record for the controller
    pub fn parameters(&self) -> CameraParameters {
        CameraParameters {
            device_name: self.device_name.clone(),
            resolution: self.resolution,
            framerate: self.framerate,
            exposure_mode: self.exposure_mode.clone(),
            rotation: self.rotation,
            iso: self.iso,
            shutter_speed: self.shutter_speed,
            sensor_mode: self.sensor_mode,
            use_video_port: self.use_video_port,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        let params = CameraParameters::default();
        Self {
            backend: CameraBackend::default(),
            device_path: default_camera_device(),
            device_name: params.device_name,
            resolution: params.resolution,
            framerate: params.framerate,
            exposure_mode: params.exposure_mode,
            rotation: params.rotation,
            iso: params.iso,
            shutter_speed: params.shutter_speed,
            sensor_mode: params.sensor_mode,
            use_video_port: params.use_video_port,
            warmup_secs: default_warmup(),
        }
    }
}

/// Capture loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Seconds between captures
    #[serde(default = "default_capture_interval")]
    pub interval_secs: u64,

    /// File overwritten with the latest still image
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Number of snapshot events kept for `/events`
    #[serde(default = "default_event_history")]
    pub event_history: usize,
}

fn default_capture_interval() -> u64 {
    10
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("/var/lib/picam-thing/snapshot.jpg")
}

fn default_event_history() -> usize {
    16
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_capture_interval(),
            snapshot_path: default_snapshot_path(),
            event_history: default_event_history(),
        }
    }
}
