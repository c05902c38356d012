//! Camera device interface

use std::path::Path;

use thiserror::Error;

use crate::hardware::params::{CameraParameters, ExposureMode, Framerate, ImageFormat, Resolution};

/// Driver-level failure reported by a camera device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("device not open")]
    NotOpen,

    #[error("value rejected by driver: {0}")]
    Rejected(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single camera device.
///
/// Implementations are not required to tolerate concurrent calls. The camera
/// controller serializes every call behind one lock.
pub trait CameraDevice: Send {
    /// Open the device and apply the full parameter record
    fn open(&mut self, params: &CameraParameters) -> Result<(), DeviceError>;

    /// Start the preview stream so the sensor can calibrate
    fn start_preview(&mut self) -> Result<(), DeviceError>;

    fn stop_preview(&mut self) -> Result<(), DeviceError>;

    /// Release the device handle
    fn close(&mut self) -> Result<(), DeviceError>;

    /// Write one still image to `path`
    fn capture(
        &mut self,
        path: &Path,
        format: ImageFormat,
        use_video_port: bool,
    ) -> Result<(), DeviceError>;

    fn resolution(&self) -> Resolution;

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), DeviceError>;

    fn framerate(&self) -> Framerate;

    fn set_framerate(&mut self, framerate: Framerate) -> Result<(), DeviceError>;

    fn exposure_mode(&self) -> ExposureMode;

    fn set_exposure_mode(&mut self, mode: &ExposureMode) -> Result<(), DeviceError>;
}

/// List available V4L2 camera devices
pub fn list_cameras() -> Vec<String> {
    let mut cameras = Vec::new();

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if Path::new(&path).exists() {
            cameras.push(path);
        }
    }

    cameras
}
