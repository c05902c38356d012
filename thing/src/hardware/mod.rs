//! Camera hardware: device trait, parameters and backends

pub mod camera;
pub mod params;
pub mod simulated;
#[cfg(feature = "hardware")]
pub mod v4l2;

use serde::{Deserialize, Serialize};

use crate::hardware::camera::CameraDevice;
use crate::hardware::simulated::SimulatedCamera;

/// Which device implementation drives the camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    #[default]
    Simulated,
    V4l2,
}

/// Build the configured camera device.
///
/// Returns `None` when the backend was not compiled in.
pub fn create_device(backend: CameraBackend, device_path: &str) -> Option<Box<dyn CameraDevice>> {
    match backend {
        CameraBackend::Simulated => Some(Box::new(SimulatedCamera::new())),
        #[cfg(feature = "hardware")]
        CameraBackend::V4l2 => Some(Box::new(v4l2::V4l2Camera::new(device_path))),
        #[cfg(not(feature = "hardware"))]
        CameraBackend::V4l2 => {
            let _ = device_path;
            None
        }
    }
}
