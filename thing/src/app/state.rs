//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::camera::controller::CameraController;
use crate::camera::snapshot::SnapshotProperty;
use crate::errors::ThingError;
use crate::hardware::camera::CameraDevice;
use crate::server::thing::ThingDescription;

/// Main application state
pub struct AppState {
    /// Sole owner of the camera device
    pub controller: Arc<CameraController>,

    /// Latest-image property fed by the capture loop
    pub snapshot: Arc<SnapshotProperty>,

    pub description: ThingDescription,
}

impl AppState {
    /// Build the controller around `device`. The device is not opened here.
    pub fn init(options: &AppOptions, device: Box<dyn CameraDevice>) -> Result<Self, ThingError> {
        info!("Initializing application state...");

        let controller = Arc::new(CameraController::new(
            device,
            options.camera.clone(),
            options.controller.clone(),
        )?);

        let snapshot = Arc::new(SnapshotProperty::new(
            &options.snapshot,
            options.controller.image_format,
        ));

        let description = ThingDescription::new(&options.thing, snapshot.media_type());

        Ok(Self {
            controller,
            snapshot,
            description,
        })
    }
}
