//! Camera controller: serializes every hardware operation behind one lock

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::ThingError;
use crate::hardware::camera::{CameraDevice, DeviceError};
use crate::hardware::params::{CameraParameters, ExposureMode, Framerate, ImageFormat, Resolution};

/// Controller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Pause after opening the device so the sensor can calibrate
    pub warmup: Duration,

    /// Output format for captured stills
    pub image_format: ImageFormat,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(3),
            image_format: ImageFormat::Jpeg,
        }
    }
}

struct Inner {
    device: Box<dyn CameraDevice>,
    params: CameraParameters,
    is_open: bool,
    is_previewing: bool,
}

/// Owner of the single camera device.
///
/// Every operation holds the device lock for its whole duration, captures
/// included, so a parameter change either fully precedes or fully follows a
/// capture. The lock is never held across an `.await`; async callers go
/// through [`CameraController::blocking`].
pub struct CameraController {
    inner: Mutex<Inner>,
    options: Options,
    is_ready: AtomicBool,
}

impl CameraController {
    /// Create a controller around an unopened device
    pub fn new(
        device: Box<dyn CameraDevice>,
        params: CameraParameters,
        options: Options,
    ) -> Result<Self, ThingError> {
        params.validate()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                device,
                params,
                is_open: false,
                is_previewing: false,
            }),
            options,
            is_ready: AtomicBool::new(false),
        })
    }

    /// True once `setup` (warm-up included) has completed and until `teardown`
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Snapshot of the stored parameter record
    pub fn parameters(&self) -> CameraParameters {
        self.inner.lock().params.clone()
    }

    /// Open the device, apply the initial parameters and start the preview,
    /// then wait for the warm-up delay.
    pub fn setup(&self) -> Result<(), ThingError> {
        {
            let mut inner = self.inner.lock();
            let params = inner.params.clone();

            inner.device.open(&params).map_err(|e| {
                error!("Failed to open camera {}: {}", params.device_name, e);
                ThingError::DeviceOpenFailed(e.to_string())
            })?;
            inner.is_open = true;

            if let Err(e) = inner.device.start_preview() {
                error!("Failed to start preview on {}: {}", params.device_name, e);
                if let Err(close_err) = inner.device.close() {
                    warn!("Failed to close camera after setup error: {}", close_err);
                }
                inner.is_open = false;
                return Err(ThingError::DeviceOpenFailed(e.to_string()));
            }
            inner.is_previewing = true;
            info!(
                "Camera {} opened at {} ({} fps, exposure {})",
                params.device_name, params.resolution, params.framerate, params.exposure_mode
            );
        }

        info!("Waiting {:?} for camera module warmup...", self.options.warmup);
        std::thread::sleep(self.options.warmup);

        self.is_ready.store(true, Ordering::SeqCst);
        info!("Camera ready");
        Ok(())
    }

    /// Capture one still image to `path`.
    ///
    /// The image is written to a sibling temporary file and renamed over
    /// `path`, so a failed capture leaves the previous image intact.
    pub fn capture(&self, path: &Path) -> Result<(), ThingError> {
        let mut inner = self.inner.lock();
        if !inner.is_open {
            return Err(ThingError::CaptureFailed(DeviceError::NotOpen.to_string()));
        }

        debug!("Capturing image to {}", path.display());
        let temp_path = partial_path(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ThingError::CaptureFailed(e.to_string()))?;
        }

        let use_video_port = inner.params.use_video_port;
        let result = inner
            .device
            .capture(&temp_path, self.options.image_format, use_video_port)
            .map_err(|e| ThingError::CaptureFailed(e.to_string()))
            .and_then(|_| {
                fs::rename(&temp_path, path).map_err(|e| ThingError::CaptureFailed(e.to_string()))
            });

        if result.is_err() && temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                warn!("Failed to remove {}: {}", temp_path.display(), e);
            }
        }
        result
    }

    /// Current resolution as `WxH`, read from the live device
    pub fn get_resolution(&self) -> String {
        self.inner.lock().device.resolution().to_string()
    }

    /// Parse a `WxH` string and apply it
    pub fn set_resolution(&self, value: &str) -> Result<(), ThingError> {
        let resolution = value.parse::<Resolution>().inspect_err(|e| {
            warn!("Failed to set resolution: {}", e);
        })?;
        self.set_resolution_to(resolution)
    }

    /// Apply a resolution to the device, then record it
    pub fn set_resolution_to(&self, resolution: Resolution) -> Result<(), ThingError> {
        let mut inner = self.inner.lock();
        inner.device.set_resolution(resolution).map_err(|e| {
            warn!("Failed to set resolution {}: {}", resolution, e);
            ThingError::ParameterRejected(e.to_string())
        })?;
        inner.params.resolution = resolution;
        info!("Resolution set to {}", resolution);
        Ok(())
    }

    pub fn get_framerate(&self) -> f64 {
        self.inner.lock().device.framerate().as_f64()
    }

    pub fn set_framerate(&self, value: f64) -> Result<(), ThingError> {
        let framerate = Framerate::new(value).inspect_err(|e| {
            warn!("Failed to set framerate: {}", e);
        })?;

        let mut inner = self.inner.lock();
        inner.device.set_framerate(framerate).map_err(|e| {
            warn!("Failed to set framerate {}: {}", framerate, e);
            ThingError::ParameterRejected(e.to_string())
        })?;
        // drivers may settle on a nearby rate
        let applied = inner.device.framerate();
        inner.params.framerate = applied;
        info!("Framerate set to {} (requested {})", applied, framerate);
        Ok(())
    }

    pub fn get_exposure_mode(&self) -> String {
        self.inner.lock().device.exposure_mode().to_string()
    }

    pub fn set_exposure_mode(&self, value: &str) -> Result<(), ThingError> {
        let mode = ExposureMode::new(value).inspect_err(|e| {
            warn!("Failed to set exposure mode: {}", e);
        })?;

        let mut inner = self.inner.lock();
        inner.device.set_exposure_mode(&mode).map_err(|e| {
            warn!("Failed to set exposure mode {}: {}", mode, e);
            ThingError::ParameterRejected(e.to_string())
        })?;
        info!("Exposure mode set to {}", mode);
        inner.params.exposure_mode = mode;
        Ok(())
    }

    /// Stop the preview stream. Idempotent.
    pub fn stop_streaming(&self) -> Result<(), ThingError> {
        let mut inner = self.inner.lock();
        Self::stop_preview_locked(&mut inner)
    }

    /// Stop streaming and release the device.
    ///
    /// Idempotent, and safe after a partially failed `setup`. Both steps are
    /// attempted; the first failure is returned.
    pub fn teardown(&self) -> Result<(), ThingError> {
        let mut inner = self.inner.lock();
        self.is_ready.store(false, Ordering::SeqCst);

        let stopped = Self::stop_preview_locked(&mut inner);

        let closed = if inner.is_open {
            inner.is_open = false;
            inner.device.close().map_err(|e| {
                error!("Failed to close camera: {}", e);
                ThingError::ShutdownError(e.to_string())
            })
        } else {
            Ok(())
        };

        info!("Camera released");
        stopped.and(closed)
    }

    fn stop_preview_locked(inner: &mut Inner) -> Result<(), ThingError> {
        if !inner.is_previewing {
            return Ok(());
        }
        inner.is_previewing = false;
        inner.device.stop_preview().map_err(|e| {
            error!("Failed to stop preview: {}", e);
            ThingError::ShutdownError(e.to_string())
        })
    }

    /// Run a controller operation on the blocking thread pool
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, ThingError>
    where
        F: FnOnce(&CameraController) -> T + Send + 'static,
        T: Send + 'static,
    {
        let controller = self.clone();
        Ok(tokio::task::spawn_blocking(move || op(&controller)).await?)
    }
}

/// `snapshot.jpg` -> `snapshot.jpg.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
