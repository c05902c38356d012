//! V4L2 camera backend using the v4l crate.
//!
//! Frames are requested as MJPG, so a captured buffer is already a JPEG image
//! and is written to disk as-is. The preview is a live mmap stream: it is
//! started by `start_preview`, kept running so the sensor can settle its
//! exposure, and captures dequeue their frame from it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::hardware::camera::{CameraDevice, DeviceError};
use crate::hardware::params::{CameraParameters, ExposureMode, Framerate, ImageFormat, Resolution};

const MJPG: &[u8; 4] = b"MJPG";
const BUFFER_COUNT: u32 = 4;
/// Every queued buffer may hold a frame from before the capture request
const STALE_FRAMES: u32 = BUFFER_COUNT;
/// Frames pulled when the stream starts so the driver begins filling buffers
const PRIME_FRAMES: u32 = 2;

const CID_ROTATE: u32 = 0x0098_0922;
const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const CID_ISO_SENSITIVITY: u32 = 0x009a_0917;

/// Camera backed by a V4L2 device node such as `/dev/video0`
pub struct V4l2Camera {
    device_path: PathBuf,
    device: Option<Device>,
    stream: Option<Stream<'static>>,
    resolution: Resolution,
    framerate: Framerate,
    exposure_mode: ExposureMode,
}

impl V4l2Camera {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        let defaults = CameraParameters::default();
        Self {
            device_path: device_path.into(),
            device: None,
            stream: None,
            resolution: defaults.resolution,
            framerate: defaults.framerate,
            exposure_mode: defaults.exposure_mode,
        }
    }

    /// True while the preview stream is running
    fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    fn device(&self) -> Result<&Device, DeviceError> {
        self.device.as_ref().ok_or(DeviceError::NotOpen)
    }

    /// Allocate buffers, turn streaming on and pull the first frames
    fn start_stream(&mut self) -> Result<(), DeviceError> {
        let mut stream = Stream::with_buffers(self.device()?, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        for _ in 0..PRIME_FRAMES {
            stream
                .next()
                .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        }
        debug!("Streaming from {}", self.device_path.display());
        self.stream = Some(stream);
        Ok(())
    }

    /// Run `change` with the stream stopped, since drivers refuse format and
    /// interval changes while buffers are mapped. The stream is restarted
    /// afterwards if it was running.
    fn with_stream_paused<T>(
        &mut self,
        change: impl FnOnce(&mut Self) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let was_streaming = self.stream.take().is_some();
        let changed = change(self);
        let restarted = if was_streaming {
            self.start_stream()
        } else {
            Ok(())
        };
        let value = changed?;
        restarted?;
        Ok(value)
    }

    fn apply_resolution(device: &Device, resolution: Resolution) -> Result<Resolution, DeviceError> {
        let mut fmt = device
            .format()
            .map_err(|e| DeviceError::Rejected(e.to_string()))?;
        fmt.width = resolution.width;
        fmt.height = resolution.height;
        fmt.fourcc = FourCC::new(MJPG);

        let actual = device
            .set_format(&fmt)
            .map_err(|e| DeviceError::Rejected(e.to_string()))?;
        if actual.fourcc != FourCC::new(MJPG) {
            return Err(DeviceError::Rejected(format!(
                "device does not support MJPG, offered {}",
                actual.fourcc
            )));
        }
        if actual.width != resolution.width || actual.height != resolution.height {
            return Err(DeviceError::Rejected(format!(
                "requested {} but driver chose {}x{}",
                resolution, actual.width, actual.height
            )));
        }
        Ok(resolution)
    }

    /// Request `framerate` and return the rate the driver settled on
    fn apply_framerate(device: &Device, framerate: Framerate) -> Result<Framerate, DeviceError> {
        let fps = framerate.as_f64().round();
        if fps < 1.0 {
            return Err(DeviceError::Rejected(format!(
                "V4L2 needs at least 1 fps, got {}",
                framerate
            )));
        }
        let actual = device
            .set_params(&Parameters::with_fps(fps as u32))
            .map_err(|e| DeviceError::Rejected(e.to_string()))?;
        interval_to_framerate(actual.interval.numerator, actual.interval.denominator)
    }

    fn exposure_control_value(mode: &ExposureMode) -> Result<i64, DeviceError> {
        // V4L2_CID_EXPOSURE_AUTO menu: 0 AUTO, 1 MANUAL, 2 SHUTTER_PRIORITY,
        // 3 APERTURE_PRIORITY. UVC cameras implement automatic exposure as
        // aperture priority (3) and usually reject full AUTO (0).
        match mode.as_str() {
            "auto" => Ok(3),
            "off" | "manual" => Ok(1),
            "shutter" => Ok(2),
            "full-auto" => Ok(0),
            other => Err(DeviceError::Rejected(format!(
                "exposure mode {:?} has no V4L2 equivalent",
                other
            ))),
        }
    }

    fn set_integer_control(device: &Device, id: u32, value: i64) -> Result<(), DeviceError> {
        device
            .set_control(Control {
                id,
                value: Value::Integer(value),
            })
            .map_err(|e| DeviceError::Rejected(e.to_string()))
    }
}

/// Frame interval `numerator/denominator` seconds as frames per second
fn interval_to_framerate(numerator: u32, denominator: u32) -> Result<Framerate, DeviceError> {
    if numerator == 0 {
        return Err(DeviceError::Rejected(
            "driver reported a zero frame interval".to_string(),
        ));
    }
    Framerate::new(f64::from(denominator) / f64::from(numerator))
        .map_err(|e| DeviceError::Rejected(e.to_string()))
}

impl CameraDevice for V4l2Camera {
    fn open(&mut self, params: &CameraParameters) -> Result<(), DeviceError> {
        let device = Device::with_path(&self.device_path).map_err(|e| {
            DeviceError::Unavailable(format!("{}: {}", self.device_path.display(), e))
        })?;

        self.resolution = Self::apply_resolution(&device, params.resolution)?;

        match Self::apply_framerate(&device, params.framerate) {
            Ok(applied) => self.framerate = applied,
            Err(e) => warn!("Keeping driver framerate: {}", e),
        }

        let exposure = Self::exposure_control_value(&params.exposure_mode)?;
        if let Err(e) = Self::set_integer_control(&device, CID_EXPOSURE_AUTO, exposure) {
            warn!("Exposure mode not applied: {}", e);
        }
        self.exposure_mode = params.exposure_mode.clone();

        // Fixed fields are best effort, many UVC cameras lack these controls
        if params.rotation != 0 {
            if let Err(e) = Self::set_integer_control(&device, CID_ROTATE, i64::from(params.rotation)) {
                warn!("Rotation not applied: {}", e);
            }
        }
        if params.iso != 0 {
            if let Err(e) = Self::set_integer_control(&device, CID_ISO_SENSITIVITY, i64::from(params.iso)) {
                warn!("ISO not applied: {}", e);
            }
        }
        if params.shutter_speed != 0 {
            // 100 µs units
            let value = i64::from(params.shutter_speed / 100).max(1);
            if let Err(e) = Self::set_integer_control(&device, CID_EXPOSURE_ABSOLUTE, value) {
                warn!("Shutter speed not applied: {}", e);
            }
        }

        debug!("Opened {} at {}", self.device_path.display(), self.resolution);
        self.device = Some(device);
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), DeviceError> {
        if self.is_streaming() {
            return Ok(());
        }
        self.start_stream()
    }

    fn stop_preview(&mut self) -> Result<(), DeviceError> {
        // dropping the stream turns streaming off and unmaps the buffers
        self.stream = None;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.stream = None;
        self.device = None;
        Ok(())
    }

    fn capture(
        &mut self,
        path: &Path,
        format: ImageFormat,
        _use_video_port: bool,
    ) -> Result<(), DeviceError> {
        self.device()?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DeviceError::Capture("preview stream is not running".to_string()))?;

        for _ in 0..STALE_FRAMES {
            stream.next().map_err(|e| DeviceError::Capture(e.to_string()))?;
        }
        let (buf, meta) = stream.next().map_err(|e| DeviceError::Capture(e.to_string()))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let frame = buf.get(..used).unwrap_or(buf);

        match format {
            ImageFormat::Jpeg => {
                let mut file = fs::File::create(path)?;
                file.write_all(frame)?;
                file.sync_all()?;
            }
        }
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), DeviceError> {
        self.with_stream_paused(|camera| {
            let device = camera.device()?;
            if let Err(e) = Self::apply_resolution(device, resolution) {
                // the driver may have moved to a nearby size, put the old one back
                if let Err(restore) = Self::apply_resolution(device, camera.resolution) {
                    warn!("Could not restore {}: {}", camera.resolution, restore);
                }
                return Err(e);
            }
            camera.resolution = resolution;
            Ok(())
        })
    }

    fn framerate(&self) -> Framerate {
        self.framerate
    }

    fn set_framerate(&mut self, framerate: Framerate) -> Result<(), DeviceError> {
        self.with_stream_paused(|camera| {
            let applied = Self::apply_framerate(camera.device()?, framerate)?;
            if applied != framerate {
                debug!("Requested {} fps, driver runs at {} fps", framerate, applied);
            }
            camera.framerate = applied;
            Ok(())
        })
    }

    fn exposure_mode(&self) -> ExposureMode {
        self.exposure_mode.clone()
    }

    fn set_exposure_mode(&mut self, mode: &ExposureMode) -> Result<(), DeviceError> {
        let value = Self::exposure_control_value(mode)?;
        Self::set_integer_control(self.device()?, CID_EXPOSURE_AUTO, value)?;
        self.exposure_mode = mode.clone();
        Ok(())
    }
}
