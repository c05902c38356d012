//! Simulated camera rendering a JPEG test pattern

use std::fs;
use std::io::BufWriter;
use std::path::Path;

use image::{codecs::jpeg::JpegEncoder, ImageBuffer, Rgb};
use tracing::debug;

use crate::hardware::camera::{CameraDevice, DeviceError};
use crate::hardware::params::{CameraParameters, ExposureMode, Framerate, ImageFormat, Resolution};

/// Exposure modes understood by the Raspberry Pi camera firmware
pub const PI_EXPOSURE_MODES: &[&str] = &[
    "off",
    "auto",
    "night",
    "nightpreview",
    "backlight",
    "spotlight",
    "sports",
    "snow",
    "beach",
    "verylong",
    "fixedfps",
    "antishake",
    "fireworks",
];

const JPEG_QUALITY: u8 = 85;

/// Limits the simulated driver enforces when parameters change
#[derive(Debug, Clone)]
pub struct SimulatedLimits {
    pub max_resolution: Resolution,
    pub min_framerate: f64,
    pub max_framerate: f64,
    pub exposure_modes: Vec<String>,
}

impl Default for SimulatedLimits {
    fn default() -> Self {
        Self {
            max_resolution: Resolution {
                width: 3280,
                height: 2464,
            },
            min_framerate: 0.1,
            max_framerate: 90.0,
            exposure_modes: PI_EXPOSURE_MODES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Camera backend that needs no hardware.
///
/// Each capture renders a gradient whose phase advances with the frame
/// counter, so consecutive snapshots differ.
pub struct SimulatedCamera {
    limits: SimulatedLimits,
    is_open: bool,
    resolution: Resolution,
    framerate: Framerate,
    exposure_mode: ExposureMode,
    rotation: u16,
    frame_count: u64,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::with_limits(SimulatedLimits::default())
    }

    pub fn with_limits(limits: SimulatedLimits) -> Self {
        let defaults = CameraParameters::default();
        Self {
            limits,
            is_open: false,
            resolution: defaults.resolution,
            framerate: defaults.framerate,
            exposure_mode: defaults.exposure_mode,
            rotation: defaults.rotation,
            frame_count: 0,
        }
    }

    fn check_resolution(&self, resolution: Resolution) -> Result<(), DeviceError> {
        let max = self.limits.max_resolution;
        if resolution.width > max.width || resolution.height > max.height {
            return Err(DeviceError::Rejected(format!(
                "resolution {} exceeds sensor maximum {}",
                resolution, max
            )));
        }
        Ok(())
    }

    fn check_framerate(&self, framerate: Framerate) -> Result<(), DeviceError> {
        let fps = framerate.as_f64();
        if fps < self.limits.min_framerate || fps > self.limits.max_framerate {
            return Err(DeviceError::Rejected(format!(
                "framerate {} outside {}..={}",
                fps, self.limits.min_framerate, self.limits.max_framerate
            )));
        }
        Ok(())
    }

    fn check_exposure_mode(&self, mode: &ExposureMode) -> Result<(), DeviceError> {
        if !self.limits.exposure_modes.iter().any(|m| m == mode.as_str()) {
            return Err(DeviceError::Rejected(format!("unknown exposure mode {:?}", mode.as_str())));
        }
        Ok(())
    }

    fn render(&self) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
        let (width, height) = match self.rotation {
            90 | 270 => (self.resolution.height, self.resolution.width),
            _ => (self.resolution.width, self.resolution.height),
        };
        let phase = (self.frame_count % 256) as u32;

        ImageBuffer::from_fn(width, height, |x, y| {
            let r = ((x * 255 / width.max(1)) + phase) % 256;
            let g = ((y * 255 / height.max(1)) + phase) % 256;
            let b = (phase * 3) % 256;
            Rgb([r as u8, g as u8, b as u8])
        })
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for SimulatedCamera {
    fn open(&mut self, params: &CameraParameters) -> Result<(), DeviceError> {
        self.check_resolution(params.resolution)?;
        self.check_framerate(params.framerate)?;
        self.check_exposure_mode(&params.exposure_mode)?;

        self.resolution = params.resolution;
        self.framerate = params.framerate;
        self.exposure_mode = params.exposure_mode.clone();
        self.rotation = params.rotation;
        self.is_open = true;
        debug!("Simulated camera {} opened at {}", params.device_name, self.resolution);
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), DeviceError> {
        if !self.is_open {
            return Err(DeviceError::NotOpen);
        }
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.is_open = false;
        Ok(())
    }

    fn capture(
        &mut self,
        path: &Path,
        format: ImageFormat,
        _use_video_port: bool,
    ) -> Result<(), DeviceError> {
        if !self.is_open {
            return Err(DeviceError::NotOpen);
        }

        let image = self.render();
        match format {
            ImageFormat::Jpeg => {
                let file = fs::File::create(path)?;
                let mut writer = BufWriter::new(file);
                JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
                    .encode_image(&image)
                    .map_err(|e| DeviceError::Capture(e.to_string()))?;
                writer
                    .into_inner()
                    .map_err(|e| DeviceError::Io(e.into_error()))?
                    .sync_all()?;
            }
        }

        self.frame_count += 1;
        Ok(())
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), DeviceError> {
        self.check_resolution(resolution)?;
        self.resolution = resolution;
        Ok(())
    }

    fn framerate(&self) -> Framerate {
        self.framerate
    }

    fn set_framerate(&mut self, framerate: Framerate) -> Result<(), DeviceError> {
        self.check_framerate(framerate)?;
        self.framerate = framerate;
        Ok(())
    }

    fn exposure_mode(&self) -> ExposureMode {
        self.exposure_mode.clone()
    }

    fn set_exposure_mode(&mut self, mode: &ExposureMode) -> Result<(), DeviceError> {
        self.check_exposure_mode(mode)?;
        self.exposure_mode = mode.clone();
        Ok(())
    }
}
