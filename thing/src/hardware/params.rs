//! Camera capture parameters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ThingError;

/// Frame size in pixels, rendered as `WxH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Create a resolution, rejecting zero dimensions
    pub fn new(width: u32, height: u32) -> Result<Self, ThingError> {
        if width == 0 || height == 0 {
            return Err(ThingError::ParameterRejected(format!(
                "resolution must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ThingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ThingError::ParameterRejected(format!("invalid resolution: {:?}", s));

        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
        Resolution::new(width, height)
    }
}

impl TryFrom<(u32, u32)> for Resolution {
    type Error = ThingError;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Resolution::new(width, height)
    }
}

impl Serialize for Resolution {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Frames per second, strictly positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Framerate(f64);

impl Framerate {
    pub fn new(fps: f64) -> Result<Self, ThingError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ThingError::ParameterRejected(format!(
                "framerate must be a positive number, got {}",
                fps
            )));
        }
        Ok(Self(fps))
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Framerate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fps = f64::deserialize(deserializer)?;
        Framerate::new(fps).map_err(serde::de::Error::custom)
    }
}

/// Exposure mode tag. The set of accepted tags is up to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExposureMode(String);

impl ExposureMode {
    pub const AUTO: &'static str = "auto";

    pub fn new(tag: &str) -> Result<Self, ThingError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ThingError::ParameterRejected(
                "exposure mode must not be empty".to_string(),
            ));
        }
        Ok(Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExposureMode {
    fn default() -> Self {
        Self(Self::AUTO.to_string())
    }
}

impl fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ExposureMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ExposureMode::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
}

impl ImageFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Full parameter record for the camera.
///
/// `resolution`, `framerate` and `exposure_mode` change at runtime through the
/// controller setters. The remaining fields are fixed once the device is set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub device_name: String,
    pub resolution: Resolution,
    pub framerate: Framerate,
    pub exposure_mode: ExposureMode,
    pub rotation: u16,
    pub iso: u32,
    /// Shutter speed in microseconds, 0 for automatic
    pub shutter_speed: u32,
    pub sensor_mode: u8,
    pub use_video_port: bool,
}

impl CameraParameters {
    /// Check the fixed fields that setters never revisit
    pub fn validate(&self) -> Result<(), ThingError> {
        if self.device_name.trim().is_empty() {
            return Err(ThingError::ConfigError("device name is empty".to_string()));
        }
        if !matches!(self.rotation, 0 | 90 | 180 | 270) {
            return Err(ThingError::ConfigError(format!(
                "rotation must be 0, 90, 180 or 270, got {}",
                self.rotation
            )));
        }
        Ok(())
    }
}

impl Default for CameraParameters {
    fn default() -> Self {
        Self {
            device_name: "picam".to_string(),
            resolution: Resolution {
                width: 1024,
                height: 768,
            },
            framerate: Framerate(30.0),
            exposure_mode: ExposureMode::default(),
            rotation: 0,
            iso: 0,
            shutter_speed: 0,
            sensor_mode: 3,
            use_video_port: false,
        }
    }
}
