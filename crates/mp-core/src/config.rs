use crate::error::{CaptureError, Result};
use mp_encoder::OutputFormat;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_FPS: u32 = 15;

/// Sub-rectangle selected from the normalized image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True for a non-empty region inside a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        !self.is_empty() && right <= width as u64 && bottom <= height as u64
    }
}

/// Settings fixed for the lifetime of one capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames per second to admit; 0 admits every delivered frame.
    pub target_fps: u32,
    pub crop: Option<CropRegion>,
    pub output: OutputFormat,
    /// Capacity of the channel between the frame source and the pipeline.
    pub frame_queue_depth: usize,
    pub buffer_pool_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            crop: None,
            output: OutputFormat::default(),
            frame_queue_depth: 4,
            buffer_pool_size: 3,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_queue_depth == 0 {
            return Err(CaptureError::Config("frame_queue_depth must be at least 1".into()));
        }

        if let Some(crop) = self.crop {
            if crop.is_empty() {
                return Err(CaptureError::Config(format!("empty crop region {crop:?}")));
            }
        }

        self.output
            .validate()
            .map_err(|e| CaptureError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.target_fps, 15);
        assert!(config.crop.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CaptureConfig::default();
        config.frame_queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.crop = Some(CropRegion::new(0, 0, 0, 10));
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.output = OutputFormat::Jpeg { quality: 0 };
        assert!(matches!(config.validate(), Err(CaptureError::Config(_))));
    }

    #[test]
    fn test_region_bounds() {
        assert!(CropRegion::new(0, 0, 4, 2).fits_within(4, 2));
        assert!(!CropRegion::new(1, 0, 4, 2).fits_within(4, 2));
        assert!(!CropRegion::new(0, 1, 4, 2).fits_within(4, 2));
        assert!(!CropRegion::new(0, 0, 0, 2).fits_within(4, 2));
        assert!(!CropRegion::new(u32::MAX, 0, 2, 1).fits_within(4, 2));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CaptureConfig = serde_json::from_str(r#"{"target_fps": 0}"#).unwrap();
        assert_eq!(config.target_fps, 0);
        assert_eq!(config.frame_queue_depth, 4);
        assert_eq!(config.output, OutputFormat::Jpeg { quality: 100 });
    }
}
