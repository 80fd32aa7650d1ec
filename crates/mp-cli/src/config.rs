use anyhow::{Context, Result};
use mp_core::CaptureConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

/// Synthetic framebuffer source standing in for the platform acquirer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    /// Extra pixels at the end of every row, as hardware buffers often carry.
    pub row_padding_pixels: u32,
    /// Rate at which frames are delivered to the pipeline.
    pub delivery_fps: u32,
    /// Frames to deliver before stopping; 0 runs until Ctrl+C.
    pub frame_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub write_files: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 2400,
            row_padding_pixels: 16,
            delivery_fps: 60,
            frame_count: 300,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("captures"),
            write_files: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;

        if self.source.width == 0 || self.source.height == 0 {
            anyhow::bail!("Invalid source resolution");
        }

        if self.source.delivery_fps == 0 || self.source.delivery_fps > 240 {
            anyhow::bail!("Invalid delivery FPS (must be 1-240)");
        }

        if let Some(crop) = self.capture.crop {
            if !crop.fits_within(self.source.width, self.source.height) {
                anyhow::bail!(
                    "Crop region {:?} does not fit a {}x{} source",
                    crop, self.source.width, self.source.height
                );
            }
        }

        Ok(())
    }
}
