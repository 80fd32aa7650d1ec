use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod frame;
pub mod image_codec;
pub mod yuv;

pub use frame::{BYTES_PER_PIXEL, CropRect, PackedImage, RawFrame};
pub use yuv::{YuvPlanarBuffer, encode_yuv420};

pub type Result<T> = std::result::Result<T, EncoderError>;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

/// Compressed image format produced for each accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 100 }
    }
}

impl OutputFormat {
    pub fn validate(&self) -> Result<()> {
        match *self {
            OutputFormat::Jpeg { quality } if !(1..=100).contains(&quality) => Err(
                EncoderError::InvalidConfig(format!("JPEG quality {quality} outside 1-100")),
            ),
            _ => Ok(()),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Jpeg { quality } => write!(f, "JPEG (q={quality})"),
            OutputFormat::Png => write!(f, "PNG"),
        }
    }
}

/// Compression collaborator invoked once per accepted frame.
pub trait ImageCodec: Send + Sync {
    fn format(&self) -> OutputFormat;
    fn compress(&self, image: &PackedImage) -> Result<Bytes>;
}

pub struct CodecFactory;

impl CodecFactory {
    pub fn create(format: OutputFormat) -> Result<Box<dyn ImageCodec>> {
        tracing::info!("Creating image codec: {}", format);
        Ok(Box::new(image_codec::ImageRsCodec::new(format)?))
    }

    pub fn list_available_formats() -> Vec<String> {
        vec!["JPEG (image)".to_string(), "PNG (image)".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_full_quality_jpeg() {
        assert_eq!(OutputFormat::default(), OutputFormat::Jpeg { quality: 100 });
        assert_eq!(OutputFormat::default().extension(), "jpg");
    }

    #[test]
    fn test_factory_rejects_bad_quality() {
        assert!(CodecFactory::create(OutputFormat::Jpeg { quality: 0 }).is_err());

        let codec = CodecFactory::create(OutputFormat::Png).unwrap();
        assert_eq!(codec.format(), OutputFormat::Png);
    }
}
