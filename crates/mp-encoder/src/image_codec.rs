use super::*;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::debug;

/// JPEG/PNG compression backed by the `image` crate.
pub struct ImageRsCodec {
    format: OutputFormat,
}

impl ImageRsCodec {
    pub fn new(format: OutputFormat) -> Result<Self> {
        format.validate()?;
        Ok(Self { format })
    }

    fn encode_jpeg(&self, image: &PackedImage, quality: u8) -> Result<Vec<u8>> {
        // JPEG has no alpha channel.
        let rgb: Vec<u8> = image
            .pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .write_image(&rgb, image.width, image.height, ExtendedColorType::Rgb8)
            .map_err(|e| EncoderError::EncodingFailed(format!("jpeg: {e}")))?;
        Ok(out)
    }

    fn encode_png(&self, image: &PackedImage) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&image.pixels, image.width, image.height, ExtendedColorType::Rgba8)
            .map_err(|e| EncoderError::EncodingFailed(format!("png: {e}")))?;
        Ok(out)
    }
}

impl ImageCodec for ImageRsCodec {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn compress(&self, image: &PackedImage) -> Result<Bytes> {
        if image.pixels.len() != PackedImage::byte_len(image.width, image.height) {
            return Err(EncoderError::InvalidImage(format!(
                "{}x{} image carries {} bytes",
                image.width,
                image.height,
                image.pixels.len()
            )));
        }

        let encoded = match self.format {
            OutputFormat::Jpeg { quality } => self.encode_jpeg(image, quality)?,
            OutputFormat::Png => self.encode_png(image)?,
        };

        debug!("Compressed {}x{} frame to {} ({} bytes)",
               image.width, image.height, self.format, encoded.len());

        Ok(Bytes::from(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> PackedImage {
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let on = (x + y) % 2 == 0;
                pixels.extend_from_slice(if on { &[255, 255, 255, 255] } else { &[0, 0, 0, 128] });
            }
        }
        PackedImage::from_raw(width, height, pixels).unwrap()
    }

    #[test]
    fn test_jpeg_output_has_soi_marker() {
        let codec = ImageRsCodec::new(OutputFormat::Jpeg { quality: 100 }).unwrap();
        let bytes = codec.compress(&checker(8, 8)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_png_keeps_alpha() {
        let codec = ImageRsCodec::new(OutputFormat::Png).unwrap();
        let bytes = codec.compress(&checker(4, 3)).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.into_raw(), checker(4, 3).pixels);
    }

    #[test]
    fn test_rejects_invalid_quality() {
        assert!(matches!(
            ImageRsCodec::new(OutputFormat::Jpeg { quality: 0 }),
            Err(EncoderError::InvalidConfig(_))
        ));
        assert!(ImageRsCodec::new(OutputFormat::Jpeg { quality: 101 }).is_err());
    }

    #[test]
    fn test_mismatched_buffer_is_rejected() {
        let codec = ImageRsCodec::new(OutputFormat::Png).unwrap();
        let image = PackedImage { width: 4, height: 4, pixels: vec![0; 10] };
        assert!(matches!(codec.compress(&image), Err(EncoderError::InvalidImage(_))));
    }
}
