use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Bytes per pixel of the canonical packed layout (R, G, B, A).
pub const BYTES_PER_PIXEL: usize = 4;

/// Valid region of a hardware framebuffer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    /// True when the rectangle lies entirely inside a `width x height` extent.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.left as u64 + self.width as u64;
        let bottom = self.top as u64 + self.height as u64;
        right <= width as u64 && bottom <= height as u64
    }
}

/// A framebuffer as delivered by the acquirer: interleaved RGBA8888 rows,
/// possibly padded out to `row_stride` bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub buffer: Bytes,
    pub width: u32,
    pub height: u32,
    pub pixel_stride: u32,
    pub row_stride: u32,
    pub crop_rect: Option<CropRect>,
}

impl RawFrame {
    pub fn new(buffer: Bytes, width: u32, height: u32, pixel_stride: u32, row_stride: u32) -> Self {
        Self {
            buffer,
            width,
            height,
            pixel_stride,
            row_stride,
            crop_rect: None,
        }
    }

    pub fn with_crop_rect(mut self, crop_rect: CropRect) -> Self {
        self.crop_rect = Some(crop_rect);
        self
    }
}

/// Tightly packed RGBA image with no row padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PackedImage {
    /// Wraps `pixels` if its length is exactly `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != Self::byte_len(width, height) {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}
