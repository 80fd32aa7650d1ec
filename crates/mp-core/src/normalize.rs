//! Strips row padding and crop offsets from hardware framebuffers.

use crate::config::CropRegion;
use crate::error::{CaptureError, Result};
use mp_encoder::{BYTES_PER_PIXEL, CropRect, PackedImage, RawFrame};

/// Where the valid pixels of a frame live, already checked against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    offset: usize,
    row_stride: usize,
    pixel_stride: usize,
    pub width: u32,
    pub height: u32,
}

impl PlaneLayout {
    pub fn packed_len(&self) -> usize {
        PackedImage::byte_len(self.width, self.height)
    }
}

/// Checks strides, crop rectangle and requested region without copying.
pub fn validate(raw: &RawFrame, region: Option<CropRegion>) -> Result<PlaneLayout> {
    if raw.width == 0 || raw.height == 0 {
        return Err(CaptureError::MalformedFrame(format!(
            "empty frame {}x{}",
            raw.width, raw.height
        )));
    }

    let pixel_stride = raw.pixel_stride as usize;
    let row_stride = raw.row_stride as usize;

    if pixel_stride < BYTES_PER_PIXEL {
        return Err(CaptureError::MalformedFrame(format!(
            "pixel stride {pixel_stride} cannot hold an RGBA8888 pixel"
        )));
    }

    let content = raw.width as usize * pixel_stride;
    if row_stride < content {
        return Err(CaptureError::MalformedFrame(format!(
            "row stride {row_stride} shorter than {} pixels of {pixel_stride} bytes",
            raw.width
        )));
    }

    let padding = row_stride - content;
    if padding % pixel_stride != 0 {
        return Err(CaptureError::MalformedFrame(format!(
            "row padding of {padding} bytes is not a whole number of {pixel_stride}-byte pixels"
        )));
    }

    let crop = raw
        .crop_rect
        .unwrap_or(CropRect::new(0, 0, raw.width, raw.height));
    if crop.width == 0 || crop.height == 0 || !crop.fits_within(raw.width, raw.height) {
        return Err(CaptureError::MalformedFrame(format!(
            "crop rectangle {crop:?} outside {}x{} frame",
            raw.width, raw.height
        )));
    }

    let (mut left, mut top, mut width, mut height) = (crop.left, crop.top, crop.width, crop.height);

    if let Some(region) = region {
        if !region.fits_within(width, height) {
            return Err(CaptureError::InvalidRegion { region, width, height });
        }
        left += region.x;
        top += region.y;
        width = region.width;
        height = region.height;
    }

    let offset = top as usize * row_stride + left as usize * pixel_stride;
    let required = offset
        + (height as usize - 1) * row_stride
        + (width as usize - 1) * pixel_stride
        + BYTES_PER_PIXEL;

    if raw.buffer.len() < required {
        return Err(CaptureError::MalformedFrame(format!(
            "buffer holds {} bytes, {required} required",
            raw.buffer.len()
        )));
    }

    Ok(PlaneLayout {
        offset,
        row_stride,
        pixel_stride,
        width,
        height,
    })
}

/// Copies the pixels described by `layout` into `out`, reusing its allocation.
pub fn pack_into(raw: &RawFrame, layout: &PlaneLayout, mut out: Vec<u8>) -> PackedImage {
    let width = layout.width as usize;
    let span = (width - 1) * layout.pixel_stride + BYTES_PER_PIXEL;

    out.clear();
    out.reserve(layout.packed_len());

    for y in 0..layout.height as usize {
        let start = layout.offset + y * layout.row_stride;
        let row = &raw.buffer[start..start + span];

        if layout.pixel_stride == BYTES_PER_PIXEL {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks(layout.pixel_stride) {
                out.extend_from_slice(&px[..BYTES_PER_PIXEL]);
            }
        }
    }

    PackedImage {
        width: layout.width,
        height: layout.height,
        pixels: out,
    }
}

pub fn normalize(raw: &RawFrame) -> Result<PackedImage> {
    normalize_region(raw, None)
}

/// Removes padding and selects `region` (relative to the padding-free image).
pub fn normalize_region(raw: &RawFrame, region: Option<CropRegion>) -> Result<PackedImage> {
    let layout = validate(raw, region)?;
    Ok(pack_into(raw, &layout, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    /// Frame whose pixel (x, y) is `[x, y, x ^ y, 255]` and whose padding bytes are 0xEE.
    fn padded_frame(width: u32, height: u32, padding_pixels: u32) -> RawFrame {
        let row_stride = (width + padding_pixels) * 4;
        let mut buf = Vec::with_capacity((row_stride * height) as usize);
        for y in 0..height {
            for x in 0..width {
                buf.extend_from_slice(&[x as u8, y as u8, (x ^ y) as u8, 255]);
            }
            buf.extend(std::iter::repeat_n(0xEE, (padding_pixels * 4) as usize));
        }
        RawFrame::new(Bytes::from(buf), width, height, 4, row_stride)
    }

    fn pixel(image: &PackedImage, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * image.width + x) * 4) as usize;
        image.pixels[i..i + 4].try_into().unwrap()
    }

    #[test]
    fn test_unpadded_frame_is_identity() {
        let frame = padded_frame(5, 3, 0);
        let packed = normalize(&frame).unwrap();

        assert_eq!((packed.width, packed.height), (5, 3));
        assert_eq!(packed.pixels, frame.buffer.to_vec());
    }

    #[test]
    fn test_padding_is_removed() {
        let frame = padded_frame(6, 4, 10);
        let packed = normalize(&frame).unwrap();

        assert_eq!(packed.pixels.len(), 6 * 4 * 4);
        assert!(!packed.pixels.contains(&0xEE));
        assert_eq!(pixel(&packed, 5, 3), [5, 3, 6, 255]);
        assert_eq!(pixel(&packed, 0, 2), [0, 2, 2, 255]);
    }

    #[test]
    fn test_misaligned_padding_is_malformed() {
        let mut frame = padded_frame(4, 2, 1);
        frame.row_stride += 2;
        let err = normalize(&frame).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedFrame(_)), "{err}");
    }

    #[test]
    fn test_short_row_stride_is_malformed() {
        let mut frame = padded_frame(4, 2, 0);
        frame.row_stride = 12;
        assert!(matches!(normalize(&frame), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let mut frame = padded_frame(4, 2, 2);
        frame.buffer = frame.buffer.slice(..frame.buffer.len() - 9 * 4);
        assert!(matches!(normalize(&frame), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_last_row_padding_may_be_absent() {
        let mut frame = padded_frame(4, 2, 2);
        frame.buffer = frame.buffer.slice(..frame.buffer.len() - 2 * 4);
        assert_eq!(normalize(&frame).unwrap().pixels.len(), 32);
    }

    #[test]
    fn test_zero_pixel_stride_is_malformed() {
        let mut frame = padded_frame(2, 2, 0);
        frame.pixel_stride = 0;
        assert!(matches!(normalize(&frame), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_hardware_crop_rect() {
        let frame = padded_frame(8, 6, 4).with_crop_rect(CropRect::new(2, 1, 3, 4));
        let packed = normalize(&frame).unwrap();

        assert_eq!((packed.width, packed.height), (3, 4));
        assert_eq!(pixel(&packed, 0, 0), [2, 1, 3, 255]);
        assert_eq!(pixel(&packed, 2, 3), [4, 4, 0, 255]);
    }

    #[test]
    fn test_crop_rect_outside_frame_is_malformed() {
        let frame = padded_frame(4, 4, 0).with_crop_rect(CropRect::new(2, 2, 3, 1));
        assert!(matches!(normalize(&frame), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_region_applies_after_crop_rect() {
        let frame = padded_frame(8, 6, 4).with_crop_rect(CropRect::new(2, 1, 5, 5));
        let packed = normalize_region(&frame, Some(CropRegion::new(1, 2, 2, 2))).unwrap();

        assert_eq!((packed.width, packed.height), (2, 2));
        assert_eq!(pixel(&packed, 0, 0), [3, 3, 0, 255]);
        assert_eq!(pixel(&packed, 1, 1), [4, 4, 0, 255]);
    }

    #[test]
    fn test_region_out_of_bounds_is_invalid() {
        let frame = padded_frame(4, 4, 2);
        let err = normalize_region(&frame, Some(CropRegion::new(2, 0, 3, 1))).unwrap_err();

        match err {
            CaptureError::InvalidRegion { width, height, .. } => assert_eq!((width, height), (4, 4)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wide_pixel_stride_keeps_first_four_bytes() {
        // 8-byte pixels: RGBA followed by four filler bytes.
        let mut buf = Vec::new();
        for x in 0..3u8 {
            buf.extend_from_slice(&[x, 10, 20, 255, 0xEE, 0xEE, 0xEE, 0xEE]);
        }
        let frame = RawFrame::new(Bytes::from(buf), 3, 1, 8, 24);
        let packed = normalize(&frame).unwrap();

        assert_eq!(packed.pixels, [0, 10, 20, 255, 1, 10, 20, 255, 2, 10, 20, 255]);
    }

    #[test]
    fn test_pack_into_reuses_buffer() {
        let frame = padded_frame(4, 4, 1);
        let layout = validate(&frame, None).unwrap();
        let recycled = Vec::with_capacity(1024);
        let ptr = recycled.as_ptr();

        let packed = pack_into(&frame, &layout, recycled);
        assert_eq!(packed.pixels.as_ptr(), ptr);
        assert_eq!(packed.pixels, normalize(&frame).unwrap().pixels);
    }
}
