use crate::config::SourceConfig;
use bytes::Bytes;
use mp_core::RawFrame;

const PIXEL_STRIDE: u32 = 4;

/// Generates padded RGBA8888 framebuffers shaped like the ones a display
/// capture surface hands out: colour bars that scroll one column per frame,
/// with junk bytes in the row padding.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    row_padding_pixels: u32,
    frame_index: u64,
}

const BARS: [[u8; 4]; 8] = [
    [255, 255, 255, 255],
    [255, 255, 0, 255],
    [0, 255, 255, 255],
    [0, 255, 0, 255],
    [255, 0, 255, 255],
    [255, 0, 0, 255],
    [0, 0, 255, 255],
    [0, 0, 0, 255],
];

impl TestPatternSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            row_padding_pixels: config.row_padding_pixels,
            frame_index: 0,
        }
    }

    pub fn row_stride(&self) -> u32 {
        (self.width + self.row_padding_pixels) * PIXEL_STRIDE
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_index
    }

    pub fn next_frame(&mut self) -> RawFrame {
        let row_stride = self.row_stride() as usize;
        let bar_width = (self.width / BARS.len() as u32).max(1) as u64;
        let shift = self.frame_index;

        let mut row = Vec::with_capacity(row_stride);
        for x in 0..self.width as u64 {
            let bar = (((x + shift) / bar_width) % BARS.len() as u64) as usize;
            row.extend_from_slice(&BARS[bar]);
        }
        row.resize(row_stride, 0xCD);

        let buffer = row.repeat(self.height as usize);
        self.frame_index += 1;

        RawFrame::new(Bytes::from(buffer), self.width, self.height, PIXEL_STRIDE, self.row_stride())
    }
}
