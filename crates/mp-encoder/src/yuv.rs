use crate::frame::{BYTES_PER_PIXEL, PackedImage};
use tracing::trace;

/// Images smaller than this are converted on the calling thread.
const PARALLEL_MIN_PIXELS: usize = 640 * 480;

/// Planar YUV 4:2:0: a full-resolution Y plane followed by U and V planes
/// decimated 2x2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvPlanarBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Byte sizes of one Y plane, one chroma plane, and the whole buffer.
///
/// The total is `width * height * 3 / 2`. For odd pixel counts this can be one
/// byte larger than the three planes together; that trailing byte stays zero.
pub fn plane_sizes(width: u32, height: u32) -> (usize, usize, usize) {
    let luma = width as usize * height as usize;
    (luma, luma / 4, luma * 3 / 2)
}

impl YuvPlanarBuffer {
    pub fn y_plane(&self) -> &[u8] {
        let (luma, _, _) = plane_sizes(self.width, self.height);
        &self.data[..luma]
    }

    pub fn u_plane(&self) -> &[u8] {
        let (luma, chroma, _) = plane_sizes(self.width, self.height);
        &self.data[luma..luma + chroma]
    }

    pub fn v_plane(&self) -> &[u8] {
        let (luma, chroma, _) = plane_sizes(self.width, self.height);
        &self.data[luma + chroma..luma + 2 * chroma]
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[inline]
pub fn clamp_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[inline]
pub fn rgb_to_y(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    clamp_byte(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

#[inline]
pub fn rgb_to_uv(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let u = clamp_byte(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128);
    let v = clamp_byte(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128);
    (u, v)
}

/// BT.601 integer conversion of a single pixel. Alpha plays no part.
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (u, v) = rgb_to_uv(r, g, b);
    (rgb_to_y(r, g, b), u, v)
}

/// Horizontal band of rows converted by one worker.
struct Band<'a> {
    first_row: usize,
    pixels: &'a [u8],
    y_out: &'a mut [u8],
    u_out: &'a mut [u8],
    v_out: &'a mut [u8],
    chroma_base: usize,
}

/// Converts a packed RGBA image to planar YUV 4:2:0 (Y, then U, then V).
///
/// Chroma is taken from the first pixel of every 2x2 block in raster order
/// (even row, even column), not averaged. When the dimensions are odd the
/// chroma planes hold `width * height / 4` samples and later samples are
/// discarded.
pub fn encode_yuv420(image: &PackedImage) -> YuvPlanarBuffer {
    let width = image.width as usize;
    let height = image.height as usize;
    let (luma, chroma, total) = plane_sizes(image.width, image.height);
    let mut data = vec![0u8; total];

    if luma == 0 {
        return YuvPlanarBuffer { width: image.width, height: image.height, data };
    }

    let workers = if luma >= PARALLEL_MIN_PIXELS {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        1
    };
    // Bands start on even rows so every band owns whole chroma rows.
    let rows_per_band = {
        let rows = height.div_ceil(workers);
        rows + rows % 2
    };
    let chroma_width = width.div_ceil(2);

    let (y_plane, rest) = data.split_at_mut(luma);
    let (u_plane, rest) = rest.split_at_mut(chroma);
    let (v_plane, _) = rest.split_at_mut(chroma);

    let mut bands = Vec::with_capacity(workers);
    let (mut y_rest, mut u_rest, mut v_rest) = (y_plane, u_plane, v_plane);
    let mut chroma_consumed = 0;

    for first_row in (0..height).step_by(rows_per_band) {
        let rows = rows_per_band.min(height - first_row);

        let (y_out, y_tail) = std::mem::take(&mut y_rest).split_at_mut(rows * width);
        y_rest = y_tail;

        let chroma_end = ((first_row + rows).div_ceil(2) * chroma_width).min(chroma);
        let take = chroma_end - chroma_consumed;
        let (u_out, u_tail) = std::mem::take(&mut u_rest).split_at_mut(take);
        u_rest = u_tail;
        let (v_out, v_tail) = std::mem::take(&mut v_rest).split_at_mut(take);
        v_rest = v_tail;

        let start = first_row * width * BYTES_PER_PIXEL;
        let end = (first_row + rows) * width * BYTES_PER_PIXEL;

        bands.push(Band {
            first_row,
            pixels: &image.pixels[start..end],
            y_out,
            u_out,
            v_out,
            chroma_base: chroma_consumed,
        });
        chroma_consumed = chroma_end;
    }

    trace!("Converting {}x{} to YUV420 in {} band(s)", width, height, bands.len());

    if bands.len() == 1 {
        for band in bands {
            convert_band(band, width, chroma_width);
        }
    } else {
        std::thread::scope(|scope| {
            for band in bands {
                scope.spawn(move || convert_band(band, width, chroma_width));
            }
        });
    }

    YuvPlanarBuffer { width: image.width, height: image.height, data }
}

fn convert_band(band: Band<'_>, width: usize, chroma_width: usize) {
    let row_bytes = width * BYTES_PER_PIXEL;

    for (local_row, row) in band.pixels.chunks_exact(row_bytes).enumerate() {
        let j = band.first_row + local_row;
        let y_row = &mut band.y_out[local_row * width..(local_row + 1) * width];

        for (i, px) in row.chunks_exact(BYTES_PER_PIXEL).enumerate() {
            let (r, g, b) = (px[0], px[1], px[2]);
            y_row[i] = rgb_to_y(r, g, b);

            if j % 2 == 0 && i % 2 == 0 {
                let k = (j / 2) * chroma_width + i / 2 - band.chroma_base;
                if k < band.u_out.len() {
                    let (u, v) = rgb_to_uv(r, g, b);
                    band.u_out[k] = u;
                    band.v_out[k] = v;
                }
            }
        }
    }
}
