use bytes::Bytes;
use mp_encoder::{OutputFormat, YuvPlanarBuffer};
use serde::{Deserialize, Serialize};

/// Everything produced for one accepted frame. Each record is self-contained.
#[derive(Debug, Clone)]
pub struct CaptureResultRecord {
    pub encoded_bytes: Bytes,
    pub encoded_format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub row_bytes_of_packed: u32,
    /// Echoed from the source frame.
    pub pixel_stride: u32,
    /// Echoed from the source frame.
    pub row_stride: u32,
    pub yuv_planar: YuvPlanarBuffer,
    /// Monotonic milliseconds since the engine was created, not wall-clock
    /// epoch time. Only differences between records are meaningful.
    pub timestamp_millis: u64,
    pub sequence_number: u64,
}

impl CaptureResultRecord {
    pub fn size(&self) -> usize {
        self.encoded_bytes.len() + self.yuv_planar.size()
    }

    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            width: self.width,
            height: self.height,
            row_bytes: self.row_bytes_of_packed,
            pixel_stride: self.pixel_stride,
            row_stride: self.row_stride,
            output: self.encoded_format,
            encoded_len: self.encoded_bytes.len(),
            yuv_len: self.yuv_planar.size(),
            timestamp_millis: self.timestamp_millis,
            sequence_number: self.sequence_number,
        }
    }
}

/// Serializable description of a record without its payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub pixel_stride: u32,
    pub row_stride: u32,
    pub output: OutputFormat,
    pub encoded_len: usize,
    pub yuv_len: usize,
    /// Engine-relative monotonic milliseconds; see [`CaptureResultRecord::timestamp_millis`].
    pub timestamp_millis: u64,
    pub sequence_number: u64,
}
