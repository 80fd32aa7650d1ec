use crate::config::{CaptureConfig, CropRegion};
use crate::error::Result;
use crate::normalize::{self, PlaneLayout};
use crate::pool::BufferPool;
use crate::rate_gate::{Admission, RateGateState};
use crate::types::CaptureResultRecord;
use mp_encoder::{ImageCodec, PackedImage, RawFrame, encode_yuv420};
use std::sync::Arc;
use tracing::trace;

/// Sequence number stamped on single-shot captures.
pub const SNAPSHOT_SEQUENCE: u64 = 1;

/// Synchronous per-frame conversion: normalize, gate, compress, YUV encode.
///
/// Owned by exactly one consumer, which serializes all gate updates.
pub struct FramePipeline {
    gate: RateGateState,
    crop: Option<CropRegion>,
    codec: Arc<dyn ImageCodec>,
    pool: BufferPool,
}

impl FramePipeline {
    pub fn new(config: &CaptureConfig, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            gate: RateGateState::new(config.target_fps),
            crop: config.crop,
            codec,
            pool: BufferPool::new(config.buffer_pool_size),
        }
    }

    /// Runs one delivered frame through the pipeline.
    ///
    /// Returns `Ok(None)` when the rate gate drops the frame. Malformed frames
    /// and bad regions are rejected before the gate and never consume a
    /// sequence number.
    pub fn process(&mut self, raw: &RawFrame, now_millis: u64) -> Result<Option<CaptureResultRecord>> {
        let layout = normalize::validate(raw, self.crop)?;

        if self.gate.admit(now_millis) == Admission::Drop {
            trace!("Dropped frame at {} ms", now_millis);
            return Ok(None);
        }

        let sequence = self.gate.accepted_frame_count;
        self.assemble(raw, &layout, now_millis, sequence).map(Some)
    }

    /// Converts a frame for a single-shot capture, bypassing the gate.
    pub fn snapshot(&mut self, raw: &RawFrame, now_millis: u64) -> Result<CaptureResultRecord> {
        let layout = normalize::validate(raw, self.crop)?;
        self.assemble(raw, &layout, now_millis, SNAPSHOT_SEQUENCE)
    }

    fn assemble(
        &mut self,
        raw: &RawFrame,
        layout: &PlaneLayout,
        now_millis: u64,
        sequence_number: u64,
    ) -> Result<CaptureResultRecord> {
        let packed = normalize::pack_into(raw, layout, self.pool.take());
        let record = self.encode(raw, &packed, now_millis, sequence_number);
        self.pool.give(packed.into_pixels());
        record
    }

    fn encode(
        &self,
        raw: &RawFrame,
        packed: &PackedImage,
        now_millis: u64,
        sequence_number: u64,
    ) -> Result<CaptureResultRecord> {
        let encoded_bytes = self.codec.compress(packed)?;
        let yuv_planar = encode_yuv420(packed);

        Ok(CaptureResultRecord {
            encoded_bytes,
            encoded_format: self.codec.format(),
            width: packed.width,
            height: packed.height,
            row_bytes_of_packed: packed.row_bytes() as u32,
            pixel_stride: raw.pixel_stride,
            row_stride: raw.row_stride,
            yuv_planar,
            timestamp_millis: now_millis,
            sequence_number,
        })
    }

    pub fn gate(&self) -> &RateGateState {
        &self.gate
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}
