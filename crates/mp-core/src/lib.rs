pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod rate_gate;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{CaptureConfig, CropRegion, DEFAULT_TARGET_FPS};
pub use engine::{CaptureEngine, FrameSender, ResultStream, SessionStats};
pub use error::{CaptureError, Result};
pub use normalize::{normalize, normalize_region};
pub use pipeline::FramePipeline;
pub use rate_gate::{Admission, RateGateState, admit};
pub use types::{CaptureResultRecord, RecordMetadata};

// Re-export for convenience
pub use bytes::Bytes;
pub use mp_encoder::{
    CropRect, ImageCodec, OutputFormat, PackedImage, RawFrame, YuvPlanarBuffer, encode_yuv420,
};
