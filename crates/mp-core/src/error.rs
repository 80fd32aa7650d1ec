use crate::config::CropRegion;
use mp_encoder::EncoderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid region {region:?} for {width}x{height} image")]
    InvalidRegion {
        region: CropRegion,
        width: u32,
        height: u32,
    },

    #[error("Encoding failure: {0}")]
    EncodingFailure(#[from] EncoderError),

    #[error("Capture session not active")]
    SessionNotActive,

    #[error("Capture session already active")]
    AlreadyActive,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    /// Errors that concern a single frame and leave the session running.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            CaptureError::MalformedFrame(_)
                | CaptureError::InvalidRegion { .. }
                | CaptureError::EncodingFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_errors_leave_session_running() {
        assert!(CaptureError::MalformedFrame("short buffer".into()).is_per_frame());
        assert!(CaptureError::InvalidRegion {
            region: CropRegion::new(0, 0, 8, 8),
            width: 4,
            height: 4,
        }
        .is_per_frame());
        assert!(CaptureError::from(EncoderError::EncodingFailed("boom".into())).is_per_frame());

        assert!(!CaptureError::SessionNotActive.is_per_frame());
        assert!(!CaptureError::Config("bad".into()).is_per_frame());
    }
}
