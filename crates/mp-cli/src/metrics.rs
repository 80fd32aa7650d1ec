use mp_core::CaptureResultRecord;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct MetricsCollector {
    pub frames_offered: u64,
    pub frames_refused: u64,
    pub records_received: u64,
    pub frame_errors: u64,
    pub bytes_encoded: u64,
    pub bytes_yuv: u64,
    pub last_sequence: u64,
    pub start_time: Option<Instant>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record(&mut self, record: &CaptureResultRecord) {
        self.records_received += 1;
        self.bytes_encoded += record.encoded_bytes.len() as u64;
        self.bytes_yuv += record.yuv_planar.size() as u64;
        self.last_sequence = record.sequence_number;
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn average_fps(&self) -> f64 {
        let uptime = self.uptime_secs();
        if uptime > 0.0 {
            self.records_received as f64 / uptime
        } else {
            0.0
        }
    }

    pub fn average_encoded_kib(&self) -> f64 {
        if self.records_received > 0 {
            self.bytes_encoded as f64 / self.records_received as f64 / 1024.0
        } else {
            0.0
        }
    }
}
