//! Fixed-rate frame admission.
//!
//! Frames are gated before the expensive compression and YUV stages, so the
//! work done per second is bounded by the target rate no matter how fast the
//! source delivers. Dropped frames are never queued.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Drop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateGateState {
    /// Monotonic timestamp of the most recently accepted frame.
    pub last_accepted_at_millis: Option<u64>,
    /// 0 admits every frame.
    pub target_fps: u32,
    pub accepted_frame_count: u64,
}

impl RateGateState {
    pub fn new(target_fps: u32) -> Self {
        Self {
            target_fps,
            ..Default::default()
        }
    }

    pub fn admit(&mut self, now_millis: u64) -> Admission {
        admit(self, now_millis, self.target_fps)
    }

    pub fn frame_interval_millis(&self) -> Option<u64> {
        frame_interval_millis(self.target_fps)
    }
}

/// Minimum spacing between accepted frames, `None` when unlimited.
pub fn frame_interval_millis(target_fps: u32) -> Option<u64> {
    match target_fps {
        0 => None,
        fps => Some(1000 / fps as u64),
    }
}

/// Decides whether the frame delivered at `now_millis` is processed.
///
/// An elapsed time exactly equal to the interval is accepted. The first frame
/// of a session is always accepted.
pub fn admit(state: &mut RateGateState, now_millis: u64, target_fps: u32) -> Admission {
    let accept = match (frame_interval_millis(target_fps), state.last_accepted_at_millis) {
        (None, _) | (_, None) => true,
        (Some(interval), Some(last)) => now_millis.saturating_sub(last) >= interval,
    };

    if !accept {
        return Admission::Drop;
    }

    state.last_accepted_at_millis = Some(now_millis);
    state.accepted_frame_count += 1;
    Admission::Accept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(state: &mut RateGateState, times: impl IntoIterator<Item = u64>) -> Vec<u64> {
        times
            .into_iter()
            .filter(|&t| state.admit(t) == Admission::Accept)
            .collect()
    }

    #[test]
    fn test_unlimited_accepts_everything() {
        let mut state = RateGateState::new(0);
        for t in [5, 5, 5, 0, 1] {
            assert_eq!(state.admit(t), Admission::Accept);
        }
        assert_eq!(state.accepted_frame_count, 5);
    }

    #[test]
    fn test_ten_fps_boundary() {
        let mut state = RateGateState::new(10);
        assert_eq!(state.admit(1_000), Admission::Accept);
        assert_eq!(state.admit(1_099), Admission::Drop);
        assert_eq!(state.admit(1_100), Admission::Accept);
        assert_eq!(state.accepted_frame_count, 2);
        assert_eq!(state.last_accepted_at_millis, Some(1_100));
    }

    #[test]
    fn test_exact_interval_accepts_immediately() {
        let mut state = RateGateState::new(10);
        assert_eq!(state.admit(0), Admission::Accept);
        assert_eq!(state.admit(100), Admission::Accept);
    }

    #[test]
    fn test_burst_at_fifteen_fps() {
        // floor(1000 / 15) = 66 ms between accepted frames.
        assert_eq!(frame_interval_millis(15), Some(66));

        let mut state = RateGateState::new(15);
        assert_eq!(accepted(&mut state, 0..20), vec![0]);

        let mut state = RateGateState::new(15);
        assert_eq!(accepted(&mut state, 0..200), vec![0, 66, 132, 198]);
        assert_eq!(state.accepted_frame_count, 4);
    }

    #[test]
    fn test_drop_leaves_state_untouched() {
        let mut state = RateGateState::new(30);
        state.admit(10);
        let before = state.clone();

        assert_eq!(state.admit(20), Admission::Drop);
        assert_eq!(state, before);
    }

    #[test]
    fn test_clock_going_backwards_drops() {
        let mut state = RateGateState::new(10);
        state.admit(500);
        assert_eq!(state.admit(400), Admission::Drop);
    }

    #[test]
    fn test_very_high_rate_never_drops() {
        let mut state = RateGateState::new(5_000);
        assert_eq!(accepted(&mut state, [1, 1, 1]).len(), 3);
    }
}
