mod recorder;
mod session;

pub use recorder::{Recorder, StopReport};
pub use session::Session;

/// Slack when comparing the accumulator with the frame interval, so deltas that
/// add up to exactly one interval are not lost to rounding.
const PACING_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Stopped,
    Recording,
    /// Frames are done; the encoder is running.
    Stopping,
}

/// Accumulates host frame deltas against a fixed capture interval.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: f64,
    elapsed: f64,
}

impl FramePacer {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            interval: 1.0 / f64::from(frame_rate.max(1)),
            elapsed: 0.0,
        }
    }

    #[cfg(test)]
    fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Adds `delta` seconds and reports whether a capture is due. Negative or
    /// non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f64) -> bool {
        if delta.is_finite() && delta > 0.0 {
            self.elapsed += delta;
        }
        self.elapsed + PACING_EPSILON >= self.interval
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captures_for(frame_rate: u32, delta: f64, ticks: usize) -> usize {
        let mut pacer = FramePacer::new(frame_rate);
        let mut fired = 0;
        for _ in 0..ticks {
            if pacer.advance(delta) {
                fired += 1;
                pacer.reset();
            }
        }
        fired
    }

    #[test]
    fn test_every_second_tick_at_half_rate() {
        let mut pacer = FramePacer::new(30);
        let fired: Vec<bool> = (0..6)
            .map(|_| {
                let due = pacer.advance(1.0 / 60.0);
                if due {
                    pacer.reset();
                }
                due
            })
            .collect();
        assert_eq!(fired, [false, true, false, true, false, true]);
    }

    #[test]
    fn test_once_per_interval_for_many_rates() {
        for rate in [1, 12, 24, 25, 30, 60, 90, 144] {
            for split in 1..=5u32 {
                let delta = 1.0 / f64::from(rate) / f64::from(split);
                let ticks = (rate * split) as usize;
                assert_eq!(
                    captures_for(rate, delta, ticks),
                    rate as usize,
                    "rate {rate}, {split} ticks per frame"
                );
            }
        }
    }

    #[test]
    fn test_large_delta_fires_once() {
        let mut pacer = FramePacer::new(30);
        assert!(pacer.advance(1.0));
        pacer.reset();
        assert_eq!(pacer.elapsed(), 0.0);
        assert!(!pacer.advance(0.01));
    }

    #[test]
    fn test_bad_deltas_ignored() {
        let mut pacer = FramePacer::new(10);
        assert!(!pacer.advance(-1.0));
        assert!(!pacer.advance(f64::NAN));
        assert!(!pacer.advance(f64::INFINITY));
        assert_eq!(pacer.elapsed(), 0.0);
    }

    #[test]
    fn test_zero_rate_treated_as_one() {
        let mut pacer = FramePacer::new(0);
        assert!(!pacer.advance(0.5));
        assert!(pacer.advance(0.5));
    }
}
