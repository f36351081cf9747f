use std::time::{Duration, Instant};

/// Slack allowed when deciding a frame is due, so a cap of 60 FPS does not
/// drop to 30 when wakeups land a fraction early.
const PACER_SLACK: Duration = Duration::from_micros(250);

/// Frame-rate limiter for the window host.
///
/// With no cap every requested frame is due immediately; with a cap the pacer
/// accumulates elapsed time and releases one frame per interval.
#[derive(Debug, Clone)]
pub struct FramePacer {
    target_interval: Option<Duration>,
    accumulator: Duration,
    last_tick: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: Option<f32>) -> Self {
        let target_interval = target_fps.and_then(|fps| {
            if fps.is_finite() && fps > 0.0 {
                Some(Duration::from_secs_f32(1.0 / fps))
            } else {
                None
            }
        });
        Self {
            target_interval,
            accumulator: Duration::ZERO,
            last_tick: None,
        }
    }

    pub fn target_interval(&self) -> Option<Duration> {
        self.target_interval
    }

    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
        self.last_tick = None;
    }

    /// True when a frame may be drawn at `now`.
    pub fn ready_for_frame(&self, now: Instant) -> bool {
        let (Some(interval), Some(last)) = (self.target_interval, self.last_tick) else {
            return true;
        };
        let pending = self
            .accumulator
            .saturating_add(now.saturating_duration_since(last));
        pending + PACER_SLACK >= interval
    }

    /// Records that a frame was drawn at `now`.
    pub fn mark_rendered(&mut self, now: Instant) {
        match (self.target_interval, self.last_tick) {
            (Some(interval), Some(last)) => {
                let total = self
                    .accumulator
                    .saturating_add(now.saturating_duration_since(last));
                // Never bank more than one interval, or a stall turns into a burst.
                self.accumulator = total.saturating_sub(interval).min(interval);
            }
            _ => self.accumulator = Duration::ZERO,
        }
        self.last_tick = Some(now);
    }

    /// When the next capped frame becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        let interval = self.target_interval?;
        let last = self.last_tick?;
        Some(last + interval.saturating_sub(self.accumulator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_pacer_is_always_ready() {
        let mut pacer = FramePacer::new(None);
        let now = Instant::now();
        assert!(pacer.ready_for_frame(now));
        pacer.mark_rendered(now);
        assert!(pacer.ready_for_frame(now));
        assert!(pacer.next_deadline().is_none());
    }

    #[test]
    fn capped_pacer_waits_one_interval() {
        let mut pacer = FramePacer::new(Some(8.0));
        let start = Instant::now();
        assert!(pacer.ready_for_frame(start));
        pacer.mark_rendered(start);
        assert!(!pacer.ready_for_frame(start + Duration::from_millis(50)));
        assert_eq!(pacer.next_deadline(), Some(start + Duration::from_millis(125)));
        assert!(pacer.ready_for_frame(start + Duration::from_millis(125)));
    }

    #[test]
    fn stalls_bank_at_most_one_frame() {
        let mut pacer = FramePacer::new(Some(8.0));
        let start = Instant::now();
        pacer.mark_rendered(start);
        let late = start + Duration::from_secs(5);
        pacer.mark_rendered(late);
        assert!(pacer.ready_for_frame(late + Duration::from_millis(1)));
        pacer.mark_rendered(late + Duration::from_millis(1));
        assert!(!pacer.ready_for_frame(late + Duration::from_millis(2)));
    }

    #[test]
    fn non_positive_caps_are_ignored() {
        assert!(FramePacer::new(Some(0.0)).target_interval().is_none());
        assert!(FramePacer::new(Some(-5.0)).target_interval().is_none());
        assert!(FramePacer::new(Some(f32::NAN)).target_interval().is_none());
    }
}
