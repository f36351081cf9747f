use glam::Vec2;

/// Raw and smoothed pointer position in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub target: Vec2,
    pub current: Vec2,
}

/// Exponentially smoothed pointer/touch position.
///
/// Only the most recent raw sample matters: events between ticks overwrite
/// the target, and [`InputTracker::tick`] moves the eased position a fixed
/// fraction of the remaining distance.
#[derive(Debug, Clone)]
pub struct InputTracker {
    state: InputState,
    easing: f32,
}

impl InputTracker {
    pub fn new(easing: f32) -> Self {
        Self {
            state: InputState::default(),
            easing: easing.clamp(f32::EPSILON, 1.0),
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn target(&self) -> Vec2 {
        self.state.target
    }

    pub fn current(&self) -> Vec2 {
        self.state.current
    }

    /// Records a new target. Non-finite samples are dropped.
    pub fn set_target(&mut self, x: f32, y: f32) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.state.target = Vec2::new(x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
    }

    /// Records a target from physical pixel coordinates inside a viewport.
    pub fn set_target_from_pixels(&mut self, x: f64, y: f64, width: u32, height: u32) {
        if let Some(ndc) = pixels_to_ndc(x, y, width, height) {
            self.set_target(ndc.x, ndc.y);
        }
    }

    /// Advances the eased position one step toward the target.
    pub fn tick(&mut self) -> Vec2 {
        let state = &mut self.state;
        state.current += (state.target - state.current) * self.easing;
        state.current
    }

    pub fn distance_to_target(&self) -> f32 {
        self.state.target.distance(self.state.current)
    }
}

/// Maps a pixel coordinate (origin top-left, y down) to NDC (y up).
///
/// Returns `None` for an empty viewport.
pub fn pixels_to_ndc(x: f64, y: f64, width: u32, height: u32) -> Option<Vec2> {
    if width == 0 || height == 0 {
        return None;
    }
    let nx = (x / width as f64) * 2.0 - 1.0;
    let ny = 1.0 - (y / height as f64) * 2.0;
    Some(Vec2::new(nx as f32, ny as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_monotonically_toward_target() {
        let mut tracker = InputTracker::new(0.05);
        tracker.set_target(0.8, -0.6);
        let mut previous = tracker.distance_to_target();
        for _ in 0..400 {
            tracker.tick();
            let distance = tracker.distance_to_target();
            assert!(distance <= previous);
            previous = distance;
        }
        assert!(previous < 1e-3, "distance {previous} did not converge");
    }

    #[test]
    fn targets_are_clamped_and_non_finite_ignored() {
        let mut tracker = InputTracker::new(0.5);
        tracker.set_target(4.0, -9.0);
        assert_eq!(tracker.target(), Vec2::new(1.0, -1.0));
        tracker.set_target(f32::NAN, 0.0);
        assert_eq!(tracker.target(), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn only_latest_sample_counts() {
        let mut tracker = InputTracker::new(1.0);
        tracker.set_target(0.1, 0.1);
        tracker.set_target(-0.5, 0.25);
        assert_eq!(tracker.tick(), Vec2::new(-0.5, 0.25));
    }

    #[test]
    fn pixel_coordinates_flip_y() {
        let centre = pixels_to_ndc(400.0, 300.0, 800, 600).unwrap();
        assert_eq!(centre, Vec2::ZERO);
        let top_left = pixels_to_ndc(0.0, 0.0, 800, 600).unwrap();
        assert_eq!(top_left, Vec2::new(-1.0, 1.0));
        assert!(pixels_to_ndc(1.0, 1.0, 0, 600).is_none());
    }
}
