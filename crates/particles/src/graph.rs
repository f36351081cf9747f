use fieldconfig::AnimationProfile;
use tracing::trace;

/// Floats per edge: two xyz endpoints.
pub const FLOATS_PER_EDGE: usize = 6;

/// Ratio between the line pulse and the layer pulse speed.
const LINE_PULSE_RATIO: f32 = 0.7;

/// Builds the transient proximity graph for the foreground layer.
///
/// Indices are sampled at a fixed stride and pairs are visited in index order
/// (`i < j`), so the result is deterministic for a given position buffer. The
/// edge buffer is reused between frames.
#[derive(Debug, Clone)]
pub struct ConnectionGraphBuilder {
    threshold: f32,
    cap: usize,
    stride: usize,
    edges: Vec<f32>,
    opacity: f32,
}

impl ConnectionGraphBuilder {
    pub fn new(threshold: f32, cap: usize, stride: usize) -> Self {
        Self {
            threshold,
            cap,
            stride: stride.max(1),
            edges: Vec::with_capacity(cap * FLOATS_PER_EDGE),
            opacity: 0.0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Replaces the previous frame's edges and returns the new edge count.
    pub fn rebuild(&mut self, positions: &[f32]) -> usize {
        self.edges.clear();
        let count = positions.len() / 3;
        let limit = self.threshold * self.threshold;

        'outer: for a in (0..count).step_by(self.stride) {
            if self.edge_count() >= self.cap {
                break;
            }
            let pa = &positions[a * 3..a * 3 + 3];
            for b in (a + self.stride..count).step_by(self.stride) {
                let pb = &positions[b * 3..b * 3 + 3];
                let dx = pa[0] - pb[0];
                let dy = pa[1] - pb[1];
                let dz = pa[2] - pb[2];
                if dx * dx + dy * dy + dz * dz < limit {
                    self.edges.extend_from_slice(pa);
                    self.edges.extend_from_slice(pb);
                    if self.edge_count() >= self.cap {
                        break 'outer;
                    }
                }
            }
        }

        trace!(edges = self.edge_count(), "rebuilt connection graph");
        self.edge_count()
    }

    pub fn edges(&self) -> &[f32] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len() / FLOATS_PER_EDGE
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn update_opacity(&mut self, time: f32, profile: &AnimationProfile) {
        let pulse = (time * profile.pulse_speed * LINE_PULSE_RATIO).sin() * profile.pulse_amplitude;
        self.opacity = (profile.line_opacity + pulse).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(points: &[[f32; 3]]) -> Vec<f32> {
        points.iter().flat_map(|p| p.iter().copied()).collect()
    }

    #[test]
    fn pair_exactly_at_threshold_is_excluded() {
        let mut builder = ConnectionGraphBuilder::new(40.0, 10, 1);
        assert_eq!(builder.rebuild(&grid(&[[0.0, 0.0, 0.0], [40.0, 0.0, 0.0]])), 0);
        assert_eq!(builder.rebuild(&grid(&[[0.0, 0.0, 0.0], [39.9, 0.0, 0.0]])), 1);
        assert_eq!(builder.edges(), &[0.0, 0.0, 0.0, 39.9, 0.0, 0.0]);
    }

    #[test]
    fn edge_count_never_exceeds_cap() {
        let points: Vec<[f32; 3]> = (0..60).map(|i| [i as f32 * 0.1, 0.0, 0.0]).collect();
        let mut builder = ConnectionGraphBuilder::new(100.0, 7, 1);
        assert_eq!(builder.rebuild(&grid(&points)), 7);
        assert_eq!(builder.edges().len(), 7 * FLOATS_PER_EDGE);

        let mut empty = ConnectionGraphBuilder::new(100.0, 0, 1);
        assert_eq!(empty.rebuild(&grid(&points)), 0);
    }

    #[test]
    fn stride_skips_unsampled_indices() {
        // Indices 0 and 1 are close, but with stride 2 only 0, 2, 4 are sampled.
        let points = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [100.0, 0.0, 0.0],
            [500.0, 0.0, 0.0],
            [101.0, 0.0, 0.0],
        ];
        let mut builder = ConnectionGraphBuilder::new(10.0, 10, 2);
        assert_eq!(builder.rebuild(&grid(&points)), 1);
        assert_eq!(builder.edges(), &[100.0, 0.0, 0.0, 101.0, 0.0, 0.0]);
    }

    #[test]
    fn rebuild_replaces_previous_frame() {
        let mut builder = ConnectionGraphBuilder::new(5.0, 10, 1);
        builder.rebuild(&grid(&[[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]));
        assert_eq!(builder.edge_count(), 3);
        builder.rebuild(&grid(&[[0.0; 3], [50.0, 0.0, 0.0]]));
        assert_eq!(builder.edge_count(), 0);
    }

    #[test]
    fn line_opacity_is_clamped() {
        let mut builder = ConnectionGraphBuilder::new(5.0, 10, 1);
        let profile = AnimationProfile {
            line_opacity: 0.95,
            pulse_amplitude: 0.5,
            ..AnimationProfile::idle()
        };
        for step in 0..100 {
            builder.update_opacity(step as f32 * 0.1, &profile);
            assert!((0.0..=1.0).contains(&builder.opacity()));
        }
    }
}
