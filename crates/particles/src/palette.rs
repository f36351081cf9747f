use fieldconfig::PaletteEntry;
use rand::Rng;

/// Palette with cumulative weights for O(log n) weighted picks.
#[derive(Debug, Clone)]
pub struct WeightedPalette {
    colors: Vec<[f32; 3]>,
    cumulative: Vec<f32>,
    total: f32,
}

const FALLBACK_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

impl WeightedPalette {
    pub fn new(entries: &[PaletteEntry]) -> Self {
        let mut colors = Vec::with_capacity(entries.len());
        let mut cumulative = Vec::with_capacity(entries.len());
        let mut total = 0.0f32;
        for entry in entries {
            let weight = if entry.weight.is_finite() {
                entry.weight.max(0.0)
            } else {
                0.0
            };
            total += weight;
            colors.push(entry.color.0);
            cumulative.push(total);
        }
        Self {
            colors,
            cumulative,
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// First colour of the palette, used for connection lines.
    pub fn primary(&self) -> [f32; 3] {
        self.colors.first().copied().unwrap_or(FALLBACK_COLOR)
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> [f32; 3] {
        if self.total <= 0.0 {
            return self.primary();
        }
        let roll = rng.gen_range(0.0..self.total);
        let index = self
            .cumulative
            .partition_point(|&edge| edge <= roll)
            .min(self.colors.len() - 1);
        self.colors[index]
    }
}
