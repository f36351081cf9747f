use std::f32::consts::{PI, TAU};

use fieldconfig::{AnimationProfile, ResolvedField, ResolvedLayer};
use glam::{Vec2, Vec3};
use rand::prelude::*;
use tracing::debug;

use crate::palette::WeightedPalette;

/// Per-axis jitter added to the shell position at spawn.
const SPAWN_JITTER: f32 = 5.0;
/// Half-width of the uniform velocity range before `speed_factor` scaling.
const VELOCITY_RANGE: f32 = 0.1;
/// Radians of rotation about the vertical axis per tick, per unit `speed_factor`.
const ROTATION_RATE: f32 = 0.0005;
const SIZE_RANGE: (f32, f32) = (0.5, 1.5);
/// Colour brightness for the farthest layer; the nearest layer gets full brightness.
const MIN_BRIGHTNESS: f32 = 0.4;

/// Read-only view of one particle across a layer's flat buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub phase: f32,
    pub size: f32,
    pub color: [f32; 3],
}

/// One depth layer of particles stored as flat, index-stable buffers.
#[derive(Debug, Clone)]
pub struct Layer {
    spec: ResolvedLayer,
    positions: Vec<f32>,
    velocities: Vec<f32>,
    phases: Vec<f32>,
    sizes: Vec<f32>,
    colors: Vec<f32>,
    opacity: f32,
    dirty: bool,
    generation: u64,
}

impl Layer {
    fn spawn<R: Rng + ?Sized>(
        spec: &ResolvedLayer,
        palette: &WeightedPalette,
        boundary: f32,
        rng: &mut R,
    ) -> Self {
        let count = spec.count as usize;
        let mut positions = Vec::with_capacity(count * 3);
        let mut velocities = Vec::with_capacity(count * 3);
        let mut phases = Vec::with_capacity(count);
        let mut sizes = Vec::with_capacity(count);
        let mut colors = Vec::with_capacity(count * 3);
        let brightness = MIN_BRIGHTNESS + (1.0 - MIN_BRIGHTNESS) * spec.depth_factor;

        for _ in 0..count {
            // Uniform angles over-sample the poles; kept for the look.
            let theta = rng.gen_range(0.0..TAU);
            let phi = rng.gen_range(0.0..PI);
            let shell = Vec3::new(
                phi.sin() * theta.cos(),
                phi.sin() * theta.sin(),
                phi.cos(),
            ) * spec.radius;
            let jitter = Vec3::new(
                rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
                rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
                rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
            );
            let position = (shell + jitter + Vec3::Z * spec.base_depth)
                .clamp(Vec3::splat(-boundary), Vec3::splat(boundary));
            positions.extend_from_slice(&position.to_array());

            for _ in 0..3 {
                velocities.push(rng.gen_range(-VELOCITY_RANGE..=VELOCITY_RANGE) * spec.speed_factor);
            }

            sizes.push(rng.gen_range(SIZE_RANGE.0..=SIZE_RANGE.1) * spec.size);
            let base = palette.pick(rng);
            colors.extend(base.iter().map(|channel| channel * brightness));
            phases.push(rng.gen_range(0.0..TAU));
        }

        Self {
            spec: spec.clone(),
            positions,
            velocities,
            phases,
            sizes,
            colors,
            opacity: spec.opacity,
            dirty: true,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ResolvedLayer {
        &self.spec
    }

    pub fn count(&self) -> usize {
        self.spec.count as usize
    }

    pub fn depth_factor(&self) -> f32 {
        self.spec.depth_factor
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn velocities(&self) -> &[f32] {
        &self.velocities
    }

    pub fn phases(&self) -> &[f32] {
        &self.phases
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// True when the buffers changed since the backend last synced them.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every update; lets backends skip redundant uploads.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn particle(&self, index: usize) -> Option<Particle> {
        if index >= self.count() {
            return None;
        }
        let v = index * 3;
        Some(Particle {
            position: Vec3::from_slice(&self.positions[v..v + 3]),
            velocity: Vec3::from_slice(&self.velocities[v..v + 3]),
            phase: self.phases[index],
            size: self.sizes[index],
            color: [self.colors[v], self.colors[v + 1], self.colors[v + 2]],
        })
    }

    fn update(&mut self, params: &SimulationParams, frame: &LayerFrame<'_>) {
        let profile = frame.profile;
        let speed = self.spec.speed_factor;
        let (sin, cos) = (ROTATION_RATE * speed).sin_cos();
        let radius = params.interaction_radius;
        let pull = params.force_scale * self.spec.depth_factor;
        let bound = params.boundary;

        for i in 0..self.count() {
            let v = i * 3;
            let (x, z) = (self.positions[v], self.positions[v + 2]);
            self.positions[v] = x * cos - z * sin;
            self.positions[v + 2] = x * sin + z * cos;

            for axis in 0..3 {
                self.positions[v + axis] += self.velocities[v + axis] * speed;
            }

            self.positions[v + 2] += (frame.time * profile.wave_frequency + self.phases[i]).sin()
                * profile.wave_amplitude
                * frame.delta;

            let d = frame.pointer_world - Vec2::new(self.positions[v], self.positions[v + 1]);
            let distance = d.length();
            if distance > 0.0 && distance < radius {
                let push = d * ((radius - distance) / radius) * pull;
                self.positions[v] -= push.x;
                self.positions[v + 1] -= push.y;
            }

            for axis in 0..3 {
                let p = &mut self.positions[v + axis];
                let vel = &mut self.velocities[v + axis];
                if *p > bound {
                    *p = bound;
                    *vel = -vel.abs();
                } else if *p < -bound {
                    *p = -bound;
                    *vel = vel.abs();
                }
            }
        }

        self.dirty = true;
        self.generation = self.generation.wrapping_add(1);

        let pulse_speed = profile.pulse_speed * (0.5 + self.spec.depth_factor);
        self.opacity = (self.spec.opacity + (frame.time * pulse_speed).sin() * profile.pulse_amplitude)
            .clamp(0.0, 1.0);
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Field-wide constants shared by every layer update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub boundary: f32,
    pub interaction_radius: f32,
    pub force_scale: f32,
}

/// Inputs for a single update of every layer.
#[derive(Debug, Clone, Copy)]
pub struct LayerFrame<'a> {
    pub time: f32,
    pub delta: f32,
    /// Eased pointer already scaled to world units.
    pub pointer_world: Vec2,
    pub profile: &'a AnimationProfile,
}

/// Every particle layer of a mounted field, ordered back to front.
#[derive(Debug, Clone)]
pub struct ParticleLayerSet {
    layers: Vec<Layer>,
    params: SimulationParams,
}

impl ParticleLayerSet {
    /// Spawns all layers from the field's seed. Equal seeds give equal layers.
    pub fn new(field: &ResolvedField) -> Self {
        let mut rng = StdRng::seed_from_u64(field.seed);
        let palette = WeightedPalette::new(&field.palette);
        let layers: Vec<Layer> = field
            .layers
            .iter()
            .map(|spec| Layer::spawn(spec, &palette, field.boundary, &mut rng))
            .collect();
        debug!(
            layers = layers.len(),
            particles = layers.iter().map(Layer::count).sum::<usize>(),
            seed = field.seed,
            "spawned particle layers"
        );
        Self {
            layers,
            params: SimulationParams {
                boundary: field.boundary,
                interaction_radius: field.mouse_influence_radius,
                force_scale: field.force_scale,
            },
        }
    }

    pub fn params(&self) -> SimulationParams {
        self.params
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The nearest layer, which feeds the connection graph.
    pub fn foreground(&self) -> Option<&Layer> {
        self.layers.last()
    }

    pub fn particle_count(&self) -> usize {
        self.layers.iter().map(Layer::count).sum()
    }

    pub fn update(&mut self, frame: &LayerFrame<'_>) {
        let params = self.params;
        for layer in &mut self.layers {
            layer.update(&params, frame);
        }
    }

    pub fn all_finite(&self) -> bool {
        self.layers.iter().all(|layer| {
            layer.positions.iter().all(|v| v.is_finite())
                && layer.velocities.iter().all(|v| v.is_finite())
                && layer.opacity.is_finite()
        })
    }

    /// Largest absolute position component across every layer.
    pub fn max_abs_component(&self) -> f32 {
        self.layers
            .iter()
            .flat_map(|layer| layer.positions.iter())
            .fold(0.0f32, |max, v| max.max(v.abs()))
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }
}
