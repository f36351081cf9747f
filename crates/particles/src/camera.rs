use std::f32::consts::TAU;

use fieldconfig::{AnimationProfile, CameraSettings};
use glam::{Mat4, Vec2, Vec3};
use tracing::debug;

const NEAR_PLANE: f32 = 1.0;
const FAR_PLANE: f32 = 5000.0;

/// Size of the drawable area in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Camera pose and projection for the current tick. Always looks at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
}

impl CameraState {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, Vec3::ZERO, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, NEAR_PLANE, FAR_PLANE)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// World-space right and up vectors, for billboarding.
    pub fn basis(&self) -> (Vec3, Vec3) {
        let forward = (-self.position).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        (right, up)
    }
}

/// Eased parallax camera with a slow "breathing" dolly.
#[derive(Debug, Clone)]
pub struct CameraRig {
    settings: CameraSettings,
    breath_speed: f32,
    state: CameraState,
}

impl CameraRig {
    pub fn new(settings: &CameraSettings, viewport: Viewport) -> Self {
        let period = settings.breath_period.as_secs_f32();
        let breath_speed = if period > 0.0 { TAU / period } else { 0.0 };
        Self {
            settings: settings.clone(),
            breath_speed,
            state: CameraState {
                position: Vec3::new(0.0, 0.0, settings.base_z),
                fov_y: settings.fov_degrees.to_radians(),
                aspect: viewport.aspect(),
            },
        }
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.aspect = viewport.aspect();
    }

    pub fn update(&mut self, eased: Vec2, time: f32, profile: &AnimationProfile) -> &CameraState {
        let goal = eased * self.settings.pan_scale;
        let position = &mut self.state.position;
        position.x += (goal.x - position.x) * self.settings.easing;
        position.y += (goal.y - position.y) * self.settings.easing;
        position.z = self.settings.base_z
            + (time * self.breath_speed).sin() * self.settings.breath_amplitude * profile.breath_scale;
        &self.state
    }

    /// Scales an eased NDC pointer to world units on the `z = 0` plane as
    /// seen from the resting camera distance.
    pub fn pointer_to_world(&self, eased: Vec2) -> Vec2 {
        let half_height = self.settings.base_z.abs() * (self.state.fov_y * 0.5).tan();
        Vec2::new(eased.x * half_height * self.state.aspect, eased.y * half_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResizeError {
    #[error("viewport {width}x{height} has a zero dimension")]
    ZeroSized { width: u32, height: u32 },
}

/// Tracks the container size and filters out unusable updates.
#[derive(Debug, Clone)]
pub struct ResizeHandler {
    viewport: Viewport,
}

impl ResizeHandler {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Returns the new viewport when the size actually changed.
    pub fn handle(&mut self, width: u32, height: u32) -> Result<Option<Viewport>, ResizeError> {
        if width == 0 || height == 0 {
            return Err(ResizeError::ZeroSized { width, height });
        }
        let next = Viewport::new(width, height);
        if next == self.viewport {
            return Ok(None);
        }
        debug!(width, height, "viewport resized");
        self.viewport = next;
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> CameraSettings {
        CameraSettings {
            pan_scale: 60.0,
            easing: 0.1,
            base_z: 400.0,
            breath_amplitude: 10.0,
            breath_period: Duration::from_secs(4),
            fov_degrees: 75.0,
        }
    }

    #[test]
    fn camera_eases_toward_scaled_pointer() {
        let mut rig = CameraRig::new(&settings(), Viewport::new(800, 600));
        let profile = AnimationProfile::idle();
        for _ in 0..300 {
            rig.update(Vec2::new(1.0, -0.5), 0.0, &profile);
        }
        let position = rig.state().position;
        assert!((position.x - 60.0).abs() < 1e-2);
        assert!((position.y + 30.0).abs() < 1e-2);
        assert_eq!(position.z, 400.0);
    }

    #[test]
    fn breathing_follows_the_period() {
        let mut rig = CameraRig::new(&settings(), Viewport::new(800, 600));
        let profile = AnimationProfile::idle();
        let z = rig.update(Vec2::ZERO, 1.0, &profile).position.z;
        assert!((z - 410.0).abs() < 1e-3, "quarter period should peak, got {z}");
        let speaking = AnimationProfile::speaking();
        let z = rig.update(Vec2::ZERO, 1.0, &speaking).position.z;
        assert!((z - (400.0 + 10.0 * speaking.breath_scale)).abs() < 1e-3);
    }

    #[test]
    fn resize_rejects_zero_and_ignores_repeats() {
        let mut handler = ResizeHandler::new(Viewport::new(800, 600));
        assert_eq!(
            handler.handle(0, 600),
            Err(ResizeError::ZeroSized {
                width: 0,
                height: 600
            })
        );
        assert_eq!(handler.handle(800, 600), Ok(None));
        assert_eq!(handler.handle(1024, 512), Ok(Some(Viewport::new(1024, 512))));
        assert_eq!(handler.viewport().aspect(), 2.0);
    }

    #[test]
    fn view_projection_places_origin_in_front() {
        let rig = CameraRig::new(&settings(), Viewport::new(800, 800));
        let clip = rig.state().view_projection() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
        let (right, up) = rig.state().basis();
        assert!((right - Vec3::X).length() < 1e-5);
        assert!((up - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn pointer_maps_to_visible_half_extent() {
        let rig = CameraRig::new(&settings(), Viewport::new(1000, 500));
        let world = rig.pointer_to_world(Vec2::new(1.0, 1.0));
        let half = 400.0 * (75.0f32.to_radians() * 0.5).tan();
        assert!((world.y - half).abs() < 1e-3);
        assert!((world.x - half * 2.0).abs() < 1e-3);
    }
}
