use fieldconfig::{ConfigError, FieldConfig};
use tracing::{debug, info, warn};

use crate::animation::{AnimationScheduler, FieldState, FrameHost, TeardownReport, TickOutcome};
use crate::backend::{BackendError, RenderBackend, ResourceLedger};
use crate::camera::Viewport;
use crate::time::TimeSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("input listeners are already registered")]
    AlreadyRegistered,
    #[error("input listeners are not registered")]
    NotRegistered,
}

/// Pointer, touch and resize listeners of one activation.
///
/// Registration and deregistration must alternate; the counters let hosts and
/// tests check that every activation registered exactly once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerRegistry {
    active: bool,
    registrations: u64,
    deregistrations: u64,
}

impl ListenerRegistry {
    pub fn register(&mut self) -> Result<(), ListenerError> {
        if self.active {
            return Err(ListenerError::AlreadyRegistered);
        }
        self.active = true;
        self.registrations += 1;
        Ok(())
    }

    pub fn deregister(&mut self) -> Result<(), ListenerError> {
        if !self.active {
            return Err(ListenerError::NotRegistered);
        }
        self.active = false;
        self.deregistrations += 1;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn registrations(&self) -> u64 {
        self.registrations
    }

    pub fn deregistrations(&self) -> u64 {
        self.deregistrations
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// What the host sees of a field: mount, unmount, toggles, input routing.
///
/// While disabled nothing is allocated and frames do no work. A missing
/// rendering capability leaves the controller in passthrough instead of
/// failing the host.
pub struct FieldController<B: RenderBackend>
where
    B::Container: Clone,
{
    config: FieldConfig,
    container: B::Container,
    ledger: ResourceLedger,
    viewport: Viewport,
    variant: Option<String>,
    speaking: bool,
    enabled: bool,
    listeners: ListenerRegistry,
    field: Option<AnimationScheduler<B>>,
    last_report: Option<TeardownReport>,
}

impl<B: RenderBackend> FieldController<B>
where
    B::Container: Clone,
{
    pub fn new(
        config: FieldConfig,
        container: B::Container,
        viewport: Viewport,
        ledger: ResourceLedger,
    ) -> Self {
        Self {
            config,
            container,
            ledger,
            viewport,
            variant: None,
            speaking: false,
            enabled: false,
            listeners: ListenerRegistry::default(),
            field: None,
            last_report: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_mounted(&self) -> bool {
        self.field.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// The variant in effect: the selected one, or the configured default.
    pub fn variant(&self) -> &str {
        self.variant.as_deref().unwrap_or(&self.config.variant)
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn listeners(&self) -> ListenerRegistry {
        self.listeners
    }

    pub fn field(&self) -> Option<&AnimationScheduler<B>> {
        self.field.as_ref()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Report of the most recent teardown, if any.
    pub fn last_report(&self) -> Option<TeardownReport> {
        self.last_report
    }

    pub fn set_enabled(&mut self, enabled: bool, host: &mut dyn FrameHost) -> Result<(), FieldError> {
        if enabled == self.enabled {
            return Ok(());
        }
        self.enabled = enabled;
        if enabled {
            info!(variant = self.variant(), "particle field enabled");
            self.mount(host)
        } else {
            info!("particle field disabled");
            self.unmount()
        }
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        if speaking == self.speaking {
            return;
        }
        self.speaking = speaking;
        debug!(speaking, "speaking state changed");
        if let Some(field) = self.field.as_mut() {
            field.state_mut().set_speaking(speaking);
        }
    }

    /// Selects a preset. A mounted field is torn down and rebuilt with it.
    pub fn set_variant(&mut self, variant: &str, host: &mut dyn FrameHost) -> Result<(), FieldError> {
        self.config.resolve(Some(variant))?;
        if self.variant() == variant {
            return Ok(());
        }
        info!(variant, "switching variant");
        self.variant = Some(variant.to_string());
        if self.field.is_some() {
            self.unmount()?;
            self.mount(host)?;
        }
        Ok(())
    }

    /// Steps to the next variant in [`FieldConfig::variants`] order.
    pub fn cycle_variant(&mut self, host: &mut dyn FrameHost) -> Result<(), FieldError> {
        let variants = self.config.variants();
        let current = variants
            .iter()
            .position(|name| name == self.variant())
            .unwrap_or(0);
        let next = variants[(current + 1) % variants.len()].clone();
        self.set_variant(&next, host)
    }

    /// Pointer position in NDC. Ignored while no listeners are registered.
    pub fn handle_pointer(&mut self, x: f32, y: f32) {
        if !self.listeners.is_active() {
            return;
        }
        if let Some(field) = self.field.as_mut() {
            field.state_mut().set_pointer(x, y);
        }
    }

    /// Pointer or touch position in physical pixels.
    pub fn handle_pointer_pixels(&mut self, x: f64, y: f64) {
        if !self.listeners.is_active() {
            return;
        }
        if let Some(field) = self.field.as_mut() {
            field.state_mut().set_pointer_pixels(x, y);
        }
    }

    pub fn handle_resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport = Viewport::new(width, height);
        }
        if !self.listeners.is_active() {
            return;
        }
        if let Some(field) = self.field.as_mut() {
            field.resize(width, height);
        }
    }

    /// Host frame callback.
    pub fn on_frame(&mut self, sample: TimeSample, host: &mut dyn FrameHost) -> TickOutcome {
        match self.field.as_mut() {
            Some(field) => field.tick(sample, host),
            None => TickOutcome::Stopped,
        }
    }

    /// Unmounts the field if mounted. Safe to call repeatedly.
    pub fn shutdown(&mut self) -> Result<(), FieldError> {
        self.enabled = false;
        self.unmount()
    }

    fn mount(&mut self, host: &mut dyn FrameHost) -> Result<(), FieldError> {
        if self.field.is_some() {
            return Ok(());
        }
        let resolved = self.config.resolve(self.variant.as_deref())?;
        let backend = match B::create_surface(self.container.clone(), self.viewport, self.ledger.clone()) {
            Ok(backend) => backend,
            Err(BackendError::Unavailable(reason)) => {
                warn!(%reason, "rendering unavailable; particle field stays in passthrough");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let mut state = FieldState::new(&resolved, self.viewport);
        state.set_speaking(self.speaking);

        self.listeners.register()?;
        let mut field = AnimationScheduler::new(state, backend);
        field.start(host);
        debug!(
            variant = %resolved.variant,
            particles = field.state().layers().particle_count(),
            "particle field mounted"
        );
        self.field = Some(field);
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), FieldError> {
        let Some(field) = self.field.take() else {
            return Ok(());
        };
        self.listeners.deregister()?;
        let report = field.teardown();
        debug!(
            ticks = report.ticks,
            live = self.ledger.live(),
            "particle field unmounted"
        );
        self.last_report = Some(report);
        Ok(())
    }
}

impl<B: RenderBackend> Drop for FieldController<B>
where
    B::Container: Clone,
{
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "particle field shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::CountingHost;
    use crate::backend::{HeadlessBackend, HeadlessSurface};
    use crate::time::{FixedStepTimeSource, TimeSource};

    fn controller(surface: HeadlessSurface) -> FieldController<HeadlessBackend> {
        FieldController::new(
            FieldConfig::default(),
            surface,
            Viewport::new(800, 600),
            ResourceLedger::new(),
        )
    }

    #[test]
    fn failed_mount_releases_the_new_surface() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        controller.listeners.register().unwrap();

        let err = controller.set_enabled(true, &mut host).unwrap_err();
        assert!(matches!(err, FieldError::Listener(ListenerError::AlreadyRegistered)));
        assert!(!controller.is_mounted());
        assert_eq!(controller.ledger().allocated_total(), 1);
        assert_eq!(controller.ledger().live(), 0);
    }

    #[test]
    fn disabled_controller_allocates_nothing() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        let mut clock = FixedStepTimeSource::new(0.016);
        assert_eq!(controller.on_frame(clock.sample(), &mut host), TickOutcome::Stopped);
        controller.handle_pointer(0.5, 0.5);
        assert_eq!(controller.ledger().allocated_total(), 0);
        assert_eq!(host.requests, 0);
    }

    #[test]
    fn toggling_allocates_and_releases_once_per_transition() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        let mut clock = FixedStepTimeSource::new(0.016);

        controller.set_enabled(true, &mut host).unwrap();
        assert!(controller.is_mounted());
        assert_eq!(controller.ledger().allocated_total(), 1);
        for _ in 0..3 {
            controller.on_frame(clock.sample(), &mut host);
        }
        let allocated = controller.ledger().allocated_total();
        assert!(controller.ledger().live() > 1);

        controller.set_enabled(false, &mut host).unwrap();
        assert!(!controller.is_mounted());
        assert_eq!(controller.ledger().live(), 0);
        assert_eq!(controller.ledger().released_total(), allocated);
        assert_eq!(controller.last_report().unwrap().ticks, 3);

        // Repeated toggles are no-ops.
        controller.set_enabled(false, &mut host).unwrap();
        assert_eq!(controller.ledger().released_total(), allocated);

        let listeners = controller.listeners();
        assert_eq!(listeners.registrations(), 1);
        assert_eq!(listeners.deregistrations(), 1);
        assert_eq!(
            controller.on_frame(clock.sample(), &mut host),
            TickOutcome::Stopped
        );
    }

    #[test]
    fn variant_change_remounts_with_new_geometry() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        controller.set_enabled(true, &mut host).unwrap();
        let radius_a = controller.field().unwrap().state().layers().foreground().unwrap().spec().radius;

        controller.set_variant("b", &mut host).unwrap();
        assert_eq!(controller.variant(), "b");
        let field = controller.field().unwrap();
        assert_eq!(field.state().variant(), "b");
        let radius_b = field.state().layers().foreground().unwrap().spec().radius;
        assert!(radius_b < radius_a);

        let listeners = controller.listeners();
        assert_eq!(listeners.registrations(), 2);
        assert_eq!(listeners.deregistrations(), 1);
        assert!(listeners.is_active());
        assert_eq!(controller.ledger().live(), 1);
    }

    #[test]
    fn unknown_variant_is_rejected_without_remount() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        controller.set_enabled(true, &mut host).unwrap();
        let err = controller.set_variant("zzz", &mut host).unwrap_err();
        assert!(matches!(err, FieldError::Config(_)));
        assert_eq!(controller.variant(), "a");
        assert_eq!(controller.listeners().registrations(), 1);
    }

    #[test]
    fn cycle_variant_wraps_around() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        controller.cycle_variant(&mut host).unwrap();
        assert_eq!(controller.variant(), "b");
        controller.cycle_variant(&mut host).unwrap();
        assert_eq!(controller.variant(), "a");
        assert!(!controller.is_mounted());
    }

    #[test]
    fn missing_rendering_capability_fails_soft() {
        let mut controller = controller(HeadlessSurface::unavailable());
        let mut host = CountingHost::default();
        controller.set_enabled(true, &mut host).unwrap();
        assert!(controller.is_enabled());
        assert!(!controller.is_mounted());
        assert_eq!(controller.listeners().registrations(), 0);
        controller.set_enabled(false, &mut host).unwrap();
        assert_eq!(controller.listeners().deregistrations(), 0);
    }

    #[test]
    fn speaking_carries_into_new_mounts() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        controller.set_speaking(true);
        controller.set_enabled(true, &mut host).unwrap();
        assert!(controller.field().unwrap().state().speaking());
        controller.set_speaking(false);
        assert!(!controller.field().unwrap().state().speaking());
    }

    #[test]
    fn pointer_reaches_mounted_field() {
        let mut controller = controller(HeadlessSurface::new());
        let mut host = CountingHost::default();
        controller.set_enabled(true, &mut host).unwrap();
        controller.handle_pointer_pixels(800.0, 0.0);
        let target = controller.field().unwrap().state().input().target();
        assert_eq!(target, glam::Vec2::new(1.0, 1.0));
    }

    #[test]
    fn listener_registry_rejects_unbalanced_calls() {
        let mut registry = ListenerRegistry::default();
        assert_eq!(registry.deregister(), Err(ListenerError::NotRegistered));
        registry.register().unwrap();
        assert_eq!(registry.register(), Err(ListenerError::AlreadyRegistered));
        registry.deregister().unwrap();
        assert_eq!(registry.registrations(), 1);
        assert_eq!(registry.deregistrations(), 1);
    }

    #[test]
    fn dropping_the_controller_releases_resources() {
        let ledger = ResourceLedger::new();
        {
            let mut controller = FieldController::<HeadlessBackend>::new(
                FieldConfig::default(),
                HeadlessSurface::new(),
                Viewport::new(320, 200),
                ledger.clone(),
            );
            let mut host = CountingHost::default();
            controller.set_enabled(true, &mut host).unwrap();
        }
        assert_eq!(ledger.live(), 0);
    }
}
