use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use particles::{
    FieldController, FrameHost, ResourceLedger, SystemTimeSource, TickOutcome, TimeSource,
    Viewport,
};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::gpu::{GpuBackend, GpuSurfaceTarget};
use crate::runtime::FramePacer;
use crate::types::{AdapterProfile, RendererConfig};

const SOFTWARE_FPS_CAP: f32 = 15.0;

/// Control messages forwarded to the window thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldCommand {
    SetEnabled(bool),
    SetSpeaking(bool),
    SetVariant(String),
    CycleVariant,
    Shutdown,
}

/// Frame host for the window thread: a requested frame becomes a redraw once
/// the pacer allows it.
#[derive(Debug, Default)]
struct RedrawFlag {
    requested: bool,
}

impl FrameHost for RedrawFlag {
    fn request_frame(&mut self) {
        self.requested = true;
    }
}

/// Handle to the window thread. Dropping it shuts the window down.
pub struct WindowRuntime {
    proxy: EventLoopProxy<FieldCommand>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl WindowRuntime {
    pub fn spawn(config: RendererConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("driftfield-window".into())
            .spawn(move || run_window_thread(config, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            join_handle: Some(handle),
        })
    }

    pub fn send(&self, command: FieldCommand) -> Result<()> {
        self.proxy
            .send_event(command)
            .map_err(|err| anyhow!("window is gone: {err}"))
    }

    /// True once the window has closed on its own (close button, Escape).
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(FieldCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(FieldCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    config: RendererConfig,
    ready_tx: Sender<Result<EventLoopProxy<FieldCommand>, anyhow::Error>>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<FieldCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = builder
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let proxy = event_loop.create_proxy();

    let (width, height) = config.surface_size;
    let mut window_builder = WindowBuilder::new()
        .with_title("driftfield")
        .with_inner_size(PhysicalSize::new(width, height));
    if !config.show_window {
        window_builder = window_builder.with_visible(false);
    }
    let window = Arc::new(
        window_builder
            .build(&event_loop)
            .map_err(|err| anyhow!("failed to create window: {err}"))?,
    );

    let size = window.inner_size();
    let target = GpuSurfaceTarget {
        window: window.clone(),
        antialiasing: config.antialiasing,
        clear_color: config.clear_color,
    };
    let mut controller = FieldController::<GpuBackend>::new(
        config.field.clone(),
        target,
        Viewport::new(size.width.max(1), size.height.max(1)),
        ResourceLedger::new(),
    );
    let mut host = RedrawFlag::default();

    let init = (|| -> Result<()> {
        if let Some(variant) = config.variant.as_deref() {
            controller.set_variant(variant, &mut host)?;
        }
        controller.set_speaking(config.speaking);
        controller.set_enabled(config.enabled, &mut host)?;
        Ok(())
    })();
    if let Err(err) = init {
        let message = format!("failed to initialise particle field: {err:#}");
        let _ = ready_tx.send(Err(anyhow!(message.clone())));
        return Err(anyhow!(message));
    }

    let mut pacer = FramePacer::new(config.target_fps);
    let mut software_cap = SoftwareCap::new(config.target_fps);
    software_cap.apply(adapter_of(&controller), &mut pacer);

    let mut time = SystemTimeSource::new();
    let _ = ready_tx.send(Ok(proxy));
    info!(
        width = size.width,
        height = size.height,
        enabled = controller.is_enabled(),
        variant = controller.variant(),
        "window ready"
    );

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(command) => {
            debug!(?command, "window command");
            let result = match command {
                FieldCommand::SetEnabled(enabled) => {
                    if enabled && !controller.is_enabled() {
                        time.reset();
                        pacer.reset();
                    }
                    controller.set_enabled(enabled, &mut host)
                }
                FieldCommand::SetSpeaking(speaking) => {
                    controller.set_speaking(speaking);
                    Ok(())
                }
                FieldCommand::SetVariant(variant) => controller.set_variant(&variant, &mut host),
                FieldCommand::CycleVariant => controller.cycle_variant(&mut host),
                FieldCommand::Shutdown => {
                    elwt.exit();
                    Ok(())
                }
            };
            if let Err(err) = result {
                error!(error = %err, "command failed");
            }
            software_cap.apply(adapter_of(&controller), &mut pacer);
        }
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                let result = match shortcut(&event) {
                    Some(Shortcut::ToggleSpeaking) => {
                        controller.set_speaking(!controller.is_speaking());
                        Ok(())
                    }
                    Some(Shortcut::ToggleEnabled) => {
                        if !controller.is_enabled() {
                            time.reset();
                            pacer.reset();
                        }
                        controller.set_enabled(!controller.is_enabled(), &mut host)
                    }
                    Some(Shortcut::CycleVariant) => controller.cycle_variant(&mut host),
                    Some(Shortcut::Exit) => {
                        elwt.exit();
                        Ok(())
                    }
                    None => Ok(()),
                };
                if let Err(err) = result {
                    error!(error = %err, "keyboard shortcut failed");
                }
                software_cap.apply(adapter_of(&controller), &mut pacer);
            }
            WindowEvent::CursorMoved { position, .. } => {
                controller.handle_pointer_pixels(position.x, position.y);
            }
            WindowEvent::Touch(touch) => {
                controller.handle_pointer_pixels(touch.location.x, touch.location.y);
            }
            WindowEvent::Resized(new_size) => {
                controller.handle_resize(new_size.width, new_size.height);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let _ = inner_size_writer.request_inner_size(window.inner_size());
            }
            WindowEvent::RedrawRequested => {
                if !host.requested {
                    return;
                }
                host.requested = false;
                let now = Instant::now();
                let outcome = controller.on_frame(time.sample(), &mut host);
                pacer.mark_rendered(now);
                if outcome == TickOutcome::Stopped && controller.is_mounted() {
                    error!("particle field stopped after a fatal render error; closing window");
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if !host.requested {
                elwt.set_control_flow(ControlFlow::Wait);
            } else if pacer.ready_for_frame(now) {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = pacer.next_deadline() {
                tracing::trace!(
                    deadline_ms = deadline.saturating_duration_since(now).as_millis(),
                    "waiting until next frame"
                );
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
        }
        Event::LoopExiting => {
            if let Err(err) = controller.shutdown() {
                warn!(error = %err, "particle field shutdown failed");
            }
            debug!(live = controller.ledger().live(), "window closing");
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn adapter_of(controller: &FieldController<GpuBackend>) -> Option<&AdapterProfile> {
    controller.field().map(|field| field.backend().adapter_profile())
}

/// Caps software rasterizers to [`SOFTWARE_FPS_CAP`] the first time a field
/// mounts, unless the user asked for an explicit rate.
#[derive(Debug)]
struct SoftwareCap {
    explicit_fps: Option<f32>,
    checked: bool,
}

impl SoftwareCap {
    fn new(explicit_fps: Option<f32>) -> Self {
        Self {
            explicit_fps,
            checked: false,
        }
    }

    /// Returns true when the pacer was replaced.
    fn apply(&mut self, adapter: Option<&AdapterProfile>, pacer: &mut FramePacer) -> bool {
        if self.checked {
            return false;
        }
        let Some(profile) = adapter else {
            return false;
        };
        self.checked = true;
        if !profile.is_software() || self.explicit_fps.is_some() {
            return false;
        }
        warn!(
            adapter = %profile.name,
            backend = ?profile.backend,
            cap = SOFTWARE_FPS_CAP,
            "software rasterizer detected; capping to {} FPS (override with --fps)",
            SOFTWARE_FPS_CAP
        );
        *pacer = FramePacer::new(Some(SOFTWARE_FPS_CAP));
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortcut {
    ToggleSpeaking,
    ToggleEnabled,
    CycleVariant,
    Exit,
}

fn shortcut(event: &KeyEvent) -> Option<Shortcut> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => Some(Shortcut::Exit),
        Key::Character(value) => shortcut_for_char(value.as_str()),
        _ => None,
    }
}

fn shortcut_for_char(value: &str) -> Option<Shortcut> {
    match value.to_ascii_lowercase().as_str() {
        "s" => Some(Shortcut::ToggleSpeaking),
        "e" => Some(Shortcut::ToggleEnabled),
        "v" => Some(Shortcut::CycleVariant),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_ignore_case() {
        assert_eq!(shortcut_for_char("S"), Some(Shortcut::ToggleSpeaking));
        assert_eq!(shortcut_for_char("e"), Some(Shortcut::ToggleEnabled));
        assert_eq!(shortcut_for_char("v"), Some(Shortcut::CycleVariant));
        assert_eq!(shortcut_for_char("x"), None);
        assert_eq!(shortcut_for_char("ss"), None);
    }

    fn adapter(name: &str, device_type: wgpu::DeviceType) -> AdapterProfile {
        AdapterProfile {
            name: name.into(),
            backend: wgpu::Backend::Vulkan,
            device_type,
            max_texture_dimension: 8192,
        }
    }

    #[test]
    fn software_cap_waits_for_a_mounted_field() {
        let mut cap = SoftwareCap::new(None);
        let mut pacer = FramePacer::new(None);
        // Started disabled: nothing mounted yet.
        assert!(!cap.apply(None, &mut pacer));
        assert_eq!(pacer.target_interval(), None);

        let llvmpipe = adapter("llvmpipe (LLVM 17.0.6, 256 bits)", wgpu::DeviceType::Cpu);
        assert!(cap.apply(Some(&llvmpipe), &mut pacer));
        assert_eq!(
            pacer.target_interval(),
            FramePacer::new(Some(SOFTWARE_FPS_CAP)).target_interval()
        );
        assert!(!cap.apply(Some(&llvmpipe), &mut pacer));
    }

    #[test]
    fn software_cap_respects_explicit_rate_and_hardware() {
        let mut pacer = FramePacer::new(Some(30.0));
        let llvmpipe = adapter("llvmpipe", wgpu::DeviceType::Cpu);
        assert!(!SoftwareCap::new(Some(30.0)).apply(Some(&llvmpipe), &mut pacer));
        assert_eq!(pacer.target_interval(), FramePacer::new(Some(30.0)).target_interval());

        let mut pacer = FramePacer::new(None);
        let discrete = adapter("Radeon RX 7800", wgpu::DeviceType::DiscreteGpu);
        assert!(!SoftwareCap::new(None).apply(Some(&discrete), &mut pacer));
        assert_eq!(pacer.target_interval(), None);
    }

    #[test]
    fn redraw_flag_records_requests() {
        let mut flag = RedrawFlag::default();
        assert!(!flag.requested);
        flag.request_frame();
        assert!(flag.requested);
    }
}
