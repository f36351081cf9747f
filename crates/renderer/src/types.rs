use fieldconfig::FieldConfig;

/// Anti-aliasing policy for the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antialiasing {
    /// Pick the highest sample count supported by the surface format.
    #[default]
    Auto,
    /// Disable MSAA and render directly into the swapchain.
    Off,
    /// Request a specific MSAA sample count (clamped to what the device supports).
    Samples(u32),
}

/// What the selected adapter turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    /// CPU rasterizers (llvmpipe, SwiftShader, WARP) get a lower frame cap.
    pub fn is_software(&self) -> bool {
        if self.device_type == wgpu::DeviceType::Cpu {
            return true;
        }
        let name = self.name.to_ascii_lowercase();
        ["llvmpipe", "softpipe", "swiftshader", "microsoft basic render"]
            .iter()
            .any(|needle| name.contains(needle))
    }
}

/// Configuration handed to the window host at start-up.
///
/// Mirrors the CLI flags: the field configuration itself plus the initial
/// toggles the host should apply before the first frame.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Optional FPS cap; `None` renders on every redraw.
    pub target_fps: Option<f32>,
    pub antialiasing: Antialiasing,
    pub field: FieldConfig,
    /// Variant to mount first; `None` uses the configured one.
    pub variant: Option<String>,
    pub speaking: bool,
    pub enabled: bool,
    pub show_window: bool,
    /// Background colour behind the additive particles.
    pub clear_color: [f64; 3],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            target_fps: None,
            antialiasing: Antialiasing::default(),
            field: FieldConfig::default(),
            variant: None,
            speaking: false,
            enabled: true,
            show_window: true,
            clear_color: [0.01, 0.012, 0.03],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, device_type: wgpu::DeviceType) -> AdapterProfile {
        AdapterProfile {
            name: name.into(),
            backend: wgpu::Backend::Vulkan,
            device_type,
            max_texture_dimension: 8192,
        }
    }

    #[test]
    fn detects_software_adapters() {
        assert!(profile("llvmpipe (LLVM 17.0.6, 256 bits)", wgpu::DeviceType::Cpu).is_software());
        assert!(profile("SwiftShader Device", wgpu::DeviceType::Other).is_software());
        assert!(!profile("AMD Radeon RX 7800 XT", wgpu::DeviceType::DiscreteGpu).is_software());
    }

    #[test]
    fn default_config_starts_enabled() {
        let config = RendererConfig::default();
        assert!(config.enabled);
        assert!(!config.speaking);
        assert_eq!(config.antialiasing, Antialiasing::Auto);
    }
}
