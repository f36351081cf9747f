use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Variant that is always available and leaves the configured geometry untouched.
pub const BASE_VARIANT: &str = "a";

const NEAR_SHELL_RADIUS: f32 = 150.0;
const SHELL_RADIUS_STEP: f32 = 55.0;
const GLOW_SIZE_FACTOR: f32 = 4.0;
const GLOW_SPEED_FACTOR: f32 = 0.15;
const GLOW_OPACITY: f32 = 0.12;
const GLOW_DEPTH_OFFSET: f32 = -40.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Linear RGB triple, written as `#rrggbb` in TOML.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub fn from_hex(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(format!("invalid color '{trimmed}'; expected #rrggbb"));
        }
        let channel = |offset: usize| -> Result<f32, String> {
            u8::from_str_radix(&digits[offset..offset + 2], 16)
                .map(|value| value as f32 / 255.0)
                .map_err(|err| format!("invalid color '{trimmed}': {err}"))
        };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl Serialize for Rgb {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Rgb::from_hex(&raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PaletteEntry {
    pub color: Rgb,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    pub version: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default)]
    pub field: FieldSettings,
    #[serde(default = "default_palette")]
    pub palette: Vec<PaletteEntry>,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub profiles: Profiles,
    #[serde(default = "default_presets")]
    pub presets: BTreeMap<String, Preset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldSettings {
    pub layers: Vec<LayerSettings>,
    pub glow_particle_count: u32,
    pub connection_threshold: f32,
    pub connection_cap: u32,
    pub connection_stride: u32,
    pub mouse_influence_radius: f32,
    pub force_scale: f32,
    pub easing_factor: f32,
    pub boundary: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LayerSettings {
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub base_depth: f32,
    #[serde(default = "default_layer_size")]
    pub size: f32,
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f32,
    #[serde(default = "default_layer_opacity")]
    pub opacity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraSettings {
    pub pan_scale: f32,
    pub easing: f32,
    pub base_z: f32,
    pub breath_amplitude: f32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub breath_period: Duration,
    pub fov_degrees: f32,
}

/// Animation constants. Switching profiles never changes the algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnimationProfile {
    pub pulse_speed: f32,
    pub pulse_amplitude: f32,
    pub wave_frequency: f32,
    pub wave_amplitude: f32,
    pub breath_scale: f32,
    pub line_opacity: f32,
}

/// The two named profiles. Fields missing from a partially specified
/// profile fall back to that profile's built-in values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profiles {
    #[serde(
        default = "AnimationProfile::idle",
        deserialize_with = "deserialize_idle"
    )]
    pub idle: AnimationProfile,
    #[serde(
        default = "AnimationProfile::speaking",
        deserialize_with = "deserialize_speaking"
    )]
    pub speaking: AnimationProfile,
}

/// A profile table as written; unset keys are filled from a base profile.
#[derive(Debug, Default, Deserialize)]
struct PartialProfile {
    pulse_speed: Option<f32>,
    pulse_amplitude: Option<f32>,
    wave_frequency: Option<f32>,
    wave_amplitude: Option<f32>,
    breath_scale: Option<f32>,
    line_opacity: Option<f32>,
}

impl PartialProfile {
    fn over(self, base: AnimationProfile) -> AnimationProfile {
        AnimationProfile {
            pulse_speed: self.pulse_speed.unwrap_or(base.pulse_speed),
            pulse_amplitude: self.pulse_amplitude.unwrap_or(base.pulse_amplitude),
            wave_frequency: self.wave_frequency.unwrap_or(base.wave_frequency),
            wave_amplitude: self.wave_amplitude.unwrap_or(base.wave_amplitude),
            breath_scale: self.breath_scale.unwrap_or(base.breath_scale),
            line_opacity: self.line_opacity.unwrap_or(base.line_opacity),
        }
    }
}

fn deserialize_idle<'de, D>(deserializer: D) -> Result<AnimationProfile, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PartialProfile::deserialize(deserializer)?.over(AnimationProfile::idle()))
}

fn deserialize_speaking<'de, D>(deserializer: D) -> Result<AnimationProfile, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PartialProfile::deserialize(deserializer)?.over(AnimationProfile::speaking()))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Preset {
    #[serde(default = "default_scale")]
    pub radius_scale: f32,
    #[serde(default = "default_scale")]
    pub size_scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<PaletteEntry>>,
}

/// Layer parameters after variant and default resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    pub name: String,
    pub count: u32,
    pub base_depth: f32,
    pub size: f32,
    pub speed_factor: f32,
    pub opacity: f32,
    pub radius: f32,
    /// 1.0 for the nearest layer, smaller for layers further back.
    pub depth_factor: f32,
}

/// Everything the simulation needs, with presets applied.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub seed: u64,
    pub variant: String,
    /// Back-to-front; the glow layer, when present, comes first.
    pub layers: Vec<ResolvedLayer>,
    pub palette: Vec<PaletteEntry>,
    pub connection_threshold: f32,
    pub connection_cap: usize,
    pub connection_stride: usize,
    pub mouse_influence_radius: f32,
    pub force_scale: f32,
    pub easing_factor: f32,
    pub boundary: f32,
    pub camera: CameraSettings,
    pub profiles: Profiles,
}

impl ResolvedField {
    /// Index of the nearest layer, which feeds the connection graph.
    pub fn foreground_index(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            version: 1,
            seed: default_seed(),
            variant: default_variant(),
            field: FieldSettings::default(),
            palette: default_palette(),
            camera: CameraSettings::default(),
            profiles: Profiles::default(),
            presets: default_presets(),
        }
    }
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            layers: vec![
                LayerSettings {
                    name: "far".into(),
                    count: 1500,
                    base_depth: -120.0,
                    size: 1.2,
                    speed_factor: 0.3,
                    opacity: 0.35,
                    radius: None,
                },
                LayerSettings {
                    name: "mid".into(),
                    count: 1000,
                    base_depth: -50.0,
                    size: 1.8,
                    speed_factor: 0.6,
                    opacity: 0.55,
                    radius: None,
                },
                LayerSettings {
                    name: "near".into(),
                    count: 500,
                    base_depth: 0.0,
                    size: 2.6,
                    speed_factor: 1.0,
                    opacity: 0.8,
                    radius: None,
                },
            ],
            glow_particle_count: 60,
            connection_threshold: 40.0,
            connection_cap: 150,
            connection_stride: 5,
            mouse_influence_radius: 120.0,
            force_scale: 0.05,
            easing_factor: 0.05,
            boundary: 300.0,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            pan_scale: 60.0,
            easing: 0.03,
            base_z: 420.0,
            breath_amplitude: 12.0,
            breath_period: Duration::from_secs(8),
            fov_degrees: 75.0,
        }
    }
}

impl AnimationProfile {
    pub fn idle() -> Self {
        Self {
            pulse_speed: 0.6,
            pulse_amplitude: 0.08,
            wave_frequency: 0.8,
            wave_amplitude: 2.0,
            breath_scale: 1.0,
            line_opacity: 0.25,
        }
    }

    pub fn speaking() -> Self {
        Self {
            pulse_speed: 3.2,
            pulse_amplitude: 0.2,
            wave_frequency: 2.4,
            wave_amplitude: 6.0,
            breath_scale: 0.4,
            line_opacity: 0.4,
        }
    }
}

impl Default for AnimationProfile {
    fn default() -> Self {
        Self::idle()
    }
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            idle: AnimationProfile::idle(),
            speaking: AnimationProfile::speaking(),
        }
    }
}

impl AnimationProfile {
    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let values = [
            ("pulse_speed", self.pulse_speed),
            ("pulse_amplitude", self.pulse_amplitude),
            ("wave_frequency", self.wave_frequency),
            ("wave_amplitude", self.wave_amplitude),
            ("breath_scale", self.breath_scale),
            ("line_opacity", self.line_opacity),
        ];
        for (key, value) in values {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "profiles.{label}.{key} must be finite"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.line_opacity) {
            return Err(ConfigError::Invalid(format!(
                "profiles.{label}.line_opacity must be within 0..=1"
            )));
        }
        Ok(())
    }
}

impl Profiles {
    pub fn select(&self, speaking: bool) -> AnimationProfile {
        if speaking {
            self.speaking
        } else {
            self.idle
        }
    }
}

fn default_seed() -> u64 {
    0x5eed
}

fn default_variant() -> String {
    BASE_VARIANT.to_string()
}

fn default_weight() -> f32 {
    1.0
}

fn default_scale() -> f32 {
    1.0
}

fn default_layer_size() -> f32 {
    1.5
}

fn default_speed_factor() -> f32 {
    1.0
}

fn default_layer_opacity() -> f32 {
    0.6
}

fn palette_entry(hex: &str, weight: f32) -> PaletteEntry {
    PaletteEntry {
        color: Rgb::from_hex(hex).unwrap_or(Rgb([1.0, 1.0, 1.0])),
        weight,
    }
}

fn default_palette() -> Vec<PaletteEntry> {
    vec![
        palette_entry("#5ec8ff", 3.0),
        palette_entry("#8a7dff", 2.0),
        palette_entry("#c4f1ff", 1.0),
        palette_entry("#ff9ad5", 0.5),
    ]
}

fn default_presets() -> BTreeMap<String, Preset> {
    let mut presets = BTreeMap::new();
    presets.insert(
        "b".to_string(),
        Preset {
            radius_scale: 0.6,
            size_scale: 1.2,
            palette: Some(vec![
                palette_entry("#ff7ab6", 2.0),
                palette_entry("#ffc46b", 1.5),
                palette_entry("#fff1d6", 1.0),
            ]),
        },
    );
    presets
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl FieldConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: FieldConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Names of every selectable variant, the base variant first.
    pub fn variants(&self) -> Vec<String> {
        let mut names = vec![BASE_VARIANT.to_string()];
        names.extend(
            self.presets
                .keys()
                .filter(|name| name.as_str() != BASE_VARIANT)
                .cloned(),
        );
        names
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let field = &self.field;
        if field.layers.is_empty() {
            return Err(ConfigError::Invalid(
                "field must define at least one layer".into(),
            ));
        }

        for layer in &field.layers {
            let name = layer.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("layer name may not be empty".into()));
            }
            if layer.count == 0 {
                return Err(ConfigError::Invalid(format!(
                    "layer '{name}' count must be greater than zero"
                )));
            }
            if !positive(layer.size) {
                return Err(ConfigError::Invalid(format!(
                    "layer '{name}' size must be a positive number"
                )));
            }
            if !layer.speed_factor.is_finite() || layer.speed_factor < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "layer '{name}' speed_factor must be >= 0"
                )));
            }
            if !layer.base_depth.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "layer '{name}' base_depth must be finite"
                )));
            }
            if !(0.0..=1.0).contains(&layer.opacity) {
                return Err(ConfigError::Invalid(format!(
                    "layer '{name}' opacity must be within 0..=1"
                )));
            }
            if let Some(radius) = layer.radius {
                if !positive(radius) {
                    return Err(ConfigError::Invalid(format!(
                        "layer '{name}' radius must be a positive number"
                    )));
                }
            }
        }

        if !positive(field.boundary) {
            return Err(ConfigError::Invalid("field.boundary must be > 0".into()));
        }
        if !positive(field.connection_threshold) {
            return Err(ConfigError::Invalid(
                "field.connection_threshold must be > 0".into(),
            ));
        }
        if field.connection_stride == 0 {
            return Err(ConfigError::Invalid(
                "field.connection_stride must be at least 1".into(),
            ));
        }
        if !positive(field.mouse_influence_radius) {
            return Err(ConfigError::Invalid(
                "field.mouse_influence_radius must be > 0".into(),
            ));
        }
        if !field.force_scale.is_finite() || field.force_scale < 0.0 {
            return Err(ConfigError::Invalid("field.force_scale must be >= 0".into()));
        }
        if !(field.easing_factor > 0.0 && field.easing_factor <= 1.0) {
            return Err(ConfigError::Invalid(
                "field.easing_factor must be within (0, 1]".into(),
            ));
        }
        if !(self.camera.easing > 0.0 && self.camera.easing <= 1.0) {
            return Err(ConfigError::Invalid(
                "camera.easing must be within (0, 1]".into(),
            ));
        }
        if !positive(self.camera.fov_degrees) || self.camera.fov_degrees >= 180.0 {
            return Err(ConfigError::Invalid(
                "camera.fov_degrees must be within (0, 180)".into(),
            ));
        }
        for (key, value) in [
            ("pan_scale", self.camera.pan_scale),
            ("base_z", self.camera.base_z),
            ("breath_amplitude", self.camera.breath_amplitude),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("camera.{key} must be finite")));
            }
        }
        // The camera looks at the origin; sitting on it leaves no view direction.
        if self.camera.base_z == 0.0 {
            return Err(ConfigError::Invalid("camera.base_z must not be zero".into()));
        }
        self.profiles.idle.validate("idle")?;
        self.profiles.speaking.validate("speaking")?;

        validate_palette("palette", &self.palette)?;
        for (name, preset) in &self.presets {
            if !positive(preset.radius_scale) || !positive(preset.size_scale) {
                return Err(ConfigError::Invalid(format!(
                    "preset '{name}' scales must be positive"
                )));
            }
            if let Some(palette) = &preset.palette {
                validate_palette(&format!("preset '{name}' palette"), palette)?;
            }
        }

        if self.variant != BASE_VARIANT && !self.presets.contains_key(&self.variant) {
            return Err(ConfigError::Invalid(format!(
                "variant references unknown preset '{}'",
                self.variant
            )));
        }

        Ok(())
    }

    /// Applies the requested variant (or the configured one) and derives
    /// per-layer radii and depth factors.
    pub fn resolve(&self, variant: Option<&str>) -> Result<ResolvedField, ConfigError> {
        let variant = variant.unwrap_or(&self.variant);
        let preset = if variant == BASE_VARIANT {
            self.presets.get(BASE_VARIANT)
        } else {
            Some(self.presets.get(variant).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown variant '{variant}'"))
            })?)
        };
        let radius_scale = preset.map(|p| p.radius_scale).unwrap_or(1.0);
        let size_scale = preset.map(|p| p.size_scale).unwrap_or(1.0);
        let palette = preset
            .and_then(|p| p.palette.clone())
            .unwrap_or_else(|| self.palette.clone());

        let count = self.field.layers.len();
        if count == 0 {
            return Err(ConfigError::Invalid(
                "field must define at least one layer".into(),
            ));
        }
        let mut layers = Vec::with_capacity(count + 1);
        for (index, layer) in self.field.layers.iter().enumerate() {
            let depth_rank = (count - 1 - index) as f32;
            let radius = layer
                .radius
                .unwrap_or(NEAR_SHELL_RADIUS + SHELL_RADIUS_STEP * depth_rank);
            layers.push(ResolvedLayer {
                name: layer.name.clone(),
                count: layer.count,
                base_depth: layer.base_depth,
                size: layer.size * size_scale,
                speed_factor: layer.speed_factor,
                opacity: layer.opacity,
                radius: radius * radius_scale,
                depth_factor: (index + 1) as f32 / count as f32,
            });
        }

        if self.field.glow_particle_count > 0 {
            let back = &layers[0];
            let glow = ResolvedLayer {
                name: "glow".to_string(),
                count: self.field.glow_particle_count,
                base_depth: back.base_depth + GLOW_DEPTH_OFFSET,
                size: back.size * GLOW_SIZE_FACTOR,
                speed_factor: GLOW_SPEED_FACTOR,
                opacity: GLOW_OPACITY,
                radius: back.radius * 1.1,
                depth_factor: 0.5 / count as f32,
            };
            layers.insert(0, glow);
        }

        Ok(ResolvedField {
            seed: self.seed,
            variant: variant.to_string(),
            layers,
            palette,
            connection_threshold: self.field.connection_threshold,
            connection_cap: self.field.connection_cap as usize,
            connection_stride: self.field.connection_stride as usize,
            mouse_influence_radius: self.field.mouse_influence_radius,
            force_scale: self.field.force_scale,
            easing_factor: self.field.easing_factor,
            boundary: self.field.boundary,
            camera: self.camera.clone(),
            profiles: self.profiles.clone(),
        })
    }
}

fn validate_palette(label: &str, palette: &[PaletteEntry]) -> Result<(), ConfigError> {
    if palette.is_empty() {
        return Err(ConfigError::Invalid(format!("{label} must not be empty")));
    }
    if palette
        .iter()
        .any(|entry| !entry.weight.is_finite() || entry.weight < 0.0)
    {
        return Err(ConfigError::Invalid(format!(
            "{label} weights must be non-negative"
        )));
    }
    let total: f32 = palette.iter().map(|entry| entry.weight).sum();
    if total <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{label} weights must sum to more than zero"
        )));
    }
    Ok(())
}
