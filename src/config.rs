//! Configuration types for fbcompositor

use crate::error::{Error, Result};
use crate::types::{PixelFormat, Resolution, MAX_DIMENSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level compositor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Display surface selection
    pub surface: SurfaceConfig,
    /// Resolution negotiation policy
    pub scale: ScaleConfig,
    /// Render loop settings
    pub render: RenderConfig,
}

impl CompositorConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check invariants the negotiator and render loop rely on
    pub fn validate(&self) -> Result<()> {
        self.scale.validate()?;
        if self.render.notify_capacity == 0 {
            return Err(Error::Config("render.notify_capacity must be >= 1".into()));
        }
        let mem = &self.surface.memory;
        if mem.width == 0 || mem.height == 0 || mem.pages == 0 {
            return Err(Error::Config(
                "surface.memory width, height and pages must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn with_backend(mut self, backend: SurfaceBackend) -> Self {
        self.surface.backend = backend;
        self
    }

    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.surface.device = device.into();
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.surface.pixel_format = Some(format);
        self
    }

    pub fn with_memory_surface(mut self, width: u32, height: u32, pages: u32) -> Self {
        self.surface.backend = SurfaceBackend::Memory;
        self.surface.memory = MemorySurfaceConfig { width, height, pages };
        self
    }

    pub fn with_scale_preset(mut self, preset: ScalePreset) -> Self {
        self.scale = preset.into();
        self
    }

    pub fn with_render_interval_ms(mut self, interval_ms: u64) -> Self {
        self.render.interval_ms = interval_ms;
        self
    }
}

/// Display surface backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceBackend {
    /// Probe available backends in order
    #[default]
    Auto,
    /// Linux fbdev device (`/dev/fb*`)
    Fbdev,
    /// Heap-backed headless surface
    Memory,
}

/// Surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub backend: SurfaceBackend,
    /// fbdev device node
    pub device: PathBuf,
    /// Override the pixel format the backend reports
    pub pixel_format: Option<PixelFormat>,
    /// Geometry for the memory backend
    pub memory: MemorySurfaceConfig,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            backend: SurfaceBackend::Auto,
            device: PathBuf::from("/dev/fb0"),
            pixel_format: None,
            memory: MemorySurfaceConfig::default(),
        }
    }
}

/// Headless surface geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySurfaceConfig {
    pub width: u32,
    pub height: u32,
    /// Number of stacked pages (3 = triple buffered)
    pub pages: u32,
}

impl Default for MemorySurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            pages: 1,
        }
    }
}

/// One resolution tier: sources taller than `above_height` are divided by `factor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleTier {
    pub above_height: u32,
    pub factor: u32,
}

impl ScaleTier {
    pub const fn new(above_height: u32, factor: u32) -> Self {
        Self { above_height, factor }
    }
}

/// Resolution negotiation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Tiers by threshold; the highest `above_height` below the source wins
    pub tiers: Vec<ScaleTier>,
    /// Factor when no tier matches
    pub default_factor: u32,
    /// Smallest negotiated width
    pub min_width: u32,
    /// Smallest negotiated height
    pub min_height: u32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScalePreset::LowPower.into()
    }
}

impl ScaleConfig {
    pub fn floor(&self) -> Resolution {
        Resolution::new(self.min_width, self.min_height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_factor == 0 || self.tiers.iter().any(|t| t.factor == 0) {
            return Err(Error::Config("scale factors must be >= 1".into()));
        }
        if self.min_width < 2 || self.min_height < 2 {
            return Err(Error::Config("scale floor must be at least 2x2".into()));
        }
        if self.min_width % 2 != 0 || self.min_height % 2 != 0 {
            return Err(Error::Config("scale floor dimensions must be even".into()));
        }
        if self.min_width > MAX_DIMENSION || self.min_height > MAX_DIMENSION {
            return Err(Error::Config(format!(
                "scale floor must not exceed {}x{}",
                MAX_DIMENSION, MAX_DIMENSION
            )));
        }
        Ok(())
    }
}

/// High-level negotiation presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScalePreset {
    /// 1080p+ /8, 720p /5, SD /2 (weak ARM CPUs)
    #[default]
    LowPower,
    /// 1080p+ /4, 720p /2, SD native
    Balanced,
    /// No downscaling
    Native,
}

impl ScalePreset {
    pub fn description(&self) -> &'static str {
        match self {
            ScalePreset::LowPower => ">900p /8, >600p /5, else /2, floor 160x90",
            ScalePreset::Balanced => ">900p /4, >600p /2, else /1, floor 160x90",
            ScalePreset::Native => "always /1, floor 160x90",
        }
    }
}

impl From<ScalePreset> for ScaleConfig {
    fn from(preset: ScalePreset) -> Self {
        let (tiers, default_factor) = match preset {
            ScalePreset::LowPower => (vec![ScaleTier::new(900, 8), ScaleTier::new(600, 5)], 2),
            ScalePreset::Balanced => (vec![ScaleTier::new(900, 4), ScaleTier::new(600, 2)], 1),
            ScalePreset::Native => (Vec::new(), 1),
        };
        ScaleConfig {
            tiers,
            default_factor,
            min_width: 160,
            min_height: 90,
        }
    }
}

/// Render loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Periodic render tick while playing, in ms (0 = frame-ready only)
    pub interval_ms: u64,
    /// Capacity of the frame-ready notification channel
    pub notify_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            interval_ms: 16, // ~60fps
            notify_capacity: 4,
        }
    }
}

impl RenderConfig {
    pub fn interval(&self) -> Option<std::time::Duration> {
        (self.interval_ms > 0).then(|| std::time::Duration::from_millis(self.interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_tiers() {
        let scale = ScaleConfig::default();
        assert_eq!(scale.tiers, vec![ScaleTier::new(900, 8), ScaleTier::new(600, 5)]);
        assert_eq!(scale.default_factor, 2);
        assert_eq!(scale.floor(), Resolution::new(160, 90));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CompositorConfig::from_toml_str(
            r#"
            [surface]
            backend = "memory"
            pixel_format = "rgba"

            [surface.memory]
            width = 800
            height = 480
            pages = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.surface.backend, SurfaceBackend::Memory);
        assert_eq!(config.surface.pixel_format, Some(PixelFormat::Rgba));
        assert_eq!(config.surface.memory.pages, 3);
        assert_eq!(config.surface.device, PathBuf::from("/dev/fb0"));
        assert_eq!(config.scale, ScaleConfig::default());
        assert_eq!(config.render.interval_ms, 16);
    }

    #[test]
    fn test_rejects_zero_factor() {
        let err = CompositorConfig::from_toml_str(
            r#"
            [scale]
            tiers = [{ above_height = 900, factor = 0 }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_floor_above_limit() {
        let scale = ScaleConfig {
            min_width: MAX_DIMENSION + 2,
            ..ScaleConfig::default()
        };
        assert!(matches!(scale.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file_roundtrips() {
        let config = CompositorConfig::default()
            .with_memory_surface(640, 480, 2)
            .with_scale_preset(ScalePreset::Balanced)
            .with_render_interval_ms(0);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = CompositorConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.render.interval(), None);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CompositorConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
