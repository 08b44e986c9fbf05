//! Display surface module
//!
//! Provides pixel-addressable display memory via:
//! - Linux fbdev (`/dev/fb*`, ioctl + mmap)
//! - A heap-backed headless surface
//!
//! [`DisplaySurface`] wraps whichever backend opened. When none did, it stays
//! unavailable for the life of the process and every write is a no-op.

mod fbdev;
mod memory;

pub use fbdev::FbdevSurface;
pub use memory::MemorySurface;

use crate::config::{SurfaceBackend, SurfaceConfig};
use crate::error::{Error, Result};
use crate::types::{PixelFormat, Resolution};

/// Fixed surface geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceGeometry {
    /// Visible width in pixels
    pub width: u32,
    /// Visible height in rows
    pub height: u32,
    /// Bytes per row, including padding
    pub stride_bytes: u32,
    /// Bits per pixel
    pub bpp: u32,
    /// Size of the mapped region
    pub total_size_bytes: usize,
}

impl SurfaceGeometry {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Bytes of visible pixels in one row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * (self.bpp as usize / 8)
    }

    /// Rows addressable in the mapped region
    pub fn total_rows(&self) -> u32 {
        if self.stride_bytes == 0 {
            return 0;
        }
        (self.total_size_bytes / self.stride_bytes as usize) as u32
    }

    /// Number of full visible pages in the mapped region
    pub fn pages(&self) -> u32 {
        if self.height == 0 {
            return 0;
        }
        self.total_rows() / self.height
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::SurfaceGeometry(format!(
                "empty surface {}x{}",
                self.width, self.height
            )));
        }
        if self.bpp != 32 {
            return Err(Error::SurfaceGeometry(format!(
                "unsupported depth {} bpp (need 32)",
                self.bpp
            )));
        }
        if (self.stride_bytes as usize) < self.row_bytes() {
            return Err(Error::SurfaceGeometry(format!(
                "stride {} smaller than row of {} bytes",
                self.stride_bytes,
                self.row_bytes()
            )));
        }
        if self.total_size_bytes < self.stride_bytes as usize * self.height as usize {
            return Err(Error::SurfaceGeometry(format!(
                "mapped size {} smaller than one page",
                self.total_size_bytes
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for SurfaceGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}, {} bpp, stride={}, size={} ({} pages)",
            self.width,
            self.height,
            self.bpp,
            self.stride_bytes,
            self.total_size_bytes,
            self.pages()
        )
    }
}

/// Trait for display memory backends
pub trait Surface: Send {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Geometry queried at open time
    fn geometry(&self) -> SurfaceGeometry;

    /// Native packed pixel order
    fn pixel_format(&self) -> PixelFormat;

    /// Currently visible page offset, in rows
    ///
    /// Must be re-read before every pass: page flips happen independently of
    /// the compositor.
    fn query_page_offset(&mut self) -> u32;

    /// The whole mapped region, `total_size_bytes` long
    fn memory(&mut self) -> &mut [u8];
}

/// Display memory used by the compositor
pub struct DisplaySurface {
    backend: Option<Box<dyn Surface>>,
    geometry: SurfaceGeometry,
    pixel_format: PixelFormat,
    unavailable_reason: Option<String>,
}

impl DisplaySurface {
    /// Wrap an opened backend
    pub fn from_backend(backend: Box<dyn Surface>) -> Result<Self> {
        let geometry = backend.geometry();
        geometry.validate()?;
        let pixel_format = backend.pixel_format();
        tracing::info!(
            "Display surface [{}]: {} {}",
            backend.name(),
            geometry,
            pixel_format
        );
        Ok(Self {
            backend: Some(backend),
            geometry,
            pixel_format,
            unavailable_reason: None,
        })
    }

    /// A surface that draws nothing
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            geometry: SurfaceGeometry::default(),
            pixel_format: PixelFormat::default(),
            unavailable_reason: Some(reason.into()),
        }
    }

    /// Open the configured backend
    pub fn open(config: &SurfaceConfig) -> Result<Self> {
        let backend = create_backend(config)?;
        let mut surface = Self::from_backend(backend)?;
        if let Some(format) = config.pixel_format {
            surface.pixel_format = format;
        }
        Ok(surface)
    }

    /// Open the configured backend, degrading to an unavailable surface
    ///
    /// The failure is logged once here; there is no retry.
    pub fn open_or_degraded(config: &SurfaceConfig) -> Self {
        match Self::open(config) {
            Ok(surface) => surface,
            Err(e) => {
                tracing::warn!("Display surface unavailable, rendering disabled: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    pub fn name(&self) -> &'static str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("none")
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn query_page_offset(&mut self) -> u32 {
        self.backend
            .as_mut()
            .map(|b| b.query_page_offset())
            .unwrap_or(0)
    }

    /// Mapped memory, if the surface is available
    pub fn memory(&mut self) -> Option<&mut [u8]> {
        self.backend.as_mut().map(|b| b.memory())
    }

    /// Copy `data` into a row starting at `byte_offset`
    ///
    /// Clipped to the row's stride and the mapped region. Returns the number
    /// of bytes written.
    pub fn write_row(&mut self, row: u32, byte_offset: usize, data: &[u8]) -> usize {
        let Some(dst) = self.row_span(row, byte_offset, data.len()) else {
            return 0;
        };
        let len = dst.len();
        dst.copy_from_slice(&data[..len]);
        len
    }

    /// Zero the entire mapped region
    pub fn clear(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            tracing::debug!("Clearing display surface [{}]", backend.name());
            backend.memory().fill(0);
        }
    }

    /// Unmap the backend; the surface is unavailable afterwards
    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            tracing::info!("Closing display surface [{}]", backend.name());
            self.unavailable_reason = Some("closed".into());
        }
    }

    fn row_span(&mut self, row: u32, byte_offset: usize, len: usize) -> Option<&mut [u8]> {
        let stride = self.geometry.stride_bytes as usize;
        let memory = self.backend.as_mut()?.memory();
        clip_row_span(memory, stride, row, byte_offset, len)
    }
}

/// `len` bytes of `row` from `byte_offset`, clipped to the row and to `memory`
///
/// `None` when nothing of the span is addressable.
pub(crate) fn clip_row_span(
    memory: &mut [u8],
    stride: usize,
    row: u32,
    byte_offset: usize,
    len: usize,
) -> Option<&mut [u8]> {
    if byte_offset >= stride {
        return None;
    }
    let start = (row as usize).checked_mul(stride)?.checked_add(byte_offset)?;
    let end = start
        .saturating_add(len.min(stride - byte_offset))
        .min(memory.len());
    if start >= end {
        return None;
    }
    Some(&mut memory[start..end])
}

impl std::fmt::Debug for DisplaySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplaySurface")
            .field("backend", &self.name())
            .field("geometry", &self.geometry)
            .field("pixel_format", &self.pixel_format)
            .field("unavailable_reason", &self.unavailable_reason)
            .finish()
    }
}

/// Create a surface backend based on configuration
pub fn create_backend(config: &SurfaceConfig) -> Result<Box<dyn Surface>> {
    match config.backend {
        SurfaceBackend::Auto => {
            // Only real display hardware is probed; headless must be asked for.
            match FbdevSurface::open(&config.device) {
                Ok(surface) => {
                    tracing::info!("Using fbdev surface {}", config.device.display());
                    Ok(Box::new(surface))
                }
                Err(e) => Err(Error::BackendUnavailable(format!(
                    "no display backend available (fbdev: {})",
                    e
                ))),
            }
        }
        SurfaceBackend::Fbdev => Ok(Box::new(FbdevSurface::open(&config.device)?)),
        SurfaceBackend::Memory => {
            let mem = config.memory;
            let format = config.pixel_format.unwrap_or_default();
            Ok(Box::new(MemorySurface::new(
                mem.width, mem.height, mem.pages, format,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySurfaceConfig;

    fn memory_surface(width: u32, height: u32, pages: u32) -> DisplaySurface {
        DisplaySurface::from_backend(Box::new(MemorySurface::new(
            width,
            height,
            pages,
            PixelFormat::Bgra,
        )))
        .unwrap()
    }

    #[test]
    fn test_geometry_validation() {
        let good = SurfaceGeometry {
            width: 800,
            height: 600,
            stride_bytes: 3328,
            bpp: 32,
            total_size_bytes: 3328 * 1800,
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.pages(), 3);

        let narrow = SurfaceGeometry { stride_bytes: 3000, ..good };
        assert!(narrow.validate().is_err());

        let shallow = SurfaceGeometry { bpp: 16, ..good };
        assert!(shallow.validate().is_err());

        let small = SurfaceGeometry { total_size_bytes: 3328 * 599, ..good };
        assert!(small.validate().is_err());
    }

    #[test]
    fn test_unavailable_surface_is_noop() {
        let mut surface = DisplaySurface::unavailable("no device");
        assert!(!surface.is_available());
        assert_eq!(surface.query_page_offset(), 0);
        assert_eq!(surface.write_row(0, 0, &[1, 2, 3, 4]), 0);
        assert!(surface.memory().is_none());
        surface.clear();
        assert_eq!(surface.unavailable_reason(), Some("no device"));
    }

    #[test]
    fn test_clip_row_span_bounds() {
        let mut memory = vec![0u8; 32];
        assert_eq!(clip_row_span(&mut memory, 16, 1, 4, 8).map(|s| s.len()), Some(8));
        assert_eq!(clip_row_span(&mut memory, 16, 1, 12, 8).map(|s| s.len()), Some(4));
        assert!(clip_row_span(&mut memory, 16, 2, 0, 4).is_none());
        assert!(clip_row_span(&mut memory, 16, 0, 16, 4).is_none());
        assert!(clip_row_span(&mut memory, usize::MAX, u32::MAX, 0, 4).is_none());
    }

    #[test]
    fn test_write_row_clips_to_stride_and_memory() {
        let mut surface = memory_surface(4, 2, 1);
        // Row is 16 bytes; writing 20 at offset 8 keeps 8
        assert_eq!(surface.write_row(0, 8, &[0xaa; 20]), 8);
        // Past the last row
        assert_eq!(surface.write_row(2, 0, &[0xaa; 4]), 0);
        // Offset beyond the stride
        assert_eq!(surface.write_row(1, 16, &[0xaa; 4]), 0);

        let memory = surface.memory().unwrap();
        assert!(memory[..8].iter().all(|&b| b == 0));
        assert!(memory[8..16].iter().all(|&b| b == 0xaa));
        assert!(memory[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clear_zeroes_all_pages() {
        let mut surface = memory_surface(8, 4, 3);
        surface.memory().unwrap().fill(0x55);
        surface.clear();
        assert!(surface.memory().unwrap().iter().all(|&b| b == 0));
        assert_eq!(surface.geometry().pages(), 3);
    }

    #[test]
    fn test_open_memory_backend_with_format_override() {
        let config = SurfaceConfig {
            backend: SurfaceBackend::Memory,
            pixel_format: Some(PixelFormat::Rgba),
            memory: MemorySurfaceConfig { width: 320, height: 240, pages: 2 },
            ..Default::default()
        };
        let surface = DisplaySurface::open(&config).unwrap();
        assert_eq!(surface.name(), "memory");
        assert_eq!(surface.pixel_format(), PixelFormat::Rgba);
        assert_eq!(surface.geometry().total_rows(), 480);
    }

    #[test]
    fn test_missing_device_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let config = SurfaceConfig {
            backend: SurfaceBackend::Auto,
            device: dir.path().join("fb-missing"),
            ..Default::default()
        };
        let surface = DisplaySurface::open_or_degraded(&config);
        assert!(!surface.is_available());
        assert!(surface.unavailable_reason().is_some());
    }

    #[test]
    fn test_close_makes_unavailable() {
        let mut surface = memory_surface(8, 8, 1);
        surface.close();
        assert!(!surface.is_available());
        assert_eq!(surface.write_row(0, 0, &[1; 4]), 0);
    }
}
