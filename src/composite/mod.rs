//! Compositor module
//!
//! Copies the pool's read slot onto the visible page of the display surface:
//! - Aspect-correct placement with letterbox/pillarbox bars ([`layout`])
//! - 16.16 fixed-point nearest-neighbor scan conversion ([`scan`])
//!
//! Pixels are copied verbatim; the compositor never converts between byte
//! orders. Every pass re-queries the page offset and only touches rows of the
//! page that is visible at that moment.

pub mod layout;
pub mod scan;

pub use layout::fit_aspect;

use crate::pool::FrameBufferPool;
use crate::surface::DisplaySurface;
use crate::types::{NegotiatedFormat, TargetRect};

use scan::{ScanSource, ScanTarget};

/// Passes logged before switching to sparse logging
const VERBOSE_PASSES: u64 = 10;
/// Sparse logging interval
const LOG_EVERY: u64 = 100;

/// Why a pass did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No display backend is mapped
    SurfaceUnavailable,
    /// Nothing has been committed since the last negotiation
    NoFrame,
    /// Negotiated dimensions are zero
    EmptyFormat,
    /// Slot is smaller than the negotiated layout
    ShortBuffer,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::SurfaceUnavailable => "surface unavailable",
            SkipReason::NoFrame => "no frame",
            SkipReason::EmptyFormat => "empty format",
            SkipReason::ShortBuffer => "short buffer",
        };
        f.write_str(reason)
    }
}

/// Summary of a drawn pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawReport {
    /// Target rectangle in absolute surface rows
    pub target: TargetRect,
    pub page_offset: u32,
    pub rows_scaled: u32,
    pub bar_segments: u32,
}

/// Result of one composite pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOutcome {
    Drawn(DrawReport),
    Skipped(SkipReason),
}

impl CompositeOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, CompositeOutcome::Drawn(_))
    }
}

/// Scan-converts frames onto a display surface
#[derive(Debug, Default)]
pub struct Compositor {
    passes: u64,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of passes that drew something
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Composite the pool's current read slot
    ///
    /// The read slot stays pinned for the duration of the scan; the pool
    /// mutex is not held while pixels are copied.
    pub fn composite(
        &mut self,
        pool: &FrameBufferPool,
        surface: &mut DisplaySurface,
    ) -> CompositeOutcome {
        if !surface.is_available() {
            return CompositeOutcome::Skipped(SkipReason::SurfaceUnavailable);
        }
        let Some(frame) = pool.read_slot() else {
            return match pool.format() {
                Some(format) if format.scaled.is_empty() => {
                    CompositeOutcome::Skipped(SkipReason::EmptyFormat)
                }
                _ => CompositeOutcome::Skipped(SkipReason::NoFrame),
            };
        };
        self.composite_pixels(frame.pixels(), frame.format(), surface)
    }

    /// Composite raw packed pixels laid out as `format`
    pub fn composite_pixels(
        &mut self,
        pixels: &[u8],
        format: NegotiatedFormat,
        surface: &mut DisplaySurface,
    ) -> CompositeOutcome {
        if !surface.is_available() {
            return CompositeOutcome::Skipped(SkipReason::SurfaceUnavailable);
        }
        if format.scaled.is_empty() {
            return CompositeOutcome::Skipped(SkipReason::EmptyFormat);
        }
        if pixels.len() < format.buffer_size() {
            tracing::warn!(
                "Frame slot holds {} bytes, {} expects {}",
                pixels.len(),
                format,
                format.buffer_size()
            );
            return CompositeOutcome::Skipped(SkipReason::ShortBuffer);
        }

        let page_offset = surface.query_page_offset();
        let geometry = surface.geometry();

        let mut target = fit_aspect(format.scaled, geometry.resolution());
        if target.is_empty() {
            return CompositeOutcome::Skipped(SkipReason::EmptyFormat);
        }
        target.y += page_offset;

        let window_bottom = page_offset
            .saturating_add(geometry.height)
            .min(geometry.total_rows());
        let scan_target = ScanTarget {
            surface_width: geometry.width,
            stride: geometry.stride_bytes as usize,
            rect: target,
            window_top: page_offset,
            window_bottom,
        };
        let source = ScanSource {
            width: format.scaled.width,
            height: format.scaled.height,
            pitch: format.pitch() as usize,
        };

        let Some(memory) = surface.memory() else {
            return CompositeOutcome::Skipped(SkipReason::SurfaceUnavailable);
        };
        let rows_scaled = scan::scale_nearest(pixels, &source, memory, &scan_target);
        let bar_segments = scan::fill_bars(memory, &scan_target);

        self.passes += 1;
        if self.passes <= VERBOSE_PASSES || self.passes % LOG_EVERY == 0 {
            tracing::debug!(
                "Composite #{}: {} -> {}x{}+{}+{} (page offset {}, {} rows)",
                self.passes,
                format.scaled,
                target.width,
                target.height,
                target.x,
                target.y,
                page_offset,
                rows_scaled
            );
        }

        CompositeOutcome::Drawn(DrawReport {
            target,
            page_offset,
            rows_scaled,
            bar_segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use crate::types::{PixelFormat, Resolution};

    fn format_of(width: u32, height: u32) -> NegotiatedFormat {
        NegotiatedFormat {
            source: Resolution::new(width, height),
            scaled: Resolution::new(width, height),
            pixel_format: PixelFormat::Bgra,
            scale_factor: 1,
        }
    }

    fn surface_of(memory: MemorySurface) -> DisplaySurface {
        DisplaySurface::from_backend(Box::new(memory)).unwrap()
    }

    fn pool_with_frame(width: u32, height: u32, fill: u8) -> FrameBufferPool {
        let pool = FrameBufferPool::new();
        pool.reallocate(format_of(width, height));
        let mut window = pool.acquire_write_slot().unwrap();
        window.as_mut_slice().fill(fill);
        assert!(pool.commit_frame(window));
        pool
    }

    #[test]
    fn test_skip_when_surface_unavailable() {
        let pool = pool_with_frame(16, 9, 1);
        let mut surface = DisplaySurface::unavailable("none");
        let outcome = Compositor::new().composite(&pool, &mut surface);
        assert_eq!(outcome, CompositeOutcome::Skipped(SkipReason::SurfaceUnavailable));
    }

    #[test]
    fn test_skip_without_frame() {
        let pool = FrameBufferPool::new();
        let mut surface = surface_of(MemorySurface::new(64, 48, 1, PixelFormat::Bgra));
        let mut compositor = Compositor::new();
        assert_eq!(
            compositor.composite(&pool, &mut surface),
            CompositeOutcome::Skipped(SkipReason::NoFrame)
        );

        pool.reallocate(format_of(16, 9));
        assert_eq!(
            compositor.composite(&pool, &mut surface),
            CompositeOutcome::Skipped(SkipReason::NoFrame)
        );
        assert_eq!(compositor.passes(), 0);
    }

    #[test]
    fn test_skip_empty_format_and_short_buffer() {
        let mut surface = surface_of(MemorySurface::new(64, 48, 1, PixelFormat::Bgra));
        let mut compositor = Compositor::new();

        let outcome = compositor.composite_pixels(&[], format_of(0, 0), &mut surface);
        assert_eq!(outcome, CompositeOutcome::Skipped(SkipReason::EmptyFormat));

        let outcome = compositor.composite_pixels(&[0; 16], format_of(16, 9), &mut surface);
        assert_eq!(outcome, CompositeOutcome::Skipped(SkipReason::ShortBuffer));
    }

    #[test]
    fn test_letterbox_pass_draws_and_blackens_bars() {
        let pool = pool_with_frame(320, 180, 0x7f);
        let mut surface = surface_of(MemorySurface::new(1024, 768, 1, PixelFormat::Bgra));
        surface.memory().unwrap().fill(0xff);

        let outcome = Compositor::new().composite(&pool, &mut surface);
        let CompositeOutcome::Drawn(report) = outcome else {
            panic!("expected a drawn pass, got {:?}", outcome);
        };
        assert_eq!(report.target, TargetRect { x: 0, y: 96, width: 1024, height: 576 });
        assert_eq!(report.rows_scaled, 576);
        assert_eq!(report.bar_segments, 192);

        let stride = 1024 * 4;
        let memory = surface.memory().unwrap();
        assert!(memory[..96 * stride].iter().all(|&b| b == 0));
        assert!(memory[96 * stride..672 * stride].iter().all(|&b| b == 0x7f));
        assert!(memory[672 * stride..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pillarbox_pass() {
        let pool = pool_with_frame(480, 640, 0x11);
        let mut surface = surface_of(MemorySurface::new(800, 600, 1, PixelFormat::Bgra));
        surface.memory().unwrap().fill(0xff);

        let CompositeOutcome::Drawn(report) = Compositor::new().composite(&pool, &mut surface)
        else {
            panic!("expected a drawn pass");
        };
        assert_eq!(report.target, TargetRect { x: 175, y: 0, width: 450, height: 600 });

        let memory = surface.memory().unwrap();
        let row = &memory[300 * 3200..301 * 3200];
        assert!(row[..175 * 4].iter().all(|&b| b == 0));
        assert!(row[175 * 4..625 * 4].iter().all(|&b| b == 0x11));
        assert!(row[625 * 4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_only_visible_page_is_written() {
        let pool = pool_with_frame(160, 90, 0x42);
        let backend = MemorySurface::new(640, 480, 3, PixelFormat::Bgra);
        backend.set_page(1);
        let mut surface = surface_of(backend);
        surface.memory().unwrap().fill(0xa5);

        let CompositeOutcome::Drawn(report) = Compositor::new().composite(&pool, &mut surface)
        else {
            panic!("expected a drawn pass");
        };
        assert_eq!(report.page_offset, 480);
        assert_eq!(report.target.y, 480 + 60);

        let stride = 640 * 4;
        let memory = surface.memory().unwrap();
        assert!(memory[..480 * stride].iter().all(|&b| b == 0xa5));
        assert!(memory[960 * stride..].iter().all(|&b| b == 0xa5));
        // Inside the page: bars are black, the picture is copied
        assert!(memory[480 * stride..540 * stride].iter().all(|&b| b == 0));
        assert!(memory[540 * stride..900 * stride].iter().all(|&b| b == 0x42));
        assert!(memory[900 * stride..960 * stride].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_offset_requeried_every_pass() {
        let pool = pool_with_frame(64, 48, 0x33);
        let backend = MemorySurface::new(64, 48, 2, PixelFormat::Bgra);
        let page = backend.page_handle();
        let mut surface = surface_of(backend);
        let mut compositor = Compositor::new();

        compositor.composite(&pool, &mut surface);
        page.store(48, std::sync::atomic::Ordering::Release);
        let CompositeOutcome::Drawn(report) = compositor.composite(&pool, &mut surface) else {
            panic!("expected a drawn pass");
        };
        assert_eq!(report.page_offset, 48);
        assert_eq!(compositor.passes(), 2);
        assert!(surface.memory().unwrap().iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_pixels_copied_verbatim() {
        let format = format_of(2, 1);
        let pixels = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut surface = surface_of(MemorySurface::new(4, 2, 1, PixelFormat::Rgba));

        let outcome = Compositor::new().composite_pixels(&pixels, format, &mut surface);
        assert!(outcome.is_drawn());

        let memory = surface.memory().unwrap();
        assert_eq!(&memory[..16], &[1, 2, 3, 4, 1, 2, 3, 4, 5, 6, 7, 8, 5, 6, 7, 8]);
        assert_eq!(memory[16..32], memory[..16]);
    }
}
