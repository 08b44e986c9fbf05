//! Heap-backed headless surface
//!
//! Behaves like a multi-page framebuffer: `pages` visible pages are stacked
//! vertically and the visible page can be flipped from another thread through
//! the handle returned by [`MemorySurface::page_handle`].

use super::{Surface, SurfaceGeometry};
use crate::types::{PixelFormat, BYTES_PER_PIXEL};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// In-memory display surface
pub struct MemorySurface {
    geometry: SurfaceGeometry,
    pixel_format: PixelFormat,
    memory: Vec<u8>,
    page_offset: Arc<AtomicU32>,
}

impl MemorySurface {
    /// Tightly packed surface with `pages` stacked pages
    pub fn new(width: u32, height: u32, pages: u32, pixel_format: PixelFormat) -> Self {
        Self::with_stride(width, height, width * BYTES_PER_PIXEL, pages, pixel_format)
    }

    /// Surface with padded rows
    pub fn with_stride(
        width: u32,
        height: u32,
        stride_bytes: u32,
        pages: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        let total_size_bytes = stride_bytes as usize * height as usize * pages as usize;
        Self {
            geometry: SurfaceGeometry {
                width,
                height,
                stride_bytes,
                bpp: BYTES_PER_PIXEL * 8,
                total_size_bytes,
            },
            pixel_format,
            memory: vec![0u8; total_size_bytes],
            page_offset: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared visible-page offset, in rows
    pub fn page_handle(&self) -> Arc<AtomicU32> {
        self.page_offset.clone()
    }

    /// Show page `index` (row offset `index * height`)
    pub fn set_page(&self, index: u32) {
        self.page_offset
            .store(index * self.geometry.height, Ordering::Release);
    }
}

impl Surface for MemorySurface {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn query_page_offset(&mut self) -> u32 {
        self.page_offset.load(Ordering::Acquire)
    }

    fn memory(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}
