//! Fixed-point nearest-neighbor scan conversion and border fills
//!
//! All rows are addressed in absolute surface rows; only rows inside
//! `[window_top, window_bottom)` are touched.

use crate::surface::clip_row_span;
use crate::types::{TargetRect, BYTES_PER_PIXEL};

const BPP: usize = BYTES_PER_PIXEL as usize;

/// Destination memory layout and the currently visible rows
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget {
    /// Surface width in pixels
    pub surface_width: u32,
    /// Bytes per surface row
    pub stride: usize,
    /// Target rectangle with the page offset already applied
    pub rect: TargetRect,
    pub window_top: u32,
    pub window_bottom: u32,
}

impl ScanTarget {
    fn visible_rows(&self, from: u32, to: u32) -> std::ops::Range<u32> {
        from.max(self.window_top)..to.min(self.window_bottom)
    }
}

/// Source frame layout
#[derive(Debug, Clone, Copy)]
pub struct ScanSource {
    pub width: u32,
    pub height: u32,
    /// Bytes per source row
    pub pitch: usize,
}

/// 16.16 fixed-point step from destination to source
pub fn step_fp(src: u32, dst: u32) -> u32 {
    if dst == 0 {
        return 0;
    }
    (((src as u64) << 16) / dst as u64) as u32
}

/// Nearest-neighbor scale `src` into the target rectangle
///
/// Pixels are copied verbatim, 4 bytes at a time. Returns the number of rows
/// written.
pub fn scale_nearest(src: &[u8], source: &ScanSource, dst: &mut [u8], target: &ScanTarget) -> u32 {
    let rect = target.rect;
    if rect.is_empty() || source.width == 0 || source.height == 0 {
        return 0;
    }

    let scale_x_fp = step_fp(source.width, rect.width);
    let scale_y_fp = step_fp(source.height, rect.height);
    let max_src_x = source.width as usize - 1;
    let max_src_y = source.height as usize - 1;
    let src_row_bytes = source.width as usize * BPP;

    let mut rows = 0;
    for fb_y in target.visible_rows(rect.y, rect.bottom()) {
        let y = (fb_y - rect.y) as u64;
        let src_y = (((y * scale_y_fp as u64) >> 16) as usize).min(max_src_y);

        let src_start = src_y * source.pitch;
        let Some(src_row) = src.get(src_start..src_start + src_row_bytes) else {
            continue;
        };
        let Some(dst_row) = row_span(
            dst,
            fb_y,
            target.stride,
            rect.x as usize * BPP,
            rect.width as usize * BPP,
        ) else {
            continue;
        };

        let mut src_x_fp: u64 = 0;
        for px in dst_row.chunks_exact_mut(BPP) {
            let src_x = ((src_x_fp >> 16) as usize).min(max_src_x) * BPP;
            px.copy_from_slice(&src_row[src_x..src_x + BPP]);
            src_x_fp += scale_x_fp as u64;
        }
        rows += 1;
    }
    rows
}

/// Zero the letterbox/pillarbox bars around the target rectangle
///
/// Bars that span the full row width are cleared with one fill per row.
/// Returns the number of row segments cleared.
pub fn fill_bars(dst: &mut [u8], target: &ScanTarget) -> u32 {
    let rect = target.rect;
    let row_bytes = target.surface_width as usize * BPP;
    let page_bottom = target.window_bottom;
    let mut segments = 0;

    // Top
    for y in target.visible_rows(target.window_top, rect.y) {
        segments += clear_span(dst, y, target.stride, 0, row_bytes);
    }
    // Bottom
    for y in target.visible_rows(rect.bottom(), page_bottom) {
        segments += clear_span(dst, y, target.stride, 0, row_bytes);
    }

    let left = rect.x as usize * BPP;
    let right_start = rect.right() as usize * BPP;
    let right = row_bytes.saturating_sub(right_start);

    if left > 0 || right > 0 {
        for y in target.visible_rows(rect.y, rect.bottom()) {
            if left > 0 {
                segments += clear_span(dst, y, target.stride, 0, left);
            }
            if right > 0 {
                segments += clear_span(dst, y, target.stride, right_start, right);
            }
        }
    }
    segments
}

fn clear_span(dst: &mut [u8], row: u32, stride: usize, offset: usize, len: usize) -> u32 {
    match row_span(dst, row, stride, offset, len) {
        Some(span) => {
            span.fill(0);
            1
        }
        None => 0,
    }
}

/// A whole-pixel span of one row, clipped to the mapped region
fn row_span(dst: &mut [u8], row: u32, stride: usize, offset: usize, len: usize) -> Option<&mut [u8]> {
    let span = clip_row_span(dst, stride, row, offset, len)?;
    let whole = span.len() / BPP * BPP;
    if whole == 0 {
        return None;
    }
    Some(&mut span[..whole])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(x: u32, y: u32) -> [u8; 4] {
        [x as u8, y as u8, 0x80, 0xff]
    }

    fn source_frame(width: u32, height: u32) -> Vec<u8> {
        let mut frame = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                frame.extend_from_slice(&pixel(x, y));
            }
        }
        frame
    }

    fn read_px(dst: &[u8], stride: usize, x: u32, y: u32) -> [u8; 4] {
        let at = y as usize * stride + x as usize * 4;
        dst[at..at + 4].try_into().unwrap()
    }

    #[test]
    fn test_step_fp() {
        assert_eq!(step_fp(320, 1024), (320 << 16) / 1024);
        assert_eq!(step_fp(2, 1), 2 << 16);
        assert_eq!(step_fp(5, 0), 0);
    }

    #[test]
    fn test_integer_upscale_duplicates_pixels() {
        let source = ScanSource { width: 2, height: 2, pitch: 8 };
        let src = source_frame(2, 2);
        let mut dst = vec![0u8; 4 * 4 * 4];
        let target = ScanTarget {
            surface_width: 4,
            stride: 16,
            rect: TargetRect { x: 0, y: 0, width: 4, height: 4 },
            window_top: 0,
            window_bottom: 4,
        };

        assert_eq!(scale_nearest(&src, &source, &mut dst, &target), 4);
        assert_eq!(read_px(&dst, 16, 0, 0), pixel(0, 0));
        assert_eq!(read_px(&dst, 16, 1, 1), pixel(0, 0));
        assert_eq!(read_px(&dst, 16, 2, 0), pixel(1, 0));
        assert_eq!(read_px(&dst, 16, 3, 3), pixel(1, 1));
        assert_eq!(read_px(&dst, 16, 0, 2), pixel(0, 1));
    }

    #[test]
    fn test_downscale_samples_nearest() {
        let source = ScanSource { width: 8, height: 8, pitch: 32 };
        let src = source_frame(8, 8);
        let mut dst = vec![0u8; 4 * 4 * 4];
        let target = ScanTarget {
            surface_width: 4,
            stride: 16,
            rect: TargetRect { x: 0, y: 0, width: 4, height: 4 },
            window_top: 0,
            window_bottom: 4,
        };

        scale_nearest(&src, &source, &mut dst, &target);
        assert_eq!(read_px(&dst, 16, 1, 1), pixel(2, 2));
        assert_eq!(read_px(&dst, 16, 3, 2), pixel(6, 4));
    }

    #[test]
    fn test_respects_stride_padding() {
        let source = ScanSource { width: 2, height: 1, pitch: 8 };
        let src = source_frame(2, 1);
        // 2 pixels wide, 12-byte stride leaves 4 bytes of padding per row
        let mut dst = vec![0xeeu8; 12 * 2];
        let target = ScanTarget {
            surface_width: 2,
            stride: 12,
            rect: TargetRect { x: 0, y: 0, width: 2, height: 2 },
            window_top: 0,
            window_bottom: 2,
        };

        scale_nearest(&src, &source, &mut dst, &target);
        assert_eq!(&dst[8..12], &[0xee; 4]);
        assert_eq!(&dst[20..24], &[0xee; 4]);
        assert_eq!(read_px(&dst, 12, 1, 1), pixel(1, 0));
    }

    #[test]
    fn test_bars_letterbox() {
        let mut dst = vec![0xffu8; 4 * 4 * 6];
        let target = ScanTarget {
            surface_width: 4,
            stride: 16,
            rect: TargetRect { x: 0, y: 2, width: 4, height: 2 },
            window_top: 0,
            window_bottom: 6,
        };

        // Two top rows, two bottom rows, no side bars
        assert_eq!(fill_bars(&mut dst, &target), 4);
        assert!(dst[..32].iter().all(|&b| b == 0));
        assert!(dst[32..64].iter().all(|&b| b == 0xff));
        assert!(dst[64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bars_pillarbox() {
        let mut dst = vec![0xffu8; 8 * 4 * 2];
        let target = ScanTarget {
            surface_width: 8,
            stride: 32,
            rect: TargetRect { x: 2, y: 0, width: 4, height: 2 },
            window_top: 0,
            window_bottom: 2,
        };

        assert_eq!(fill_bars(&mut dst, &target), 4);
        for row in 0..2 {
            let base = row * 32;
            assert!(dst[base..base + 8].iter().all(|&b| b == 0));
            assert!(dst[base + 8..base + 24].iter().all(|&b| b == 0xff));
            assert!(dst[base + 24..base + 32].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_rows_outside_window_untouched() {
        let source = ScanSource { width: 2, height: 2, pitch: 8 };
        let src = source_frame(2, 2);
        let mut dst = vec![0xaau8; 16 * 8];
        // Rect spans rows 2..6 but only rows 4..8 are visible
        let target = ScanTarget {
            surface_width: 4,
            stride: 16,
            rect: TargetRect { x: 0, y: 2, width: 4, height: 4 },
            window_top: 4,
            window_bottom: 8,
        };

        assert_eq!(scale_nearest(&src, &source, &mut dst, &target), 2);
        fill_bars(&mut dst, &target);
        assert!(dst[..64].iter().all(|&b| b == 0xaa));
        assert_eq!(read_px(&dst, 16, 0, 4), pixel(0, 1));
        assert!(dst[96..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clipped_to_mapped_region() {
        let source = ScanSource { width: 2, height: 2, pitch: 8 };
        let src = source_frame(2, 2);
        // Only 3 rows are mapped although the window claims 4
        let mut dst = vec![0u8; 16 * 3];
        let target = ScanTarget {
            surface_width: 4,
            stride: 16,
            rect: TargetRect { x: 0, y: 0, width: 4, height: 4 },
            window_top: 0,
            window_bottom: 4,
        };
        assert_eq!(scale_nearest(&src, &source, &mut dst, &target), 3);
    }
}
