//! Common types used throughout fbcompositor

use serde::{Deserialize, Serialize};

/// Bytes per packed pixel for every negotiated format
pub const BYTES_PER_PIXEL: u32 = 4;

/// Largest negotiated width or height
pub const MAX_DIMENSION: u32 = 16384;

/// Video or display resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    // Common source resolutions
    pub const SD_480P: Self = Self::new(854, 480);
    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);

    /// Calculate total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Packed 32-bit pixel byte order
///
/// The compositor copies pixels verbatim, so the only requirement is that the
/// decoder and the display surface agree on one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// B, G, R, A in memory order (little-endian XRGB8888 framebuffers)
    #[default]
    Bgra,
    /// R, G, B, A in memory order
    Rgba,
}

impl PixelFormat {
    /// Chroma code handed to the decoder
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Bgra => *b"BGRA",
            PixelFormat::Rgba => *b"RGBA",
        }
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        BYTES_PER_PIXEL
    }

    /// Pack an opaque color into this byte order
    pub fn pack(&self, r: u8, g: u8, b: u8) -> [u8; 4] {
        match self {
            PixelFormat::Bgra => [b, g, r, 0xff],
            PixelFormat::Rgba => [r, g, b, 0xff],
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra => write!(f, "BGRA"),
            PixelFormat::Rgba => write!(f, "RGBA"),
        }
    }
}

/// Result of negotiating a decoder's proposed format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedFormat {
    /// Resolution proposed by the decoder
    pub source: Resolution,
    /// Working resolution the decoder must produce
    pub scaled: Resolution,
    /// Packed pixel byte order
    pub pixel_format: PixelFormat,
    /// Integer divisor applied to the source resolution
    pub scale_factor: u32,
}

impl NegotiatedFormat {
    /// Bytes per row of a slot
    ///
    /// Saturates for layouts wider than any negotiator produces.
    pub fn pitch(&self) -> u32 {
        self.scaled
            .width
            .saturating_mul(self.pixel_format.bytes_per_pixel())
    }

    /// Rows per slot
    pub fn lines(&self) -> u32 {
        self.scaled.height
    }

    /// Size in bytes of each slot
    pub fn buffer_size(&self) -> usize {
        (self.pitch() as usize).saturating_mul(self.lines() as usize)
    }

    /// Slot size, `None` if the layout cannot be addressed
    pub fn checked_buffer_size(&self) -> Option<usize> {
        let pitch = self
            .scaled
            .width
            .checked_mul(self.pixel_format.bytes_per_pixel())?;
        (pitch as usize).checked_mul(self.lines() as usize)
    }

    /// Both dimensions within [`MAX_DIMENSION`] and the slot size addressable
    pub fn within_limits(&self) -> bool {
        self.scaled.width <= MAX_DIMENSION
            && self.scaled.height <= MAX_DIMENSION
            && self.checked_buffer_size().is_some()
    }
}

impl std::fmt::Display for NegotiatedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {} (1/{}), pitch={} buffer={} bytes",
            self.pixel_format,
            self.source,
            self.scaled,
            self.scale_factor,
            self.pitch(),
            self.buffer_size()
        )
    }
}

/// Destination rectangle on a display surface, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TargetRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// First row below the rectangle
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// First column right of the rectangle
    pub fn right(&self) -> u32 {
        self.x + self.width
    }
}

/// Statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Frames committed by the decoder
    pub frames_committed: u64,
    /// Committed frames overwritten before they could be displayed
    pub frames_dropped: u64,
    /// Composite passes that drew a frame
    pub frames_composited: u64,
    /// Composite passes allowed by the gate that drew nothing
    pub composites_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiated_sizes() {
        let format = NegotiatedFormat {
            source: Resolution::FHD_1080P,
            scaled: Resolution::new(240, 134),
            pixel_format: PixelFormat::Bgra,
            scale_factor: 8,
        };
        assert_eq!(format.pitch(), 960);
        assert_eq!(format.lines(), 134);
        assert_eq!(format.buffer_size(), 960 * 134);
    }

    #[test]
    fn test_oversize_layout_does_not_overflow() {
        let format = NegotiatedFormat {
            source: Resolution::new(u32::MAX, 480),
            scaled: Resolution::new(2147483646, 240),
            pixel_format: PixelFormat::Bgra,
            scale_factor: 2,
        };
        assert_eq!(format.pitch(), u32::MAX);
        assert!(format.checked_buffer_size().is_none());
        assert!(!format.within_limits());

        let max = NegotiatedFormat {
            scaled: Resolution::new(MAX_DIMENSION, MAX_DIMENSION),
            ..format
        };
        assert_eq!(max.pitch(), MAX_DIMENSION * 4);
        assert!(max.within_limits());
    }

    #[test]
    fn test_fourcc_and_pack() {
        assert_eq!(&PixelFormat::Bgra.fourcc(), b"BGRA");
        assert_eq!(&PixelFormat::Rgba.fourcc(), b"RGBA");
        assert_eq!(PixelFormat::Bgra.pack(1, 2, 3), [3, 2, 1, 0xff]);
        assert_eq!(PixelFormat::Rgba.pack(1, 2, 3), [1, 2, 3, 0xff]);
    }

    #[test]
    fn test_target_rect_edges() {
        let rect = TargetRect { x: 175, y: 0, width: 450, height: 600 };
        assert_eq!(rect.right(), 625);
        assert_eq!(rect.bottom(), 600);
        assert!(!rect.is_empty());
        assert!(TargetRect::default().is_empty());
    }
}
