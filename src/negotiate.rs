//! Resolution negotiation
//!
//! Picks the working resolution a decoder should produce. High resolution
//! sources are divided down hard so the per-pixel scan conversion stays
//! affordable at real-time rates on weak CPUs.

use crate::config::ScaleConfig;
use crate::error::{Error, Result};
use crate::types::{NegotiatedFormat, PixelFormat, Resolution, MAX_DIMENSION};

/// Decides working resolution and pixel format for a decoder
#[derive(Debug, Clone)]
pub struct FormatNegotiator {
    policy: ScaleConfig,
    pixel_format: PixelFormat,
}

impl FormatNegotiator {
    /// Tiers are ordered highest threshold first, whatever the config order
    pub fn new(mut policy: ScaleConfig, pixel_format: PixelFormat) -> Self {
        policy
            .tiers
            .sort_by(|a, b| b.above_height.cmp(&a.above_height));
        Self { policy, pixel_format }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Scale factor for a source height
    pub fn scale_factor(&self, source_height: u32) -> u32 {
        self.policy
            .tiers
            .iter()
            .find(|tier| source_height > tier.above_height)
            .map(|tier| tier.factor)
            .unwrap_or(self.policy.default_factor)
            .max(1)
    }

    /// Negotiate a decoder proposal, rejecting unusable sources
    ///
    /// Empty sources and sources whose working size would exceed
    /// [`MAX_DIMENSION`] fail with [`Error::DegenerateFormat`].
    pub fn try_negotiate(&self, source: Resolution) -> Result<NegotiatedFormat> {
        let degenerate = Error::DegenerateFormat {
            width: source.width,
            height: source.height,
        };
        if source.is_empty() {
            return Err(degenerate);
        }

        let (scale_factor, width, height) = self.working_size(source);
        let candidate = NegotiatedFormat {
            source,
            scaled: Resolution::new(width, height),
            pixel_format: self.pixel_format,
            scale_factor,
        };
        if !candidate.within_limits() {
            tracing::warn!(
                "Source {} needs {}x{} working size, limit is {}",
                source,
                width,
                height,
                MAX_DIMENSION
            );
            return Err(degenerate);
        }

        Ok(self.negotiate(source))
    }

    /// Negotiate the working format for a proposed source resolution
    ///
    /// Always yields even, non-zero dimensions at or above the policy floor
    /// and at most [`MAX_DIMENSION`].
    pub fn negotiate(&self, source: Resolution) -> NegotiatedFormat {
        let (scale_factor, width, height) = self.working_size(source);

        let format = NegotiatedFormat {
            source,
            scaled: Resolution::new(width.min(MAX_DIMENSION), height.min(MAX_DIMENSION)),
            pixel_format: self.pixel_format,
            scale_factor,
        };

        tracing::info!(
            "Negotiated {} at {} (1/{} for {}p), buffer={} bytes",
            format.pixel_format,
            format.scaled,
            scale_factor,
            source.height,
            format.buffer_size()
        );

        format
    }

    fn working_size(&self, source: Resolution) -> (u32, u32, u32) {
        let scale_factor = self.scale_factor(source.height);
        let width = floor_even(source.width / scale_factor).max(self.policy.min_width);
        let height = floor_even(source.height / scale_factor).max(self.policy.min_height);
        (scale_factor, width, height)
    }
}

impl Default for FormatNegotiator {
    fn default() -> Self {
        Self::new(ScaleConfig::default(), PixelFormat::default())
    }
}

fn floor_even(v: u32) -> u32 {
    (v / 2) * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScalePreset, ScaleTier};

    #[test]
    fn test_scale_tiers() {
        let n = FormatNegotiator::default();
        assert_eq!(n.scale_factor(2160), 8);
        assert_eq!(n.scale_factor(1080), 8);
        assert_eq!(n.scale_factor(901), 8);
        assert_eq!(n.scale_factor(900), 5);
        assert_eq!(n.scale_factor(720), 5);
        assert_eq!(n.scale_factor(601), 5);
        assert_eq!(n.scale_factor(600), 2);
        assert_eq!(n.scale_factor(480), 2);
        assert_eq!(n.scale_factor(0), 2);
    }

    #[test]
    fn test_common_sources() {
        let n = FormatNegotiator::default();

        let fhd = n.negotiate(Resolution::FHD_1080P);
        assert_eq!(fhd.scale_factor, 8);
        assert_eq!(fhd.scaled, Resolution::new(240, 134));

        let hd = n.negotiate(Resolution::HD_720P);
        assert_eq!(hd.scale_factor, 5);
        assert_eq!(hd.scaled, Resolution::new(256, 144));

        let sd = n.negotiate(Resolution::SD_480P);
        assert_eq!(sd.scale_factor, 2);
        assert_eq!(sd.scaled, Resolution::new(426, 240));
    }

    #[test]
    fn test_floor_clamp() {
        let n = FormatNegotiator::default();
        let tiny = n.negotiate(Resolution::new(176, 144));
        assert_eq!(tiny.scaled, Resolution::new(160, 90));

        let zero = n.negotiate(Resolution::new(0, 0));
        assert_eq!(zero.scaled, Resolution::new(160, 90));
    }

    #[test]
    fn test_dimensions_even_and_floored() {
        let n = FormatNegotiator::default();
        for height in (0..2400).step_by(7) {
            for width in [1, 333, 641, 1279, 1921, 4097] {
                let f = n.negotiate(Resolution::new(width, height));
                assert_eq!(f.scaled.width % 2, 0);
                assert_eq!(f.scaled.height % 2, 0);
                assert!(f.scaled.width >= 160);
                assert!(f.scaled.height >= 90);
                assert_eq!(
                    f.buffer_size(),
                    f.scaled.width as usize * 4 * f.scaled.height as usize
                );
            }
        }
    }

    #[test]
    fn test_pixel_format_propagates() {
        let n = FormatNegotiator::new(ScaleConfig::default(), PixelFormat::Rgba);
        let f = n.negotiate(Resolution::HD_720P);
        assert_eq!(f.pixel_format, PixelFormat::Rgba);
        assert_eq!(f.pitch(), 256 * 4);
    }

    #[test]
    fn test_oversize_source_rejected() {
        let n = FormatNegotiator::default();
        let err = n.try_negotiate(Resolution::new(u32::MAX, 480)).unwrap_err();
        assert!(matches!(err, Error::DegenerateFormat { width: u32::MAX, height: 480 }));
        assert!(n.try_negotiate(Resolution::new(0, 480)).is_err());

        // The infallible path clamps instead of overflowing
        let clamped = n.negotiate(Resolution::new(u32::MAX, 480));
        assert_eq!(clamped.scaled, Resolution::new(MAX_DIMENSION, 240));
        assert!(clamped.within_limits());
        assert_eq!(clamped.pitch(), MAX_DIMENSION * 4);

        let ok = n.try_negotiate(Resolution::new(7680, 4320)).unwrap();
        assert_eq!(ok.scaled, Resolution::new(960, 540));
    }

    #[test]
    fn test_tier_order_independent() {
        let policy = ScaleConfig {
            tiers: vec![ScaleTier::new(600, 5), ScaleTier::new(900, 8)],
            ..ScaleConfig::default()
        };
        let n = FormatNegotiator::new(policy, PixelFormat::Bgra);
        assert_eq!(n.scale_factor(1080), 8);
        assert_eq!(n.scale_factor(720), 5);
        assert_eq!(n.scale_factor(480), 2);
    }

    #[test]
    fn test_native_preset() {
        let n = FormatNegotiator::new(ScalePreset::Native.into(), PixelFormat::Bgra);
        let f = n.negotiate(Resolution::new(1281, 721));
        assert_eq!(f.scale_factor, 1);
        assert_eq!(f.scaled, Resolution::new(1280, 720));
    }
}
