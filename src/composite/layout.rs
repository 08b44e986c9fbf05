//! Aspect-correct placement of the video inside the surface

use crate::types::{Resolution, TargetRect};

/// Fit `video` inside `surface`, centered, preserving aspect ratio
///
/// Wider video fills the width (letterbox bars top and bottom), otherwise it
/// fills the height (pillarbox bars left and right). Aspect ratios are
/// compared by cross-multiplication and sizes truncate toward zero, so the
/// result is exact for any integer input.
pub fn fit_aspect(video: Resolution, surface: Resolution) -> TargetRect {
    if video.is_empty() || surface.is_empty() {
        return TargetRect::default();
    }

    let (vw, vh) = (video.width as u64, video.height as u64);
    let (sw, sh) = (surface.width as u64, surface.height as u64);

    if vw * sh > sw * vh {
        let height = (sw * vh / vw) as u32;
        TargetRect {
            x: 0,
            y: (surface.height - height) / 2,
            width: surface.width,
            height,
        }
    } else {
        let width = (sh * vw / vh) as u32;
        TargetRect {
            x: (surface.width - width) / 2,
            y: 0,
            width,
            height: surface.height,
        }
    }
}
