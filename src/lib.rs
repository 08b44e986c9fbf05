//! fbcompositor — real-time video compositor for Linux framebuffers
//!
//! Takes decoded frames from a video decoder and draws them, scaled and
//! letterboxed, onto a memory-mapped display surface.
//!
//! # Features
//!
//! - **Negotiate**: pick a reduced working resolution for the decoder
//! - **Exchange**: lock-light double buffering between decoder and renderer
//! - **Composite**: 16.16 fixed-point nearest-neighbor scaling onto the
//!   visible page of a multi-buffered fbdev device
//! - **Gate**: playback state with a one-shot first-frame notification
//!
//! # Example
//!
//! ```rust,no_run
//! use fbcompositor::{CompositorConfig, FrameSink, Pipeline, PlaybackEvent, Resolution};
//!
//! fn main() -> fbcompositor::Result<()> {
//!     let mut pipeline = Pipeline::new(CompositorConfig::default())?;
//!     let sink = pipeline.sink();
//!
//!     pipeline.play()?;
//!     let format = sink.on_format_proposed(Resolution::HD_720P)?;
//!     if let Some(mut slot) = sink.on_lock() {
//!         // decode `format.scaled` pixels into the slot
//!         slot.as_mut_slice().fill(0x80);
//!         sink.on_unlock(slot);
//!     }
//!
//!     if let Ok(PlaybackEvent::FirstFrameReady) = pipeline.events().recv() {
//!         println!("on screen: {}", format);
//!     }
//!     pipeline.shutdown()
//! }
//! ```

pub mod composite;
pub mod config;
pub mod error;
pub mod gate;
pub mod negotiate;
pub mod pipeline;
pub mod pool;
pub mod sink;
pub mod surface;
pub mod types;

// Re-exports for convenience
pub use composite::{CompositeOutcome, Compositor, SkipReason};
pub use config::{CompositorConfig, ScalePreset, SurfaceBackend};
pub use error::{Error, Result};
pub use gate::{PlaybackGate, PlaybackState};
pub use negotiate::FormatNegotiator;
pub use pipeline::{Pipeline, PlaybackEvent, Presenter};
pub use pool::{FrameBufferPool, ReadWindow, WriteWindow};
pub use sink::{DecoderSink, FrameSink};
pub use surface::{DisplaySurface, SurfaceGeometry};
pub use types::{NegotiatedFormat, PixelFormat, Resolution, Stats, TargetRect};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if a framebuffer device can be opened and mapped
pub fn is_fbdev_available(device: impl AsRef<std::path::Path>) -> bool {
    surface::FbdevSurface::open(device).is_ok()
}
