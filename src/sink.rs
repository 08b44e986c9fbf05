//! Decoder callback surface
//!
//! A decoder drives playback through four synchronous callbacks made from its
//! own thread. [`FrameSink`] is that contract; [`DecoderSink`] implements it
//! on top of the frame pool and hands render work to the pipeline's render
//! thread without ever blocking.

use crate::error::Result;
use crate::gate::PlaybackGate;
use crate::negotiate::FormatNegotiator;
use crate::pipeline::Command;
use crate::pool::{FrameBufferPool, WriteWindow};
use crate::types::{NegotiatedFormat, Resolution};

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Callbacks a decoder makes while producing frames
pub trait FrameSink: Send {
    /// The decoder found a new source format
    ///
    /// The returned layout applies to every frame until the next call.
    fn on_format_proposed(&self, source: Resolution) -> Result<NegotiatedFormat>;

    /// Borrow the slot to decode the next frame into
    ///
    /// `None` means no format is negotiated; the decoder should drop the frame.
    fn on_lock(&self) -> Option<WriteWindow<'_>>;

    /// The frame in `window` is complete
    fn on_unlock(&self, window: WriteWindow<'_>);

    /// The decoder would present the frame now
    fn on_display(&self) {}

    /// End of stream or format
    fn on_format_cleanup(&self);
}

/// [`FrameSink`] feeding a [`crate::Pipeline`]
pub struct DecoderSink {
    pool: Arc<FrameBufferPool>,
    negotiator: FormatNegotiator,
    gate: Arc<Mutex<PlaybackGate>>,
    commands: Sender<Command>,
    frames: Sender<()>,
}

impl DecoderSink {
    pub(crate) fn new(
        pool: Arc<FrameBufferPool>,
        negotiator: FormatNegotiator,
        gate: Arc<Mutex<PlaybackGate>>,
        commands: Sender<Command>,
        frames: Sender<()>,
    ) -> Self {
        Self {
            pool,
            negotiator,
            gate,
            commands,
            frames,
        }
    }

    /// Wake the render thread; never blocks
    fn notify_frame_ready(&self) {
        match self.frames.try_send(()) {
            Ok(()) => {}
            // A wakeup is already queued and will pick up the latest frame
            Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("Render thread gone, frame notification dropped");
            }
        }
    }
}

impl FrameSink for DecoderSink {
    fn on_format_proposed(&self, source: Resolution) -> Result<NegotiatedFormat> {
        let format = match self.negotiator.try_negotiate(source) {
            Ok(format) => format,
            Err(e) => {
                tracing::warn!("Decoder proposed unusable format {}", source);
                return Err(e);
            }
        };

        self.gate.lock().begin_negotiation();
        self.pool.reallocate(format);
        let effect = self.gate.lock().end_negotiation();

        if effect.is_some() {
            self.notify_frame_ready();
        }
        Ok(format)
    }

    fn on_lock(&self) -> Option<WriteWindow<'_>> {
        let window = self.pool.acquire_write_slot();
        if window.is_none() {
            tracing::trace!("No write slot available, frame will be dropped");
        }
        window
    }

    fn on_unlock(&self, window: WriteWindow<'_>) {
        if self.pool.commit_frame(window) {
            self.notify_frame_ready();
        }
    }

    fn on_format_cleanup(&self) {
        tracing::info!("Decoder format cleanup");
        self.pool.clear();
        if self.commands.send(Command::ClearSurface).is_err() {
            tracing::debug!("Render thread gone, surface clear skipped");
        }
    }
}
