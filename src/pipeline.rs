//! Playback pipeline
//!
//! Connects decoder → frame pool → render thread → display surface.
//!
//! The decoder runs on its own thread and talks to the pipeline through a
//! [`DecoderSink`]. A single render thread owns the display surface and the
//! compositor; it wakes on frame-ready notifications, on control commands,
//! and on a periodic render timer while playing.

use crate::composite::{CompositeOutcome, Compositor};
use crate::config::CompositorConfig;
use crate::error::{Error, Result};
use crate::gate::{GateEffect, PlaybackGate, PlaybackState};
use crate::negotiate::FormatNegotiator;
use crate::pool::FrameBufferPool;
use crate::sink::DecoderSink;
use crate::surface::{DisplaySurface, SurfaceGeometry};
use crate::types::Stats;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Control messages for the render thread
#[derive(Debug, Clone, Copy)]
pub(crate) enum Command {
    Play,
    Pause,
    Stop,
    ClearSurface,
    Shutdown,
}

/// Notifications for the control layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// First frame of a playing session is on screen
    FirstFrameReady,
    /// No display surface could be opened; nothing will be drawn
    SurfaceUnavailable { reason: String },
}

/// Surface-side half of the pipeline
///
/// Owns the display surface and applies gate decisions to it. The render
/// thread drives one of these; it can also be driven directly from a caller
/// that owns its own timer.
pub struct Presenter {
    surface: DisplaySurface,
    compositor: Compositor,
    pool: Arc<FrameBufferPool>,
    gate: Arc<Mutex<PlaybackGate>>,
    stats: Arc<Mutex<Stats>>,
    events: Sender<PlaybackEvent>,
}

impl Presenter {
    pub fn new(
        surface: DisplaySurface,
        pool: Arc<FrameBufferPool>,
        gate: Arc<Mutex<PlaybackGate>>,
        events: Sender<PlaybackEvent>,
    ) -> Self {
        let available = surface.is_available();
        gate.lock().set_surface_available(available);
        if !available {
            let reason = surface
                .unavailable_reason()
                .unwrap_or("no display backend")
                .to_string();
            let _ = events.send(PlaybackEvent::SurfaceUnavailable { reason });
        }

        Self {
            surface,
            compositor: Compositor::new(),
            pool,
            gate,
            stats: Arc::new(Mutex::new(Stats::default())),
            events,
        }
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut DisplaySurface {
        &mut self.surface
    }

    pub fn play(&mut self) {
        let effect = self.gate.lock().notify_playback_started();
        self.apply(effect);
    }

    pub fn pause(&mut self) {
        let effect = self.gate.lock().notify_playback_paused();
        self.apply(effect);
    }

    pub fn stop(&mut self) {
        let effect = self.gate.lock().notify_playback_stopped();
        self.apply(effect);
    }

    pub fn clear_surface(&mut self) {
        self.surface.clear();
    }

    /// Run one composite pass if the gate allows it
    ///
    /// Returns `None` when the gate refused the pass.
    pub fn render(&mut self) -> Option<CompositeOutcome> {
        if !self.gate.lock().may_composite() {
            return None;
        }

        let outcome = self.compositor.composite(&self.pool, &mut self.surface);
        match outcome {
            CompositeOutcome::Drawn(_) => {
                self.stats.lock().frames_composited += 1;
                if self.gate.lock().record_composite() {
                    let _ = self.events.send(PlaybackEvent::FirstFrameReady);
                }
            }
            CompositeOutcome::Skipped(reason) => {
                self.stats.lock().composites_skipped += 1;
                tracing::trace!("Composite skipped: {}", reason);
            }
        }
        Some(outcome)
    }

    /// Stop compositing, blank the surface and unmap it
    ///
    /// No pass can run afterwards: the gate is stopped and the surface is
    /// unavailable.
    pub fn teardown(&mut self) {
        self.stop();
        self.surface.clear();
        self.gate.lock().set_surface_available(false);
        self.surface.close();
    }

    fn apply(&mut self, effect: Option<GateEffect>) {
        match effect {
            Some(GateEffect::ClearSurface) => self.surface.clear(),
            Some(GateEffect::CompositeNow) => {
                self.render();
            }
            None => {}
        }
    }

    fn stats_handle(&self) -> Arc<Mutex<Stats>> {
        self.stats.clone()
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
            Command::ClearSurface => self.clear_surface(),
            Command::Shutdown => self.teardown(),
        }
    }
}

/// Render thread body
fn run_render_loop(
    mut presenter: Presenter,
    commands: Receiver<Command>,
    frames: Receiver<()>,
    interval: Option<Duration>,
) {
    tracing::info!("Render thread started");

    loop {
        let playing = presenter.gate.lock().may_composite();
        let timer = match interval {
            Some(interval) if playing => crossbeam_channel::after(interval),
            _ => crossbeam_channel::never(),
        };

        crossbeam_channel::select! {
            recv(commands) -> command => match command {
                Ok(Command::Shutdown) | Err(_) => break,
                Ok(command) => presenter.handle(command),
            },
            recv(frames) -> frame => {
                if frame.is_ok() {
                    presenter.render();
                }
            },
            recv(timer) -> _ => {
                presenter.render();
            },
        }
    }

    presenter.teardown();
    tracing::info!("Render thread stopped");
}

/// Video playback pipeline
pub struct Pipeline {
    config: CompositorConfig,
    pool: Arc<FrameBufferPool>,
    gate: Arc<Mutex<PlaybackGate>>,
    stats: Arc<Mutex<Stats>>,
    negotiator: FormatNegotiator,
    geometry: Option<SurfaceGeometry>,
    commands: Sender<Command>,
    frames: Sender<()>,
    events: Receiver<PlaybackEvent>,
    render_thread: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Open the configured surface and start the render thread
    ///
    /// A surface that fails to open does not fail the pipeline: it runs
    /// without drawing and reports [`PlaybackEvent::SurfaceUnavailable`].
    pub fn new(config: CompositorConfig) -> Result<Self> {
        let surface = DisplaySurface::open_or_degraded(&config.surface);
        Self::with_surface(config, surface)
    }

    /// Start the render thread on an already opened surface
    pub fn with_surface(config: CompositorConfig, surface: DisplaySurface) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(FrameBufferPool::new());
        let gate = Arc::new(Mutex::new(PlaybackGate::new()));

        let pixel_format = if surface.is_available() {
            surface.pixel_format()
        } else {
            config.surface.pixel_format.unwrap_or_default()
        };
        let negotiator = FormatNegotiator::new(config.scale.clone(), pixel_format);
        let geometry = surface.is_available().then(|| surface.geometry());

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(config.render.notify_capacity.max(1));
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let presenter = Presenter::new(surface, pool.clone(), gate.clone(), event_tx);
        let stats = presenter.stats_handle();
        let interval = config.render.interval();

        let render_thread = std::thread::Builder::new()
            .name("fbcompositor-render".into())
            .spawn(move || run_render_loop(presenter, command_rx, frame_rx, interval))
            .map_err(|e| Error::Pipeline(format!("failed to spawn render thread: {}", e)))?;

        tracing::info!(
            "Pipeline ready ({} negotiation, render interval {:?})",
            pixel_format,
            interval
        );

        Ok(Self {
            config,
            pool,
            gate,
            stats,
            negotiator,
            geometry,
            commands: command_tx,
            frames: frame_tx,
            events: event_rx,
            render_thread: Some(render_thread),
        })
    }

    /// Callback handle for the decoder
    pub fn sink(&self) -> DecoderSink {
        DecoderSink::new(
            self.pool.clone(),
            self.negotiator.clone(),
            self.gate.clone(),
            self.commands.clone(),
            self.frames.clone(),
        )
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn clear_surface(&self) -> Result<()> {
        self.send(Command::ClearSurface)
    }

    /// Playback notifications
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.gate.lock().playback_state()
    }

    /// Geometry of the display surface, if one is mapped
    pub fn surface_geometry(&self) -> Option<SurfaceGeometry> {
        self.geometry
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.render_thread
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Get current statistics
    pub fn stats(&self) -> Stats {
        let (frames_committed, frames_dropped) = self.pool.frame_counters();
        let render = self.stats.lock().clone();
        Stats {
            frames_committed,
            frames_dropped,
            ..render
        }
    }

    /// Stop compositing, clear and unmap the surface, join the render thread
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.render_thread.take() else {
            return Err(Error::PipelineNotRunning);
        };

        tracing::info!("Pipeline shutting down");
        // The loop also exits if the channel is already closed
        let _ = self.commands.send(Command::Shutdown);
        handle
            .join()
            .map_err(|_| Error::Internal("render thread panicked".into()))?;

        let stats = self.stats();
        tracing::info!(
            "Pipeline stopped: {} committed, {} dropped, {} composited, {} skipped",
            stats.frames_committed,
            stats.frames_dropped,
            stats.frames_composited,
            stats.composites_skipped
        );
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.render_thread.is_none() {
            return Err(Error::PipelineNotRunning);
        }
        self.commands
            .send(command)
            .map_err(|_| Error::PipelineNotRunning)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.render_thread.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::warn!("Pipeline shutdown failed: {}", e);
            }
        }
    }
}
