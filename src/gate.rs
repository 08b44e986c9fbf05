//! Playback gate
//!
//! Decides whether composite passes may run and tracks the first frame shown
//! after each start of playback. The gate is a plain state machine: it never
//! touches the surface itself but returns a [`GateEffect`] that the render
//! thread applies.
//!
//! ```text
//! Idle -> Negotiating -> Playing <-> Paused / Stopped
//! ```
//!
//! `Negotiating` can be entered from any state and returns to the state that
//! was active before it, so format changes do not interrupt playback.

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Negotiating,
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Negotiating => "negotiating",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Surface work requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEffect {
    /// Blank the display surface
    ClearSurface,
    /// Run one composite pass right away
    CompositeNow,
}

/// Playback state machine
#[derive(Debug)]
pub struct PlaybackGate {
    state: PlaybackState,
    /// State to return to when negotiation ends
    resume: PlaybackState,
    first_frame_rendered: bool,
    surface_available: bool,
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            resume: PlaybackState::Idle,
            first_frame_rendered: false,
            surface_available: true,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Effective state, looking through an in-progress negotiation
    pub fn playback_state(&self) -> PlaybackState {
        match self.state {
            PlaybackState::Negotiating => self.resume,
            state => state,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn first_frame_rendered(&self) -> bool {
        self.first_frame_rendered
    }

    pub fn surface_available(&self) -> bool {
        self.surface_available
    }

    /// Mark the display surface as (un)usable
    pub fn set_surface_available(&mut self, available: bool) {
        self.surface_available = available;
    }

    /// Whether the render thread should attempt composite passes
    pub fn may_composite(&self) -> bool {
        self.surface_available && self.state == PlaybackState::Playing
    }

    /// Playback started or resumed
    ///
    /// Starting while already playing keeps the first-frame flag, so the
    /// first-frame notification is not repeated.
    pub fn notify_playback_started(&mut self) -> Option<GateEffect> {
        match self.state {
            PlaybackState::Playing => None,
            PlaybackState::Negotiating => {
                if self.resume != PlaybackState::Playing {
                    self.resume = PlaybackState::Playing;
                    self.first_frame_rendered = false;
                }
                None
            }
            _ => {
                self.enter(PlaybackState::Playing);
                self.first_frame_rendered = false;
                Some(GateEffect::CompositeNow)
            }
        }
    }

    /// Playback paused
    pub fn notify_playback_paused(&mut self) -> Option<GateEffect> {
        self.leave_playing(PlaybackState::Paused)
    }

    /// Playback stopped
    pub fn notify_playback_stopped(&mut self) -> Option<GateEffect> {
        self.leave_playing(PlaybackState::Stopped)
    }

    /// A format event arrived from the decoder
    pub fn begin_negotiation(&mut self) {
        if self.state != PlaybackState::Negotiating {
            self.resume = self.state;
            self.enter(PlaybackState::Negotiating);
        }
    }

    /// Negotiation finished; return to the state active before it
    pub fn end_negotiation(&mut self) -> Option<GateEffect> {
        if self.state != PlaybackState::Negotiating {
            return None;
        }
        let resume = self.resume;
        self.enter(resume);
        (resume == PlaybackState::Playing).then_some(GateEffect::CompositeNow)
    }

    /// Record a composite pass that drew a frame
    ///
    /// Returns `true` exactly once per playing session: on the first drawn
    /// frame after playback started.
    pub fn record_composite(&mut self) -> bool {
        if self.state == PlaybackState::Playing && !self.first_frame_rendered {
            self.first_frame_rendered = true;
            tracing::info!("First frame rendered");
            return true;
        }
        false
    }

    fn leave_playing(&mut self, target: PlaybackState) -> Option<GateEffect> {
        match self.state {
            PlaybackState::Playing => {
                self.enter(target);
                Some(GateEffect::ClearSurface)
            }
            PlaybackState::Negotiating => {
                let was_playing = self.resume == PlaybackState::Playing;
                self.resume = target;
                was_playing.then_some(GateEffect::ClearSurface)
            }
            _ => {
                self.enter(target);
                None
            }
        }
    }

    fn enter(&mut self, next: PlaybackState) {
        if self.state != next {
            tracing::debug!("Playback state: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}
