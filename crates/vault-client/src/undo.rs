//! Single-slot undo window for unearthed tracks.
//!
//! # States
//! ```text
//!  Idle                      no pending undo
//!  Armed { track, index }    unearth confirmed; placeholder shown
//!    phase Armed             [armed_at, armed_at + fade_after)
//!    phase FadingOut         [armed_at + fade_after, armed_at + clear_after)
//!  -> Idle                   at armed_at + clear_after, or on undo
//! ```
//!
//! Phases are never stored; they are derived from `armed_at` and the clock,
//! so the owner only needs one wake-up at [`UndoController::next_deadline`].

use std::time::Duration;

use tokio::time::Instant;
use vault_proto::config::UndoConfig;
use vault_proto::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoTiming {
    pub fade_after: Duration,
    pub clear_after: Duration,
}

impl Default for UndoTiming {
    fn default() -> Self {
        Self::from(&UndoConfig::default())
    }
}

impl From<&UndoConfig> for UndoTiming {
    fn from(config: &UndoConfig) -> Self {
        Self {
            fade_after: config.fade_after(),
            clear_after: config.clear_after(),
        }
    }
}

/// What unearthing a track changed, kept so it can be compensated.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmedUndo {
    /// The track as it was before the unearth.
    pub track: Track,
    /// Its index in the view's primary list.
    pub index: usize,
    /// Playlist the track was added to.
    pub playlist_id: String,
    pub armed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum UndoState {
    #[default]
    Idle,
    Armed(ArmedUndo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndoPhase {
    #[default]
    Idle,
    Armed,
    FadingOut,
}

impl UndoPhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, UndoPhase::Idle)
    }
}

/// Phase of `state` at `now`. Past `clear_after` an armed slot reads as idle
/// even before anyone has cleared it.
pub fn derive_undo_phase(state: &UndoState, now: Instant, timing: &UndoTiming) -> UndoPhase {
    match state {
        UndoState::Idle => UndoPhase::Idle,
        UndoState::Armed(armed) => {
            let elapsed = now.saturating_duration_since(armed.armed_at);
            if elapsed >= timing.clear_after {
                UndoPhase::Idle
            } else if elapsed >= timing.fade_after {
                UndoPhase::FadingOut
            } else {
                UndoPhase::Armed
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct UndoController {
    state: UndoState,
    timing: UndoTiming,
}

impl UndoController {
    pub fn new(timing: UndoTiming) -> Self {
        Self {
            state: UndoState::Idle,
            timing,
        }
    }

    pub fn state(&self) -> &UndoState {
        &self.state
    }

    pub fn phase(&self, now: Instant) -> UndoPhase {
        derive_undo_phase(&self.state, now, &self.timing)
    }

    /// Arm the slot. A slot that was still armed is returned; its unearth
    /// simply stands.
    pub fn arm(&mut self, armed: ArmedUndo) -> Option<ArmedUndo> {
        match std::mem::replace(&mut self.state, UndoState::Armed(armed)) {
            UndoState::Armed(previous) => Some(previous),
            UndoState::Idle => None,
        }
    }

    /// The armed slot, if its window is still open at `now`.
    pub fn pending(&self, now: Instant) -> Option<&ArmedUndo> {
        match &self.state {
            UndoState::Armed(armed) if self.phase(now).is_active() => Some(armed),
            _ => None,
        }
    }

    /// Drop the slot once its window has closed. Returns true if it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        if matches!(self.state, UndoState::Armed(_)) && !self.phase(now).is_active() {
            self.state = UndoState::Idle;
            return true;
        }
        false
    }

    pub fn clear(&mut self) -> Option<ArmedUndo> {
        match std::mem::take(&mut self.state) {
            UndoState::Armed(armed) => Some(armed),
            UndoState::Idle => None,
        }
    }

    /// The next instant at which the phase changes. `None` when idle or
    /// when the boundary lies beyond what `Instant` can represent.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let UndoState::Armed(armed) = &self.state else {
            return None;
        };
        let fade_at = armed.armed_at.checked_add(self.timing.fade_after)?;
        if now < fade_at {
            return Some(fade_at);
        }
        armed.armed_at.checked_add(self.timing.clear_after)
    }
}
