use serde::Serialize;

use crate::session::SessionEvent;
use crate::video::player::PlayerEvent;

pub const MIN_VOLUME: f64 = 0.0;
pub const MAX_VOLUME: f64 = 100.0;
pub const MIN_SPEED: f64 = 0.01;
pub const MAX_SPEED: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackPhase {
    /// Nothing loaded
    Idle,
    Loaded,
    Playing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub speed: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume: MAX_VOLUME,
            speed: 1.0,
        }
    }
}

/// Transition rules for a single session's playback.
///
/// Pure bookkeeping: nothing here talks to the player. Each mutation returns
/// the notifications it produced so the caller can forward them.
#[derive(Debug, Clone)]
pub struct PlaybackStateMachine {
    phase: PlaybackPhase,
    state: PlaybackState,
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            state: PlaybackState::default(),
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    pub fn has_media(&self) -> bool {
        self.phase != PlaybackPhase::Idle
    }

    /// A file finished loading in the player.
    pub fn load(&mut self, duration: f64) -> Vec<SessionEvent> {
        self.phase = PlaybackPhase::Loaded;
        self.state.playing = false;
        self.state.current_time = 0.0;
        self.state.duration = sanitize_time(duration);

        vec![
            SessionEvent::PlaybackDurationUpdate(self.state.duration),
            SessionEvent::PlaybackTimeUpdate(0.0),
            SessionEvent::PlaybackStateChange { playing: false },
        ]
    }

    /// What a play/pause toggle should ask for: `Some(true)` to start playing,
    /// `Some(false)` to pause, `None` when nothing is loaded.
    pub fn toggle_target(&self) -> Option<bool> {
        match self.phase {
            PlaybackPhase::Idle => None,
            PlaybackPhase::Loaded => Some(true),
            PlaybackPhase::Playing => Some(false),
        }
    }

    /// Optimistic seek. Returns the position actually requested.
    pub fn seek(&mut self, position: f64) -> Option<(f64, SessionEvent)> {
        if !self.has_media() || !position.is_finite() {
            return None;
        }
        let mut target = position.max(0.0);
        if self.state.duration > 0.0 {
            target = target.min(self.state.duration);
        }
        self.state.current_time = target;
        Some((target, SessionEvent::PlaybackSeek(target)))
    }

    /// Out-of-range values are clamped; NaN and infinities are rejected.
    pub fn set_volume(&mut self, volume: f64) -> Option<(f64, SessionEvent)> {
        if !volume.is_finite() {
            return None;
        }
        self.state.volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        Some((self.state.volume, SessionEvent::PlaybackVolumeChange(self.state.volume)))
    }

    /// Same clamping policy as volume, bounded to the player's speed range.
    pub fn set_speed(&mut self, speed: f64) -> Option<(f64, SessionEvent)> {
        if !speed.is_finite() {
            return None;
        }
        self.state.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        Some((self.state.speed, SessionEvent::PlaybackSpeedChange(self.state.speed)))
    }

    /// Force a local pause without waiting for the player to confirm.
    pub fn mark_paused(&mut self) -> Option<SessionEvent> {
        if self.phase != PlaybackPhase::Playing {
            return None;
        }
        self.phase = PlaybackPhase::Loaded;
        self.state.playing = false;
        Some(SessionEvent::PlaybackStateChange { playing: false })
    }

    /// Fold a player notification into the state.
    pub fn apply(&mut self, event: &PlayerEvent) -> Option<SessionEvent> {
        if !self.has_media() {
            return None;
        }

        match *event {
            PlayerEvent::TimePosition(time) => {
                if !time.is_finite() {
                    return None;
                }
                self.state.current_time = time.max(0.0);
                Some(SessionEvent::PlaybackTimeUpdate(self.state.current_time))
            }
            PlayerEvent::Duration(duration) => {
                self.state.duration = sanitize_time(duration);
                Some(SessionEvent::PlaybackDurationUpdate(self.state.duration))
            }
            PlayerEvent::Paused | PlayerEvent::Exited => self.mark_paused(),
            PlayerEvent::Unpaused => {
                if self.phase == PlaybackPhase::Playing {
                    return None;
                }
                self.phase = PlaybackPhase::Playing;
                self.state.playing = true;
                Some(SessionEvent::PlaybackStateChange { playing: true })
            }
            PlayerEvent::Seek => Some(SessionEvent::PlaybackSeek(self.state.current_time)),
            PlayerEvent::SpeedChanged(speed) => {
                if !speed.is_finite() || speed == self.state.speed {
                    return None;
                }
                self.state.speed = speed;
                Some(SessionEvent::PlaybackSpeedChange(speed))
            }
            PlayerEvent::VolumeChanged(volume) => {
                if !volume.is_finite() || volume == self.state.volume {
                    return None;
                }
                self.state.volume = volume;
                Some(SessionEvent::PlaybackVolumeChange(volume))
            }
        }
    }

    /// Back to `Idle` with default volume and speed.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn sanitize_time(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
