use serde::Serialize;

use crate::core::IntegrityIssue;
use crate::video::SubtitleTrackSummary;

/// Notifications pushed to the presentation layer.
///
/// Delivery is fire-and-forget; a slow receiver may miss intermediate time
/// updates, which is fine because the latest value wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SessionEvent {
    PlaybackTimeUpdate(f64),
    PlaybackDurationUpdate(f64),
    PlaybackStateChange { playing: bool },
    PlaybackSeek(f64),
    PlaybackSpeedChange(f64),
    PlaybackVolumeChange(f64),
    SubtitlesLoaded(Vec<SubtitleTrackSummary>),
    FileIssue(IntegrityIssue),
}

impl SessionEvent {
    /// Channel name the presentation layer listens on.
    pub fn channel(&self) -> &'static str {
        match self {
            SessionEvent::PlaybackTimeUpdate(_) => "playback-time-update",
            SessionEvent::PlaybackDurationUpdate(_) => "playback-duration-update",
            SessionEvent::PlaybackStateChange { .. } => "playback-state-change",
            SessionEvent::PlaybackSeek(_) => "playback-seek",
            SessionEvent::PlaybackSpeedChange(_) => "playback-speed-change",
            SessionEvent::PlaybackVolumeChange(_) => "playback-volume-change",
            SessionEvent::SubtitlesLoaded(_) => "subtitles-loaded",
            SessionEvent::FileIssue(_) => "file-issue",
        }
    }
}
